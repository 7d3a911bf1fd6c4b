//! Request decoding.
//!
//! # Responsibilities
//! - Detect the synchronous-call header
//! - Decode JSON bodies with precise rejections (415 / empty / invalid)

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderMap};
use serde::de::DeserializeOwned;

use crate::http::response::ApiError;

/// Header selecting the synchronous path. Any value enables it.
pub const USE_SYNC: &str = "use-sync";

pub fn use_sync(headers: &HeaderMap) -> bool {
    headers
        .get(USE_SYNC)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.is_empty())
}

/// JSON body extractor.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim_start().starts_with("application/json"));
        if !is_json {
            return Err(ApiError::unsupported_media_type());
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::bad_request("invalid body"))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::bad_request("empty body"));
        }

        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| ApiError::bad_request(format!("invalid body: {}", e)))
    }
}
