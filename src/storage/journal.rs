//! Append-only JSON-lines journal.
//!
//! Each mutation appends one line, so the cost of a write does not grow
//! with the number of records. Opening a journal replays every line and
//! rewrites the file down to the records the caller hands back to
//! [`Journal::compact`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Journal {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl Journal {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the journal at `path` and return its entries in append order.
    ///
    /// A final line that does not parse is treated as a write cut short by
    /// a crash and dropped. A bad line anywhere else is an error.
    pub fn open<T: DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<(Self, Vec<T>)> {
        let path = path.as_ref().to_path_buf();
        let mut entries = Vec::new();

        if path.exists() {
            let lines: Vec<String> = BufReader::new(File::open(&path)?)
                .lines()
                .collect::<io::Result<_>>()?;
            let last = lines.len().saturating_sub(1);
            for (n, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) if n == last => {
                        tracing::warn!(path = ?path, error = %e, "Dropping torn journal tail");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            tracing::info!(count = entries.len(), path = ?path, "Replayed journal");
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let journal = Self {
            path: Some(path),
            file: Mutex::new(Some(file)),
        };
        Ok((journal, entries))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry as a single line.
    pub fn append<T: Serialize>(&self, entry: &T) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let Some(file) = file.as_mut() else {
            return Ok(());
        };
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        file.write_all(&line)
    }

    /// Rewrite the journal so it holds exactly `entries`.
    pub fn compact<T: Serialize>(&self, entries: &[T]) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());

        let tmp = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        std::fs::rename(&tmp, path)?;

        *file = Some(OpenOptions::new().append(true).open(path)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_appends_nothing() {
        let journal = Journal::in_memory();
        journal.append(&1u32).unwrap();
        journal.compact(&[1u32]).unwrap();
        assert!(journal.path().is_none());
    }

    #[test]
    fn test_replay_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, entries) = Journal::open::<u32>(&path).unwrap();
        assert!(entries.is_empty());
        for n in [3u32, 1, 2] {
            journal.append(&n).unwrap();
        }
        drop(journal);

        let (_, entries) = Journal::open::<u32>(&path).unwrap();
        assert_eq!(entries, vec![3, 1, 2]);
    }

    #[test]
    fn test_compact_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        let (journal, _) = Journal::open::<u32>(&path).unwrap();
        for n in 0..10u32 {
            journal.append(&n).unwrap();
        }
        journal.compact(&[9u32]).unwrap();
        journal.append(&10u32).unwrap();
        drop(journal);

        let (_, entries) = Journal::open::<u32>(&path).unwrap();
        assert_eq!(entries, vec![9, 10]);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "1\n2\n{\"trunc").unwrap();

        let (_, entries) = Journal::open::<u32>(&path).unwrap();
        assert_eq!(entries, vec![1, 2]);
    }

    #[test]
    fn test_corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "1\nnot json\n3\n").unwrap();

        assert!(Journal::open::<u32>(&path).is_err());
    }
}
