//! Transaction scripts: built-in templates and syntax validation.

use thiserror::Error;

/// Creates an account funded by the payer with the given keys.
pub const CREATE_ACCOUNT: &str = r#"transaction(publicKeys: [String], weights: [UFix64]) {
    prepare(signer: AuthAccount) {
        let account = AuthAccount(payer: signer)
        var i = 0
        while i < publicKeys.length {
            account.keys.add(publicKey: publicKeys[i].decodeHex(), weight: weights[i])
            i = i + 1
        }
    }
}"#;

/// Moves tokens from the first authorizer to `to`.
pub const TRANSFER_TOKENS: &str = r#"import FungibleToken from 0xFUNGIBLETOKEN
import FlowToken from 0xFLOWTOKEN

transaction(amount: UFix64, to: Address) {
    let sentVault: @FungibleToken.Vault

    prepare(signer: AuthAccount) {
        let vaultRef = signer.borrow<&FlowToken.Vault>(from: /storage/flowTokenVault)
            ?? panic("Could not borrow reference to the owner's Vault!")
        self.sentVault <- vaultRef.withdraw(amount: amount)
    }

    execute {
        let receiverRef = getAccount(to)
            .getCapability(/public/flowTokenReceiver)
            .borrow<&{FungibleToken.Receiver}>()
            ?? panic("Could not borrow receiver reference to the recipient's Vault")
        receiverRef.deposit(from: <-self.sentVault)
    }
}"#;

/// Reads the token balance of `account`.
pub const BALANCE_OF: &str = r#"import FungibleToken from 0xFUNGIBLETOKEN
import FlowToken from 0xFLOWTOKEN

pub fun main(account: Address): UFix64 {
    let vaultRef = getAccount(account)
        .getCapability(/public/flowTokenBalance)
        .borrow<&FlowToken.Vault{FungibleToken.Balance}>()
        ?? panic("Could not borrow Balance reference to the Vault")
    return vaultRef.balance
}"#;

/// Errors raised by script validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Parsing failed: {0}")]
    Parse(String),
}

/// Cheap syntax check run before any work is scheduled.
///
/// Accepts code that declares a `transaction` block and keeps its
/// brackets balanced outside of string literals.
pub fn parse(code: &str) -> Result<(), ScriptError> {
    let code = non_empty(code)?;
    if !words(code).any(|word| word == "transaction") {
        return Err(ScriptError::Parse(
            "expected a transaction declaration".to_string(),
        ));
    }
    check_brackets(code)?;
    if !code.contains('{') {
        return Err(ScriptError::Parse("missing transaction body".to_string()));
    }
    Ok(())
}

/// Syntax check for read-only scripts: a `fun main` entry point with
/// balanced brackets.
pub fn parse_script(code: &str) -> Result<(), ScriptError> {
    let code = non_empty(code)?;
    let mut tokens = words(code).filter(|w| !w.is_empty()).peekable();
    let mut declares_main = false;
    while let Some(word) = tokens.next() {
        if word == "fun" && tokens.peek() == Some(&"main") {
            declares_main = true;
            break;
        }
    }
    if !declares_main {
        return Err(ScriptError::Parse("expected a main function".to_string()));
    }
    check_brackets(code)?;
    if !code.contains('{') {
        return Err(ScriptError::Parse("missing function body".to_string()));
    }
    Ok(())
}

fn non_empty(code: &str) -> Result<&str, ScriptError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ScriptError::Parse("empty script".to_string()));
    }
    Ok(code)
}

fn words(code: &str) -> impl Iterator<Item = &str> {
    code.split(|c: char| !(c.is_alphanumeric() || c == '_'))
}

fn check_brackets(code: &str) -> Result<(), ScriptError> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (pos, c) in code.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '(' | '[' => stack.push(c),
            '}' | ')' | ']' => {
                let open = match c {
                    '}' => '{',
                    ')' => '(',
                    _ => '[',
                };
                if stack.pop() != Some(open) {
                    return Err(ScriptError::Parse(format!(
                        "unexpected '{}' at offset {}",
                        c, pos
                    )));
                }
            }
            _ => {}
        }
    }

    if in_string {
        return Err(ScriptError::Parse("unterminated string literal".to_string()));
    }
    if let Some(open) = stack.pop() {
        return Err(ScriptError::Parse(format!("unclosed '{}'", open)));
    }
    Ok(())
}
