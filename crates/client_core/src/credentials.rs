use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Key under which the bearer token is persisted.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Supplies the bearer token for each outgoing request. `None` means the
/// request goes out unauthenticated; the server decides what that allows.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        non_blank(&self.0)
    }
}

/// JSON key/value file used as client-side persisted storage. The token is
/// re-read on every request so external updates are picked up.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable token store");
                return None;
            }
        };
        entries
            .get(AUTH_TOKEN_KEY)
            .and_then(Value::as_str)
            .and_then(non_blank)
    }

    pub fn save(&self, token: &str) -> ClientResult<()> {
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(AUTH_TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write_entries(&entries)
    }

    /// Removes the token, leaving any other stored keys untouched.
    pub fn clear(&self) -> ClientResult<()> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        if entries.remove(AUTH_TOKEN_KEY).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }

    fn read_entries(&self) -> io::Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                ClientError::client(format!(
                    "failed to create token store directory '{}': {err}",
                    parent.display()
                ))
            })?;
        }
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|err| ClientError::client(format!("failed to encode token store: {err}")))?;
        fs::write(&self.path, raw).map_err(|err| {
            ClientError::client(format!(
                "failed to write token store '{}': {err}",
                self.path.display()
            ))
        })
    }
}

impl CredentialProvider for TokenStore {
    fn bearer_token(&self) -> Option<String> {
        self.load()
    }
}

fn non_blank(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
