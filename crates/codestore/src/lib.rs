//! Saving and loading shader sources, remotely and on disk.

mod http;
mod local;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use http::HttpCodeStore;
pub use local::{DraftCache, SnapshotStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("code name must not be empty")]
    EmptyName,
    #[error("code name '{0}' may only contain letters, digits, spaces, '-', '_' and '.'")]
    InvalidName(String),
    #[error("no saved code named '{0}'")]
    NotFound(String),
    #[error("invalid store endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("remote store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response from remote store: {0}")]
    Protocol(String),
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Who owns a saved shader: a display nickname plus a stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub nickname: String,
    pub uuid: Uuid,
}

impl UserIdentity {
    pub fn new(nickname: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            nickname: nickname.into(),
            uuid,
        }
    }

    /// Fresh identity with a random id.
    pub fn generate(nickname: impl Into<String>) -> Self {
        Self::new(nickname, Uuid::new_v4())
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.nickname, self.uuid)
    }
}

/// Key of a saved shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeKey {
    pub user: UserIdentity,
    pub name: String,
}

impl CodeKey {
    /// Builds a key after checking the name is usable as a file name and a
    /// remote key.
    pub fn new(user: UserIdentity, name: &str) -> Result<Self, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        let valid = name
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(Self {
            user,
            name: name.to_string(),
        })
    }
}

/// Opaque key-value store of shader sources.
pub trait CodeStore {
    fn save(&self, key: &CodeKey, source: &str) -> Result<(), StoreError>;
    fn load(&self, key: &CodeKey) -> Result<String, StoreError>;
    /// Names saved by `user`, sorted.
    fn list(&self, user: &UserIdentity) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_names_are_validated() {
        let user = UserIdentity::generate("mizu");
        assert!(matches!(
            CodeKey::new(user.clone(), "   "),
            Err(StoreError::EmptyName)
        ));
        assert!(matches!(
            CodeKey::new(user.clone(), "../escape"),
            Err(StoreError::InvalidName(_))
        ));
        let key = CodeKey::new(user, " My Shader-2 ").unwrap();
        assert_eq!(key.name, "My Shader-2");
    }
}
