//! Session storage: the vault trait, its SQLite backing and the browsing state
//! the UI keeps on top of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Millis;
use crate::vibe::VibeState;

mod browser;
mod crypto;
mod sqlite;

pub use browser::{GateStep, SelectedSession, VaultBrowser, VaultGate};
pub use sqlite::SqliteVault;

/// Summary handed to the vault alongside the serialized document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub average_color: String,
    pub dominant_state: VibeState,
    pub duration_ms: Millis,
    pub word_count: usize,
}

/// A stored session as listed by the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub average_color: String,
    pub dominant_state: VibeState,
    pub duration_ms: Millis,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("stored passphrase is in an unsupported format and was cleared")]
    PassphraseResetRequired,
}

/// Request/response surface of the session store
pub trait SessionVault {
    /// Persist a session, returning its new id
    fn save_session(&mut self, content: &str, metadata: &SessionMetadata)
        -> Result<String, VaultError>;
    /// Newest first
    fn list_sessions(&self) -> Result<Vec<SessionMeta>, VaultError>;
    fn load_session_content(&self, id: &str) -> Result<String, VaultError>;
    fn delete_session(&mut self, id: &str) -> Result<(), VaultError>;
    fn has_passphrase(&self) -> Result<bool, VaultError>;
    fn set_passphrase(&mut self, passphrase: &str) -> Result<(), VaultError>;
    fn verify_passphrase(&mut self, passphrase: &str) -> Result<bool, VaultError>;
}
