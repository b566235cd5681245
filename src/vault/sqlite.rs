use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use super::crypto::{self, VaultKey, PHC_PREFIX};
use super::{SessionMeta, SessionMetadata, SessionVault, VaultError};
use crate::vibe::VibeState;

const PASSPHRASE_KEY: &str = "vault_passphrase_hash";

/// Session vault backed by a single SQLite file. Session content is sealed
/// with AES-256-GCM under a key kept next to the database.
pub struct SqliteVault {
    conn: Connection,
    key: VaultKey,
}

impl std::fmt::Debug for SqliteVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVault").finish_non_exhaustive()
    }
}

impl SqliteVault {
    /// Open (or create) the vault at `path`, creating parent directories.
    /// The content key lives at `path` with a `key` extension.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let key = crypto::load_or_create_key(&Self::key_path(path))?;
        let conn = Connection::open(path)?;
        Self::init(conn, key)
    }

    /// In-memory vault with a throwaway key
    pub fn open_in_memory() -> Result<Self, VaultError> {
        Self::init(Connection::open_in_memory()?, crypto::generate_key())
    }

    pub fn key_path(path: &Path) -> std::path::PathBuf {
        path.with_extension("key")
    }

    fn init(conn: Connection, key: VaultKey) -> Result<Self, VaultError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                encrypted_content TEXT NOT NULL,
                average_vibe TEXT NOT NULL,
                dominant_state TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                word_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn, key })
    }

    /// Insert with an explicit creation time
    pub fn insert_session(
        &self,
        content: &str,
        metadata: &SessionMetadata,
        created_at: DateTime<Utc>,
    ) -> Result<String, VaultError> {
        let id = Uuid::new_v4().to_string();
        let sealed = crypto::encrypt(content.as_bytes(), &self.key)?;
        self.conn.execute(
            r#"
            INSERT INTO sessions
            (id, encrypted_content, average_vibe, dominant_state, duration_ms, word_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                id,
                sealed,
                metadata.average_color,
                metadata.dominant_state.to_string(),
                metadata.duration_ms as i64,
                metadata.word_count as i64,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(id)
    }

    fn setting(&self, key: &str) -> Result<Option<String>, VaultError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear_setting(&self, key: &str) -> Result<(), VaultError> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SessionVault for SqliteVault {
    fn save_session(
        &mut self,
        content: &str,
        metadata: &SessionMetadata,
    ) -> Result<String, VaultError> {
        let id = self.insert_session(content, metadata, Utc::now())?;
        info!(%id, words = metadata.word_count, "session saved");
        Ok(id)
    }

    fn list_sessions(&self) -> Result<Vec<SessionMeta>, VaultError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, average_vibe, dominant_state, duration_ms, word_count, created_at
            FROM sessions
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, average_color, dominant, duration_ms, word_count, created_at) = row?;
            let Some(dominant_state) = parse_state(&dominant) else {
                warn!(%id, "skipping session with unknown dominant state {dominant:?}");
                continue;
            };
            let created_at = match DateTime::parse_from_rfc3339(&created_at) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    warn!(%id, "skipping session with bad created_at: {e}");
                    continue;
                }
            };
            sessions.push(SessionMeta {
                id,
                average_color,
                dominant_state,
                duration_ms: duration_ms.max(0) as u64,
                word_count: word_count.max(0) as usize,
                created_at,
            });
        }
        Ok(sessions)
    }

    fn load_session_content(&self, id: &str) -> Result<String, VaultError> {
        let sealed: String = self
            .conn
            .query_row(
                "SELECT encrypted_content FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        let plaintext = crypto::decrypt(&sealed, &self.key)?;
        String::from_utf8(plaintext).map_err(|e| VaultError::Corrupt(format!("{id}: {e}")))
    }

    fn delete_session(&mut self, id: &str) -> Result<(), VaultError> {
        let deleted = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(VaultError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn has_passphrase(&self) -> Result<bool, VaultError> {
        Ok(self.setting(PASSPHRASE_KEY)?.is_some())
    }

    fn set_passphrase(&mut self, passphrase: &str) -> Result<(), VaultError> {
        let hash = crypto::hash_passphrase(passphrase)?;
        self.set_setting(PASSPHRASE_KEY, &hash)
    }

    fn verify_passphrase(&mut self, passphrase: &str) -> Result<bool, VaultError> {
        let Some(stored) = self.setting(PASSPHRASE_KEY)? else {
            return Ok(false);
        };

        // records from before argon2 can't be verified, start over
        if !stored.starts_with(PHC_PREFIX) {
            warn!("stored passphrase has a legacy format, clearing it");
            self.clear_setting(PASSPHRASE_KEY)?;
            return Err(VaultError::PassphraseResetRequired);
        }

        crypto::verify_passphrase(passphrase, &stored)
    }
}

fn parse_state(raw: &str) -> Option<VibeState> {
    VibeState::ALL.into_iter().find(|s| s.to_string() == raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_vault() -> SqliteVault {
        SqliteVault::open_in_memory().expect("Failed to create test vault")
    }

    fn metadata(words: usize) -> SessionMetadata {
        SessionMetadata {
            average_color: "#b4614d".to_string(),
            dominant_state: VibeState::Inspiration,
            duration_ms: 120_000,
            word_count: words,
        }
    }

    #[test]
    fn test_save_and_load_session() {
        let mut vault = create_test_vault();
        let id = vault.save_session("{\"type\":\"doc\"}", &metadata(7)).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        assert_eq!(vault.load_session_content(&id).unwrap(), "{\"type\":\"doc\"}");

        let sessions = vault.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].average_color, "#b4614d");
        assert_eq!(sessions[0].dominant_state, VibeState::Inspiration);
        assert_eq!(sessions[0].duration_ms, 120_000);
        assert_eq!(sessions[0].word_count, 7);
    }

    #[test]
    fn test_list_is_newest_first() {
        let vault = create_test_vault();
        let now = Utc::now();
        let old = vault
            .insert_session("a", &metadata(1), now - Duration::hours(2))
            .unwrap();
        let newest = vault.insert_session("b", &metadata(2), now).unwrap();
        let middle = vault
            .insert_session("c", &metadata(3), now - Duration::hours(1))
            .unwrap();

        let ids: Vec<String> = vault.list_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newest, middle, old]);
    }

    #[test]
    fn test_delete_session() {
        let mut vault = create_test_vault();
        let id = vault.save_session("x", &metadata(1)).unwrap();
        vault.delete_session(&id).unwrap();
        assert!(vault.list_sessions().unwrap().is_empty());
        assert!(matches!(
            vault.load_session_content(&id),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            vault.delete_session(&id),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_passphrase_roundtrip() {
        let mut vault = create_test_vault();
        assert!(!vault.has_passphrase().unwrap());
        assert!(!vault.verify_passphrase("anything").unwrap());

        vault.set_passphrase("correct horse").unwrap();
        assert!(vault.has_passphrase().unwrap());
        assert!(vault.verify_passphrase("correct horse").unwrap());
        assert!(!vault.verify_passphrase("wrong horse").unwrap());
    }

    #[test]
    fn test_salts_differ_between_sets() {
        let mut vault = create_test_vault();
        vault.set_passphrase("same").unwrap();
        let first = vault.setting(PASSPHRASE_KEY).unwrap().unwrap();
        vault.set_passphrase("same").unwrap();
        let second = vault.setting(PASSPHRASE_KEY).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(vault.verify_passphrase("same").unwrap());
    }

    #[test]
    fn test_legacy_passphrase_is_cleared() {
        let mut vault = create_test_vault();
        vault
            .set_setting(PASSPHRASE_KEY, "sha256$10000$00ff$5e884898da28047151d0e56f8dc62927")
            .unwrap();

        assert!(matches!(
            vault.verify_passphrase("password"),
            Err(VaultError::PassphraseResetRequired)
        ));
        assert!(!vault.has_passphrase().unwrap());
    }

    #[test]
    fn test_passphrase_is_stored_as_argon2_phc() {
        let mut vault = create_test_vault();
        vault.set_passphrase("correct horse").unwrap();
        let stored = vault.setting(PASSPHRASE_KEY).unwrap().unwrap();
        assert!(stored.starts_with("$argon2"));
        assert!(!stored.contains("correct horse"));
    }

    #[test]
    fn test_content_is_encrypted_at_rest() {
        let mut vault = create_test_vault();
        let id = vault.save_session("my secret diary", &metadata(3)).unwrap();

        let raw: String = vault
            .conn
            .query_row(
                "SELECT encrypted_content FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(raw, "my secret diary");
        assert!(!raw.contains("secret"));
        assert_eq!(vault.load_session_content(&id).unwrap(), "my secret diary");
    }

    #[test]
    fn test_tampered_content_is_corrupt() {
        let mut vault = create_test_vault();
        let id = vault.save_session("words", &metadata(1)).unwrap();
        vault
            .conn
            .execute(
                "UPDATE sessions SET encrypted_content = 'plain words' WHERE id = ?1",
                params![id],
            )
            .unwrap();
        assert!(matches!(
            vault.load_session_content(&id),
            Err(VaultError::Corrupt(_))
        ));
    }

    #[test]
    fn test_bad_rows_are_skipped_when_listing() {
        let mut vault = create_test_vault();
        let good = vault.save_session("a", &metadata(1)).unwrap();
        let bad_state = vault.save_session("b", &metadata(2)).unwrap();
        let bad_time = vault.save_session("c", &metadata(3)).unwrap();
        vault
            .conn
            .execute(
                "UPDATE sessions SET dominant_state = 'euphoria' WHERE id = ?1",
                params![bad_state],
            )
            .unwrap();
        vault
            .conn
            .execute(
                "UPDATE sessions SET created_at = 'yesterday' WHERE id = ?1",
                params![bad_time],
            )
            .unwrap();

        let ids: Vec<String> = vault.list_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![good]);
    }
}
