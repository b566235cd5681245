use tracing::{error, warn};

use super::{SessionMeta, SessionVault, VaultError};
use crate::document::{BlockDocument, BlockIdAllocator};

/// A session opened for reading. `document` is `None` when the stored content
/// could not be parsed, which the viewer shows as having nothing to display.
#[derive(Debug, Clone)]
pub struct SelectedSession {
    pub meta: SessionMeta,
    pub document: Option<BlockDocument>,
}

/// List and selection state for the vault screen. Failed vault calls are
/// logged and leave the state as it was.
#[derive(Debug, Default)]
pub struct VaultBrowser {
    sessions: Vec<SessionMeta>,
    highlighted: usize,
    selected: Option<SelectedSession>,
}

impl VaultBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[SessionMeta] {
        &self.sessions
    }

    pub fn selected(&self) -> Option<&SelectedSession> {
        self.selected.as_ref()
    }

    pub fn highlighted(&self) -> Option<&SessionMeta> {
        self.sessions.get(self.highlighted)
    }

    pub fn highlighted_index(&self) -> usize {
        self.highlighted
    }

    pub fn highlight_next(&mut self) {
        if self.highlighted + 1 < self.sessions.len() {
            self.highlighted += 1;
        }
    }

    pub fn highlight_previous(&mut self) {
        self.highlighted = self.highlighted.saturating_sub(1);
    }

    pub fn refresh<V: SessionVault + ?Sized>(&mut self, vault: &V) -> bool {
        match vault.list_sessions() {
            Ok(sessions) => {
                self.sessions = sessions;
                self.clamp_highlight();
                true
            }
            Err(e) => {
                error!("failed to load sessions: {e}");
                false
            }
        }
    }

    pub fn select<V: SessionVault + ?Sized>(&mut self, vault: &V, id: &str) -> bool {
        let Some(meta) = self.sessions.iter().find(|s| s.id == id).cloned() else {
            return false;
        };
        let document = match vault.load_session_content(id) {
            Ok(content) => match BlockDocument::from_json(&content, BlockIdAllocator::random()) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(%id, "stored content is malformed: {e}");
                    None
                }
            },
            Err(VaultError::Corrupt(e)) => {
                warn!(%id, "stored content is unreadable: {e}");
                None
            }
            Err(e) => {
                error!(%id, "failed to load session: {e}");
                return false;
            }
        };
        self.selected = Some(SelectedSession { meta, document });
        true
    }

    pub fn select_highlighted<V: SessionVault + ?Sized>(&mut self, vault: &V) -> bool {
        match self.highlighted().map(|s| s.id.clone()) {
            Some(id) => self.select(vault, &id),
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn remove<V: SessionVault + ?Sized>(&mut self, vault: &mut V, id: &str) -> bool {
        if let Err(e) = vault.delete_session(id) {
            error!(%id, "failed to delete session: {e}");
            return false;
        }
        self.sessions.retain(|s| s.id != id);
        if self.selected.as_ref().is_some_and(|s| s.meta.id == id) {
            self.selected = None;
        }
        self.clamp_highlight();
        true
    }

    fn clamp_highlight(&mut self) {
        self.highlighted = self.highlighted.min(self.sessions.len().saturating_sub(1));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    /// No passphrase yet: enter a new one
    Create,
    Confirm,
    Verify,
    Unlocked,
}

/// Passphrase prompt guarding the vault. Wrong or mismatched input re-prompts
/// with a message; nothing here is an error to the caller.
#[derive(Debug)]
pub struct VaultGate {
    step: GateStep,
    input: String,
    pending: Option<String>,
    message: Option<&'static str>,
}

impl VaultGate {
    pub fn open<V: SessionVault + ?Sized>(vault: &V) -> Self {
        let step = match vault.has_passphrase() {
            Ok(true) => GateStep::Verify,
            Ok(false) => GateStep::Create,
            Err(e) => {
                error!("failed to check vault passphrase: {e}");
                GateStep::Create
            }
        };
        Self {
            step,
            input: String::new(),
            pending: None,
            message: None,
        }
    }

    pub fn step(&self) -> GateStep {
        self.step
    }

    pub fn is_unlocked(&self) -> bool {
        self.step == GateStep::Unlocked
    }

    pub fn prompt(&self) -> &'static str {
        match self.step {
            GateStep::Create => "Choose a passphrase for your vault",
            GateStep::Confirm => "Enter it again to confirm",
            GateStep::Verify => "Enter your passphrase",
            GateStep::Unlocked => "Unlocked",
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        self.message
    }

    /// Number of characters typed, for a masked display
    pub fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn submit<V: SessionVault + ?Sized>(&mut self, vault: &mut V) -> GateStep {
        let input = std::mem::take(&mut self.input);
        self.message = None;

        match self.step {
            GateStep::Create => {
                if input.is_empty() {
                    self.message = Some("Passphrase can't be empty.");
                } else {
                    self.pending = Some(input);
                    self.step = GateStep::Confirm;
                }
            }
            GateStep::Confirm => {
                if self.pending.take().as_deref() != Some(input.as_str()) {
                    self.message = Some("Doesn't match. Try again.");
                    self.step = GateStep::Create;
                } else if let Err(e) = vault.set_passphrase(&input) {
                    error!("failed to set vault passphrase: {e}");
                    self.message = Some("Couldn't save the passphrase.");
                    self.step = GateStep::Create;
                } else {
                    self.step = GateStep::Unlocked;
                }
            }
            GateStep::Verify => match vault.verify_passphrase(&input) {
                Ok(true) => self.step = GateStep::Unlocked,
                Ok(false) => self.message = Some("Wrong passphrase."),
                Err(VaultError::PassphraseResetRequired) => {
                    self.message = Some("Passphrase reset required. Choose a new one.");
                    self.step = GateStep::Create;
                }
                Err(e) => {
                    error!("failed to verify vault passphrase: {e}");
                    self.message = Some("Couldn't read the vault.");
                }
            },
            GateStep::Unlocked => {}
        }
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{SessionMetadata, SqliteVault};
    use crate::vibe::VibeState;

    fn vault_with(contents: &[&str]) -> (SqliteVault, Vec<String>) {
        let mut vault = SqliteVault::open_in_memory().unwrap();
        let ids = contents
            .iter()
            .map(|content| {
                let meta = SessionMetadata {
                    average_color: "#f5f0eb".to_string(),
                    dominant_state: VibeState::Neutral,
                    duration_ms: 60_000,
                    word_count: 1,
                };
                vault.save_session(content, &meta).unwrap()
            })
            .collect();
        (vault, ids)
    }

    fn type_line(gate: &mut VaultGate, text: &str) {
        text.chars().for_each(|c| gate.push_char(c));
    }

    #[test]
    fn select_parses_stored_document() {
        let (vault, ids) = vault_with(&[
            r#"{"type":"doc","content":[{"type":"paragraph","content":[{"type":"text","text":"kept words"}]}]}"#,
        ]);
        let mut browser = VaultBrowser::new();
        assert!(browser.refresh(&vault));
        assert!(browser.select(&vault, &ids[0]));

        let selected = browser.selected().unwrap();
        assert_eq!(selected.meta.id, ids[0]);
        let doc = selected.document.as_ref().unwrap();
        assert_eq!(crate::document::DocumentModel::text(doc), "kept words");
    }

    #[test]
    fn malformed_content_shows_nothing() {
        let (vault, ids) = vault_with(&["{not json"]);
        let mut browser = VaultBrowser::new();
        browser.refresh(&vault);
        assert!(browser.select(&vault, &ids[0]));
        assert!(browser.selected().unwrap().document.is_none());
    }

    #[test]
    fn remove_drops_list_entry_and_selection() {
        let (mut vault, ids) = vault_with(&["{}", "{}"]);
        let mut browser = VaultBrowser::new();
        browser.refresh(&vault);
        browser.select(&vault, &ids[0]);

        assert!(browser.remove(&mut vault, &ids[0]));
        assert_eq!(browser.sessions().len(), 1);
        assert!(browser.selected().is_none());

        // already gone: logged, nothing changes
        assert!(!browser.remove(&mut vault, &ids[0]));
        assert_eq!(browser.sessions().len(), 1);
    }

    #[test]
    fn highlight_stays_in_bounds() {
        let (vault, _) = vault_with(&["a", "b"]);
        let mut browser = VaultBrowser::new();
        browser.highlight_next();
        assert_eq!(browser.highlighted_index(), 0);
        browser.refresh(&vault);
        browser.highlight_next();
        browser.highlight_next();
        assert_eq!(browser.highlighted_index(), 1);
        browser.highlight_previous();
        browser.highlight_previous();
        assert_eq!(browser.highlighted_index(), 0);
        assert!(browser.select_highlighted(&vault));
    }

    #[test]
    fn create_flow_restarts_on_mismatch() {
        let (mut vault, _) = vault_with(&[]);
        let mut gate = VaultGate::open(&vault);
        assert_eq!(gate.step(), GateStep::Create);

        type_line(&mut gate, "first");
        assert_eq!(gate.submit(&mut vault), GateStep::Confirm);
        type_line(&mut gate, "other");
        assert_eq!(gate.submit(&mut vault), GateStep::Create);
        assert_eq!(gate.message(), Some("Doesn't match. Try again."));
        assert!(!vault.has_passphrase().unwrap());

        type_line(&mut gate, "secret");
        gate.submit(&mut vault);
        type_line(&mut gate, "secret");
        assert_eq!(gate.submit(&mut vault), GateStep::Unlocked);
        assert!(vault.verify_passphrase("secret").unwrap());
    }

    #[test]
    fn empty_passphrase_is_refused() {
        let (mut vault, _) = vault_with(&[]);
        let mut gate = VaultGate::open(&vault);
        assert_eq!(gate.submit(&mut vault), GateStep::Create);
        assert!(gate.message().is_some());
    }

    #[test]
    fn verify_flow_reprompts_on_wrong_passphrase() {
        let (mut vault, _) = vault_with(&[]);
        vault.set_passphrase("secret").unwrap();

        let mut gate = VaultGate::open(&vault);
        assert_eq!(gate.step(), GateStep::Verify);
        type_line(&mut gate, "guess");
        assert_eq!(gate.input_len(), 5);
        assert_eq!(gate.submit(&mut vault), GateStep::Verify);
        assert_eq!(gate.message(), Some("Wrong passphrase."));
        assert_eq!(gate.input_len(), 0);

        type_line(&mut gate, "secrets");
        gate.backspace();
        assert_eq!(gate.submit(&mut vault), GateStep::Unlocked);
        assert!(gate.is_unlocked());
    }
}
