use assert_matches::assert_matches;
use tempfile::tempdir;

use vessel::clock::ManualClock;
use vessel::document::{BlockDocument, BlockIdAllocator, DocumentModel};
use vessel::engine::{CloseOutcome, EngineEvent, Vessel};
use vessel::transient::WritingMode;
use vessel::vault::{GateStep, SessionVault, SqliteVault, VaultBrowser, VaultError, VaultGate};
use vessel::vibe::VibeState;

fn write_and_close(vault: SqliteVault, text: &str) -> CloseOutcome {
    let clock = ManualClock::new(1_000);
    let doc = BlockDocument::new(BlockIdAllocator::random());
    let mut vessel = Vessel::new(doc, clock.clone(), vault, WritingMode::Permanent);

    for c in text.chars() {
        clock.advance(400);
        vessel.record_keystroke(false);
        vessel.edit(|d| {
            if c == '\n' {
                d.split_block()
            } else {
                d.insert_char(c)
            }
        });
    }
    clock.advance(5 * 60_000);
    vessel.close()
}

#[test]
fn closed_session_survives_reopening_the_vault() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("vault.db");

    let vault = SqliteVault::open(&path).unwrap();
    let outcome = write_and_close(vault, "morning pages\nsecond thought");
    let id = assert_matches!(outcome, CloseOutcome::Saved { id } => id);

    let vault = SqliteVault::open(&path).unwrap();
    let sessions = vault.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    let meta = &sessions[0];
    assert_eq!(meta.id, id);
    assert_eq!(meta.word_count, 4);
    assert!(meta.duration_ms >= 5 * 60_000);
    assert!(meta.average_color.starts_with('#'));

    let content = vault.load_session_content(&id).unwrap();
    let doc = BlockDocument::from_json(&content, BlockIdAllocator::random()).unwrap();
    assert_eq!(doc.text(), "morning pages\n\nsecond thought");
}

#[test]
fn sessions_list_newest_first_across_reopens() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");

    assert_matches!(
        write_and_close(SqliteVault::open(&path).unwrap(), "first"),
        CloseOutcome::Saved { .. }
    );
    assert_matches!(
        write_and_close(SqliteVault::open(&path).unwrap(), "second one"),
        CloseOutcome::Saved { .. }
    );

    let vault = SqliteVault::open(&path).unwrap();
    let words: Vec<usize> = vault
        .list_sessions()
        .unwrap()
        .iter()
        .map(|s| s.word_count)
        .collect();
    assert_eq!(words, vec![2, 1]);
}

#[test]
fn empty_page_is_never_stored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");

    assert_matches!(
        write_and_close(SqliteVault::open(&path).unwrap(), "   "),
        CloseOutcome::Closed
    );
    assert!(SqliteVault::open(&path)
        .unwrap()
        .list_sessions()
        .unwrap()
        .is_empty());
}

#[test]
fn passphrase_gate_persists_between_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");

    let mut vault = SqliteVault::open(&path).unwrap();
    let mut gate = VaultGate::open(&vault);
    assert_eq!(gate.step(), GateStep::Create);
    for c in "hunter2".chars() {
        gate.push_char(c);
    }
    assert_eq!(gate.submit(&mut vault), GateStep::Confirm);
    for c in "hunter2".chars() {
        gate.push_char(c);
    }
    assert_eq!(gate.submit(&mut vault), GateStep::Unlocked);
    drop(vault);

    let mut vault = SqliteVault::open(&path).unwrap();
    let mut gate = VaultGate::open(&vault);
    assert_eq!(gate.step(), GateStep::Verify);
    gate.push_char('x');
    assert_eq!(gate.submit(&mut vault), GateStep::Verify);
    assert_eq!(gate.message(), Some("Wrong passphrase."));
    for c in "hunter2".chars() {
        gate.push_char(c);
    }
    assert_eq!(gate.submit(&mut vault), GateStep::Unlocked);
}

#[test]
fn browser_deletes_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");
    write_and_close(SqliteVault::open(&path).unwrap(), "to be removed");

    let mut vault = SqliteVault::open(&path).unwrap();
    let mut browser = VaultBrowser::new();
    assert!(browser.refresh(&vault));
    let id = browser.highlighted().unwrap().id.clone();
    assert!(browser.select(&vault, &id));
    assert_eq!(
        browser.selected().and_then(|s| s.document.as_ref()).map(|d| d.text()),
        Some("to be removed".to_string())
    );

    assert!(browser.remove(&mut vault, &id));
    assert!(browser.selected().is_none());
    drop(vault);

    let vault = SqliteVault::open(&path).unwrap();
    assert!(vault.list_sessions().unwrap().is_empty());
}

#[test]
fn commit_reports_the_dominant_vibe() {
    let clock = ManualClock::new(0);
    let vault = SqliteVault::open_in_memory().unwrap();
    let mut vessel = Vessel::new(
        BlockDocument::new(BlockIdAllocator::sequential()),
        clock.clone(),
        vault,
        WritingMode::Permanent,
    );

    // a long stretch of fast typing
    for _ in 0..600 {
        clock.advance(50);
        vessel.record_keystroke(false);
        vessel.edit(|d| d.insert_char('a'));
    }
    let event = vessel.commit().unwrap();
    let metadata =
        assert_matches!(event, EngineEvent::SessionCommitted { metadata, .. } => metadata);
    assert_eq!(metadata.dominant_state, VibeState::Grounding);
    assert_eq!(metadata.word_count, 1);
}

#[test]
fn sessions_are_unreadable_without_their_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vault.db");
    write_and_close(SqliteVault::open(&path).unwrap(), "private thoughts");

    let raw = std::fs::read(&path).unwrap();
    assert!(!raw.windows(8).any(|w| w == b"private "));

    // losing the key file leaves the listing intact but the content sealed
    std::fs::remove_file(SqliteVault::key_path(&path)).unwrap();
    let vault = SqliteVault::open(&path).unwrap();
    let mut browser = VaultBrowser::new();
    assert!(browser.refresh(&vault));
    assert_eq!(browser.sessions().len(), 1);

    let id = browser.highlighted().unwrap().id.clone();
    assert_matches!(vault.load_session_content(&id), Err(VaultError::Corrupt(_)));
    assert!(browser.select(&vault, &id));
    assert!(browser.selected().unwrap().document.is_none());
}
