use tracing::{debug, error, info};

use crate::cadence::{CadenceAnalyzer, CadenceMetrics};
use crate::clock::{Clock, Millis};
use crate::document::{BlockId, DocumentModel};
use crate::session::{PendingCommit, SessionAggregator};
use crate::transient::{DissolveSnapshot, LifecycleEvent, TransientLifecycle, WritingMode};
use crate::vault::{SessionMetadata, SessionVault};
use crate::vibe::{VibeClassifier, VibeProfile, VibeState, VibeTransition};
use crate::weight::WeightInterpolator;

/// Everything observable that happened while the engine handled a call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    VibeShifted(VibeTransition),
    Lifecycle(LifecycleEvent),
    SessionCommitted {
        id: String,
        metadata: SessionMetadata,
    },
    /// Transient session closed out by the idle check without saving
    SessionDiscarded { at: Millis },
    CommitFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Nothing needed saving, or this was a repeated close
    Closed,
    Saved { id: String },
    /// The save failed; the surface still closes
    SaveFailed { reason: String },
}

/// Which component owns the timer that fires next
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TimerOwner {
    Vibe,
    Lifecycle,
    Session,
}

/// Composition root: owns the document, the vault and the five cadence and
/// lifecycle components, and routes events between them.
///
/// Nothing runs in the background. Callers report input as it happens and
/// call [`advance`](Self::advance) on a tick to fire whatever timers the
/// clock has passed.
pub struct Vessel<D, C, V> {
    doc: D,
    clock: C,
    vault: V,
    cadence: CadenceAnalyzer,
    vibe: VibeClassifier,
    weight: WeightInterpolator,
    lifecycle: TransientLifecycle,
    session: SessionAggregator,
    closed: bool,
}

impl<D: DocumentModel, C: Clock, V: SessionVault> Vessel<D, C, V> {
    pub fn new(doc: D, clock: C, vault: V, mode: WritingMode) -> Self {
        let now = clock.now_ms();
        let mut session = SessionAggregator::new();
        session.start_session(now);
        info!(%mode, "writing surface ready");

        Self {
            doc,
            clock,
            vault,
            cadence: CadenceAnalyzer::new(),
            vibe: VibeClassifier::new(now),
            weight: WeightInterpolator::default(),
            lifecycle: TransientLifecycle::new(mode),
            session,
            closed: false,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    /// Direct document access. Follow edits with [`document_changed`](Self::document_changed).
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn mode(&self) -> WritingMode {
        self.lifecycle.mode()
    }

    pub fn vibe(&self) -> VibeState {
        self.vibe.current()
    }

    pub fn previous_vibe(&self) -> Option<VibeState> {
        self.vibe.previous()
    }

    pub fn profile(&self) -> VibeProfile {
        self.vibe.current().profile()
    }

    pub fn metrics(&self) -> CadenceMetrics {
        self.vibe.metrics()
    }

    /// Current interpolated font weight
    pub fn weight(&self) -> u16 {
        self.weight.rendered()
    }

    pub fn is_animating(&self) -> bool {
        self.weight.is_animating()
    }

    pub fn session(&self) -> &SessionAggregator {
        &self.session
    }

    pub fn lifecycle(&self) -> &TransientLifecycle {
        &self.lifecycle
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed one qualifying keystroke through cadence, vibe and weight
    pub fn record_keystroke(&mut self, is_deletion: bool) -> Vec<EngineEvent> {
        let mut events = self.advance();
        let now = self.now();

        let previous_wpm = self.vibe.metrics().wpm;
        let metrics = self.cadence.record_keystroke(now, is_deletion);
        if metrics.wpm > 0 && metrics.wpm != previous_wpm {
            self.session.record_activity(now);
        }

        if let Some(shift) = self.vibe.observe(now, metrics) {
            self.session.record_vibe_change(now, shift.from, shift.to);
            events.push(EngineEvent::VibeShifted(shift));
        }
        self.weight.set_inputs(metrics.wpm, self.vibe.current());
        events
    }

    /// Report that the document changed (after the caller edited it)
    pub fn document_changed(&mut self) -> Vec<EngineEvent> {
        let mut events = self.advance();
        let now = self.now();
        if let Some(event) = self.lifecycle.on_document_changed(now, &mut self.doc) {
            events.push(EngineEvent::Lifecycle(event));
        }
        events
    }

    /// Apply an edit and report it in one step
    pub fn edit<F: FnOnce(&mut D)>(&mut self, f: F) -> Vec<EngineEvent> {
        let mut events = self.advance();
        f(&mut self.doc);
        events.extend(self.document_changed());
        events
    }

    /// Fire every timer the clock has passed, earliest deadline first
    pub fn advance(&mut self) -> Vec<EngineEvent> {
        let now = self.now();
        let mut events = Vec::new();

        while let Some((deadline, owner)) = self.next_due(now) {
            match owner {
                TimerOwner::Vibe => {
                    if let Some(shift) = self.vibe.fire_due(deadline) {
                        self.session.record_vibe_change(shift.at, shift.from, shift.to);
                        self.weight.set_inputs(self.vibe.metrics().wpm, shift.to);
                        events.push(EngineEvent::VibeShifted(shift));
                    }
                }
                TimerOwner::Lifecycle => {
                    if let Some(event) = self.lifecycle.fire_due(deadline, &mut self.doc) {
                        events.push(EngineEvent::Lifecycle(event));
                    }
                }
                TimerOwner::Session => {
                    if let Some(breach) = self.session.fire_due(deadline) {
                        events.extend(self.close_idle_session(breach.at));
                    }
                }
            }
        }
        events
    }

    /// One animation frame of the weight interpolation. Returns whether
    /// another frame is wanted.
    pub fn frame(&mut self) -> bool {
        self.weight.tick()
    }

    /// Returns the blocks restored to active when leaving transient mode
    pub fn set_mode(&mut self, mode: WritingMode) -> Vec<BlockId> {
        if mode != self.mode() {
            info!(%mode, "writing mode changed");
        }
        self.lifecycle.set_mode(mode, &mut self.doc)
    }

    pub fn toggle_mode(&mut self) -> WritingMode {
        let mode = self.mode().toggled();
        self.set_mode(mode);
        mode
    }

    /// Empty the document and stop every block timer, keeping a snapshot
    /// for the ash animation
    pub fn dissolve(&mut self) -> DissolveSnapshot {
        let now = self.now();
        self.lifecycle.dissolve_all(now, &mut self.doc)
    }

    /// Start a commit. `None` if one is already in flight or there is
    /// nothing written.
    pub fn begin_commit(&mut self) -> Option<PendingCommit> {
        let now = self.now();
        self.begin_commit_at(now)
    }

    /// Hand a started commit to the vault and settle the guard
    pub fn complete_commit(&mut self, pending: PendingCommit) -> EngineEvent {
        match self.vault.save_session(&pending.content, &pending.metadata) {
            Ok(id) => {
                self.session.finish_commit(true);
                info!(
                    %id,
                    words = pending.metadata.word_count,
                    dominant = %pending.metadata.dominant_state,
                    "session committed"
                );
                EngineEvent::SessionCommitted {
                    id,
                    metadata: pending.metadata,
                }
            }
            Err(e) => {
                self.session.finish_commit(false);
                error!("failed to save session: {e}");
                EngineEvent::CommitFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn commit(&mut self) -> Option<EngineEvent> {
        let pending = self.begin_commit()?;
        Some(self.complete_commit(pending))
    }

    /// Leave the writing surface for the vault: save a permanent session,
    /// then start over on an empty page
    pub fn open_vault(&mut self) -> Option<EngineEvent> {
        let committed = match self.mode() {
            WritingMode::Permanent => self.commit(),
            WritingMode::Transient => None,
        };

        self.lifecycle.clear_all_timers();
        self.doc.clear();
        let now = self.now();
        self.session.start_session(now);
        debug!("vault opened, writing surface cleared");
        committed
    }

    /// Close the surface. A permanent session with words is saved first.
    pub fn close(&mut self) -> CloseOutcome {
        if self.closed {
            return CloseOutcome::Closed;
        }
        self.closed = true;

        let outcome = if self.mode() == WritingMode::Permanent && self.doc.word_count() > 0 {
            match self.commit() {
                Some(EngineEvent::SessionCommitted { id, .. }) => CloseOutcome::Saved { id },
                Some(EngineEvent::CommitFailed { reason }) => CloseOutcome::SaveFailed { reason },
                _ => CloseOutcome::Closed,
            }
        } else {
            CloseOutcome::Closed
        };

        self.shutdown();
        outcome
    }

    /// Cancel every timer and stop the animation loop
    pub fn shutdown(&mut self) {
        self.vibe.shutdown();
        self.lifecycle.shutdown();
        self.session.shutdown();
        self.weight.teardown();
    }

    fn begin_commit_at(&mut self, now: Millis) -> Option<PendingCommit> {
        let words = self.doc.word_count();
        let content = self.doc.structured_content().to_string();
        self.session
            .begin_commit(now, self.vibe.current(), words, content)
    }

    fn close_idle_session(&mut self, at: Millis) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        match self.mode() {
            WritingMode::Permanent => {
                if let Some(pending) = self.begin_commit_at(at) {
                    events.push(self.complete_commit(pending));
                }
            }
            WritingMode::Transient => {
                self.session.reset();
                events.push(EngineEvent::SessionDiscarded { at });
            }
        }
        self.session.start_session(at);
        events
    }

    fn next_due(&self, now: Millis) -> Option<(Millis, TimerOwner)> {
        [
            (self.vibe.next_deadline(), TimerOwner::Vibe),
            (self.lifecycle.next_deadline(), TimerOwner::Lifecycle),
            (self.session.next_deadline(), TimerOwner::Session),
        ]
        .into_iter()
        .filter_map(|(deadline, owner)| deadline.map(|d| (d, owner)))
        .filter(|(deadline, _)| *deadline <= now)
        .min()
    }
}
