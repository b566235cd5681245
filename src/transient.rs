use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Millis;
use crate::document::{BlockId, BlockSnapshot, DocumentModel, FadeState};
use crate::scheduler::{TimerHandle, TimerQueue};

/// Quiet time before an untouched block starts fading
pub const INACTIVITY_MS: Millis = 10_000;
/// Fade countdown before the block is removed
pub const FADE_MS: Millis = 2_000;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WritingMode {
    #[default]
    Permanent,
    Transient,
}

impl WritingMode {
    pub fn toggled(self) -> Self {
        match self {
            WritingMode::Permanent => WritingMode::Transient,
            WritingMode::Transient => WritingMode::Permanent,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LifecycleTimer {
    Inactivity(BlockId),
    Fade(BlockId),
}

#[derive(Debug, Default)]
struct BlockTimerEntry {
    inactivity: Option<TimerHandle>,
    fade: Option<TimerHandle>,
}

/// Observable effects of the per-block lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Fading { block: BlockId, at: Millis },
    /// Edited during its fade countdown and kept
    Rescued { block: BlockId, at: Millis },
    Removed { block: BlockId, at: Millis },
    /// A timer fired for a block the document no longer has
    Missing { block: BlockId, at: Millis },
}

/// What the document held at the moment of a dissolve, for the ash animation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DissolveSnapshot {
    pub at: Millis,
    pub text: String,
    pub blocks: Vec<BlockSnapshot>,
}

impl DissolveSnapshot {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Fades and removes blocks left untouched in transient mode.
///
/// Each block identity owns at most one inactivity timer and one fade timer.
/// A block carries `Fading` exactly while its fade timer is armed.
#[derive(Debug, Default)]
pub struct TransientLifecycle {
    mode: WritingMode,
    timers: TimerQueue<LifecycleTimer>,
    entries: HashMap<BlockId, BlockTimerEntry>,
}

impl TransientLifecycle {
    pub fn new(mode: WritingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> WritingMode {
        self.mode
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    pub fn tracked_blocks(&self) -> usize {
        self.entries.len()
    }

    pub fn has_inactivity_timer(&self, block: BlockId) -> bool {
        self.entries
            .get(&block)
            .and_then(|e| e.inactivity)
            .is_some_and(|h| self.timers.is_armed(h))
    }

    pub fn has_fade_timer(&self, block: BlockId) -> bool {
        self.entries
            .get(&block)
            .and_then(|e| e.fade)
            .is_some_and(|h| self.timers.is_armed(h))
    }

    /// React to an edit: restart the timers of the block holding the edit point
    pub fn on_document_changed<D: DocumentModel + ?Sized>(
        &mut self,
        now: Millis,
        doc: &mut D,
    ) -> Option<LifecycleEvent> {
        if self.mode != WritingMode::Transient {
            return None;
        }
        let block = doc.edit_point_block()?;
        self.reset_timer(now, block, doc)
    }

    /// Re-arm the inactivity timer, rescuing the block if it was fading
    pub fn reset_timer<D: DocumentModel + ?Sized>(
        &mut self,
        now: Millis,
        block: BlockId,
        doc: &mut D,
    ) -> Option<LifecycleEvent> {
        let entry = self.entries.entry(block).or_default();

        if let Some(handle) = entry.inactivity.take() {
            self.timers.cancel(handle);
        }

        let mut rescued = None;
        if let Some(handle) = entry.fade.take() {
            self.timers.cancel(handle);
            if let Some(range) = doc.find_block(block) {
                doc.set_fade_state_at(range.pos, FadeState::Active);
            }
            debug!(%block, at = now, "block rescued from fade");
            rescued = Some(LifecycleEvent::Rescued { block, at: now });
        }

        entry.inactivity = Some(
            self.timers
                .schedule(now, INACTIVITY_MS, LifecycleTimer::Inactivity(block)),
        );
        rescued
    }

    /// Fire the earliest timer due by `now`, if any
    pub fn fire_due<D: DocumentModel + ?Sized>(
        &mut self,
        now: Millis,
        doc: &mut D,
    ) -> Option<LifecycleEvent> {
        let due = self.timers.pop_due(now)?;
        let at = due.deadline;

        match due.payload {
            LifecycleTimer::Inactivity(block) => {
                let Some(range) = doc.find_block(block) else {
                    self.entries.remove(&block);
                    trace!(%block, "inactivity fired for missing block");
                    return Some(LifecycleEvent::Missing { block, at });
                };
                doc.set_fade_state_at(range.pos, FadeState::Fading);

                let fade = self.timers.schedule(at, FADE_MS, LifecycleTimer::Fade(block));
                let entry = self.entries.entry(block).or_default();
                entry.inactivity = None;
                entry.fade = Some(fade);
                debug!(%block, at, "block fading");
                Some(LifecycleEvent::Fading { block, at })
            }
            LifecycleTimer::Fade(block) => {
                self.entries.remove(&block);
                match doc.find_block(block) {
                    Some(range) if doc.delete_range(range) => {
                        debug!(%block, at, "block removed");
                        Some(LifecycleEvent::Removed { block, at })
                    }
                    _ => {
                        trace!(%block, "fade fired for missing block");
                        Some(LifecycleEvent::Missing { block, at })
                    }
                }
            }
        }
    }

    /// Switch modes. Leaving transient restores every fading block; entering
    /// it starts from an empty timer table. Returns the restored blocks.
    pub fn set_mode<D: DocumentModel + ?Sized>(
        &mut self,
        mode: WritingMode,
        doc: &mut D,
    ) -> Vec<BlockId> {
        if mode == self.mode {
            return Vec::new();
        }
        self.mode = mode;
        self.clear_all_timers();

        if mode == WritingMode::Transient {
            return Vec::new();
        }

        let mut restored = Vec::new();
        for block in doc.blocks() {
            if block.fade == FadeState::Fading
                && doc.set_fade_state_at(block.range.pos, FadeState::Active)
            {
                restored.push(block.id);
            }
        }
        debug!(restored = restored.len(), "left transient mode");
        restored
    }

    /// Snapshot, stop every timer and empty the document in one step
    pub fn dissolve_all<D: DocumentModel + ?Sized>(
        &mut self,
        now: Millis,
        doc: &mut D,
    ) -> DissolveSnapshot {
        let snapshot = DissolveSnapshot {
            at: now,
            text: doc.text(),
            blocks: doc.blocks(),
        };
        self.clear_all_timers();
        doc.clear();
        debug!(blocks = snapshot.blocks.len(), "dissolved");
        snapshot
    }

    pub fn clear_all_timers(&mut self) {
        self.timers.clear();
        self.entries.clear();
    }

    pub fn shutdown(&mut self) {
        self.clear_all_timers();
    }
}
