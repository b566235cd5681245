use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Millis;
use crate::scheduler::{TimerHandle, TimerQueue};
use crate::util::weighted_blend;
use crate::vault::SessionMetadata;
use crate::vibe::{Rgb, VibeState};

/// Idle time after which a session is closed out automatically
pub const INACTIVITY_THRESHOLD_MS: Millis = 45 * 60_000;
/// How often the idle check runs while a session is active
pub const INACTIVITY_CHECK_MS: Millis = 60_000;

/// Time spent in each vibe state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VibeDurations {
    pub grounding: Millis,
    pub neutral: Millis,
    pub inspiration: Millis,
}

impl VibeDurations {
    pub fn get(&self, state: VibeState) -> Millis {
        match state {
            VibeState::Grounding => self.grounding,
            VibeState::Neutral => self.neutral,
            VibeState::Inspiration => self.inspiration,
        }
    }

    pub fn add(&mut self, state: VibeState, ms: Millis) {
        let slot = match state {
            VibeState::Grounding => &mut self.grounding,
            VibeState::Neutral => &mut self.neutral,
            VibeState::Inspiration => &mut self.inspiration,
        };
        *slot = slot.saturating_add(ms);
    }

    pub fn total(&self) -> Millis {
        VibeState::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Largest share wins; ties go to the earliest state in `VibeState::ALL`
    pub fn dominant(&self) -> VibeState {
        let mut best = VibeState::ALL[0];
        for state in VibeState::ALL {
            if self.get(state) > self.get(best) {
                best = state;
            }
        }
        best
    }

    /// Background colours blended by time share, Neutral when nothing accrued
    pub fn average_color(&self) -> Rgb {
        let parts: Vec<(Rgb, f64)> = VibeState::ALL
            .iter()
            .map(|s| (s.profile().background, self.get(*s) as f64))
            .collect();
        weighted_blend(&parts).unwrap_or(VibeState::Neutral.profile().background)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAccumulator {
    pub session_start_time: Option<Millis>,
    pub last_activity_time: Option<Millis>,
    pub current_vibe_start_time: Option<Millis>,
    pub vibe_durations: VibeDurations,
}

/// A commit that has been started and awaits the storage result
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommit {
    pub content: String,
    pub metadata: SessionMetadata,
}

/// Reported by the idle check when the writer has been away too long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBreach {
    pub at: Millis,
    pub idle_ms: Millis,
}

/// Accumulates time-weighted vibe exposure for the live session and decides
/// when it should be committed.
#[derive(Debug, Default)]
pub struct SessionAggregator {
    acc: SessionAccumulator,
    active: bool,
    commit_in_progress: bool,
    timers: TimerQueue<()>,
    idle_check: Option<TimerHandle>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&mut self, now: Millis) {
        self.acc = SessionAccumulator {
            session_start_time: Some(now),
            last_activity_time: Some(now),
            current_vibe_start_time: Some(now),
            vibe_durations: VibeDurations::default(),
        };
        self.active = true;
        self.arm_idle_check(now);
        debug!(at = now, "session started");
    }

    /// Close out the time spent in `from`. Ignored outside a session.
    pub fn record_vibe_change(&mut self, now: Millis, from: VibeState, to: VibeState) {
        let Some(started) = self.acc.current_vibe_start_time else {
            return;
        };
        self.acc
            .vibe_durations
            .add(from, now.saturating_sub(started));
        self.acc.current_vibe_start_time = Some(now);
        debug!(%from, %to, spent = now.saturating_sub(started), "vibe duration recorded");
    }

    /// Account for the state that is still open
    pub fn flush_current(&mut self, now: Millis, current: VibeState) {
        self.record_vibe_change(now, current, current);
    }

    pub fn record_activity(&mut self, now: Millis) {
        self.acc.last_activity_time = Some(now);
    }

    pub fn reset(&mut self) {
        self.acc = SessionAccumulator::default();
        self.active = false;
        self.disarm_idle_check();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_commit_in_progress(&self) -> bool {
        self.commit_in_progress
    }

    pub fn accumulator(&self) -> &SessionAccumulator {
        &self.acc
    }

    pub fn durations(&self) -> VibeDurations {
        self.acc.vibe_durations
    }

    pub fn dominant_state(&self) -> VibeState {
        self.acc.vibe_durations.dominant()
    }

    pub fn average_color(&self) -> Rgb {
        self.acc.vibe_durations.average_color()
    }

    pub fn duration_ms(&self, now: Millis) -> Millis {
        self.acc
            .session_start_time
            .map_or(0, |start| now.saturating_sub(start))
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Run the idle check if it is due. The check keeps recurring while the
    /// session stays active.
    pub fn fire_due(&mut self, now: Millis) -> Option<IdleBreach> {
        let due = self.timers.pop_due(now)?;
        self.idle_check = None;
        if !self.active {
            return None;
        }
        self.arm_idle_check(due.deadline);

        let last = self.acc.last_activity_time?;
        let idle_ms = due.deadline.saturating_sub(last);
        (idle_ms >= INACTIVITY_THRESHOLD_MS).then(|| {
            info!(idle_ms, "session idle past threshold");
            IdleBreach {
                at: due.deadline,
                idle_ms,
            }
        })
    }

    /// First half of a commit. `None` when a commit is already in flight or
    /// there is nothing written; otherwise the open vibe is flushed and the
    /// guard stays set until [`finish_commit`](Self::finish_commit).
    pub fn begin_commit(
        &mut self,
        now: Millis,
        current: VibeState,
        word_count: usize,
        content: String,
    ) -> Option<PendingCommit> {
        if self.commit_in_progress {
            debug!("commit already in flight");
            return None;
        }
        if word_count == 0 {
            return None;
        }

        self.commit_in_progress = true;
        self.flush_current(now, current);

        Some(PendingCommit {
            content,
            metadata: SessionMetadata {
                average_color: self.average_color().to_hex(),
                dominant_state: self.dominant_state(),
                duration_ms: self.duration_ms(now),
                word_count,
            },
        })
    }

    /// Second half of a commit. The accumulator resets only on success.
    pub fn finish_commit(&mut self, succeeded: bool) {
        self.commit_in_progress = false;
        if succeeded {
            self.reset();
        }
    }

    pub fn shutdown(&mut self) {
        self.disarm_idle_check();
        self.timers.clear();
    }

    fn arm_idle_check(&mut self, now: Millis) {
        self.disarm_idle_check();
        self.idle_check = Some(self.timers.schedule(now, INACTIVITY_CHECK_MS, ()));
    }

    fn disarm_idle_check(&mut self) {
        if let Some(handle) = self.idle_check.take() {
            self.timers.cancel(handle);
        }
    }
}
