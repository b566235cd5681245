use std::collections::VecDeque;

use serde::Serialize;

use crate::clock::Millis;

/// Rolling window the metrics are computed over
pub const WINDOW_MS: Millis = 10_000;

/// Characters per "word" when converting keystrokes to WPM
const CHARS_PER_WORD: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeystrokeEvent {
    pub timestamp: Millis,
    pub is_deletion: bool,
}

/// Behavioral metrics for the current window
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CadenceMetrics {
    pub wpm: u32,
    /// Share of keystrokes in the window that were deletions, 0-100
    pub backspace_frequency: u32,
    /// Time since the previous keystroke
    pub pause_duration_ms: Millis,
}

impl CadenceMetrics {
    pub fn new(wpm: u32, backspace_frequency: u32, pause_duration_ms: Millis) -> Self {
        Self {
            wpm,
            backspace_frequency,
            pause_duration_ms,
        }
    }
}

/// Turns raw keystroke timing into [`CadenceMetrics`]
#[derive(Debug, Default)]
pub struct CadenceAnalyzer {
    buffer: VecDeque<KeystrokeEvent>,
    last_keystroke: Option<Millis>,
}

impl CadenceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one qualifying keystroke (callers filter out modifier-only keys)
    pub fn record_keystroke(&mut self, now: Millis, is_deletion: bool) -> CadenceMetrics {
        let pause_duration_ms = self
            .last_keystroke
            .map_or(0, |last| now.saturating_sub(last));
        self.last_keystroke = Some(now);

        self.buffer.push_back(KeystrokeEvent {
            timestamp: now,
            is_deletion,
        });

        let cutoff = now.saturating_sub(WINDOW_MS);
        while self
            .buffer
            .front()
            .is_some_and(|event| event.timestamp < cutoff)
        {
            self.buffer.pop_front();
        }

        let total = self.buffer.len();
        if total < 2 {
            return CadenceMetrics::new(0, 0, pause_duration_ms);
        }

        let deletions = self.buffer.iter().filter(|e| e.is_deletion).count();
        let typed = total - deletions;

        let oldest = self.buffer.front().map_or(now, |e| e.timestamp);
        let newest = self.buffer.back().map_or(now, |e| e.timestamp);
        let span_ms = newest.saturating_sub(oldest).max(1) as f64;

        let wpm = (typed as f64 / CHARS_PER_WORD) / (span_ms / 60_000.0);
        let backspace_frequency = deletions as f64 / total as f64 * 100.0;

        CadenceMetrics::new(
            wpm.round() as u32,
            backspace_frequency.round() as u32,
            pause_duration_ms,
        )
    }

    /// Keystrokes currently inside the window
    pub fn window(&self) -> impl Iterator<Item = &KeystrokeEvent> {
        self.buffer.iter()
    }

    pub fn last_keystroke(&self) -> Option<Millis> {
        self.last_keystroke
    }
}
