use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cadence::CadenceMetrics;
use crate::clock::Millis;
use crate::scheduler::{TimerHandle, TimerQueue};

/// How often a resting (Neutral) writer is re-classified
pub const NEUTRAL_REEVAL_MS: Millis = 8_000;
/// Pause after which slow writing counts as contemplative
pub const PAUSE_THRESHOLD_MS: Millis = 3_000;

const GROUNDING_WPM: u32 = 30;
const GROUNDING_BACKSPACE: u32 = 30;
const INSPIRATION_WPM: u32 = 15;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VibeState {
    Grounding,
    Neutral,
    Inspiration,
}

impl VibeState {
    /// Fixed enumeration order, also the tie-break order for summaries
    pub const ALL: [VibeState; 3] = [
        VibeState::Grounding,
        VibeState::Neutral,
        VibeState::Inspiration,
    ];

    pub fn profile(self) -> VibeProfile {
        match self {
            VibeState::Grounding => VibeProfile {
                background: Rgb::new(0x2d, 0x34, 0x36),
                foreground: Rgb::new(0xe8, 0xe4, 0xdf),
                font_weight: 700,
            },
            VibeState::Neutral => VibeProfile {
                background: Rgb::new(0xf5, 0xf0, 0xeb),
                foreground: Rgb::new(0x2d, 0x34, 0x36),
                font_weight: 400,
            },
            VibeState::Inspiration => VibeProfile {
                background: Rgb::new(0xe1, 0x70, 0x55),
                foreground: Rgb::new(0xfd, 0xf6, 0xf0),
                font_weight: 300,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`, lowercase
    pub fn to_hex(self) -> String {
        self.to_string()
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Ambient presentation attached to each state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VibeProfile {
    pub background: Rgb,
    pub foreground: Rgb,
    pub font_weight: u16,
}

/// The state a set of metrics points at, before any hysteresis
pub fn classify(metrics: &CadenceMetrics) -> VibeState {
    if metrics.wpm > GROUNDING_WPM || metrics.backspace_frequency > GROUNDING_BACKSPACE {
        VibeState::Grounding
    } else if metrics.wpm < INSPIRATION_WPM && metrics.pause_duration_ms > PAUSE_THRESHOLD_MS {
        VibeState::Inspiration
    } else {
        VibeState::Neutral
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VibeTransition {
    pub from: VibeState,
    pub to: VibeState,
    pub at: Millis,
}

/// Holds the current vibe and applies the classification rules.
///
/// Non-neutral targets take effect on the cadence update that produces them.
/// Neutral is sticky: while resting there, a recurring timer re-runs the rules
/// against the latest metrics, since calm writing may produce no keystrokes.
#[derive(Debug)]
pub struct VibeClassifier {
    current: VibeState,
    previous: Option<VibeState>,
    metrics: CadenceMetrics,
    timers: TimerQueue<()>,
    reeval: Option<TimerHandle>,
}

impl VibeClassifier {
    /// Starts in Neutral with the re-evaluation timer armed
    pub fn new(now: Millis) -> Self {
        let mut classifier = Self {
            current: VibeState::Neutral,
            previous: None,
            metrics: CadenceMetrics::default(),
            timers: TimerQueue::new(),
            reeval: None,
        };
        classifier.arm_reeval(now);
        classifier
    }

    pub fn current(&self) -> VibeState {
        self.current
    }

    /// Last state that differed from the current one
    pub fn previous(&self) -> Option<VibeState> {
        self.previous
    }

    pub fn metrics(&self) -> CadenceMetrics {
        self.metrics
    }

    pub fn is_reeval_armed(&self) -> bool {
        self.reeval.is_some_and(|h| self.timers.is_armed(h))
    }

    /// Apply a fresh set of cadence metrics
    pub fn observe(&mut self, now: Millis, metrics: CadenceMetrics) -> Option<VibeTransition> {
        self.metrics = metrics;
        let target = classify(&metrics);

        if target != VibeState::Neutral {
            self.disarm_reeval();
            if target != self.current {
                return Some(self.transition(now, target));
            }
            None
        } else if self.current != VibeState::Neutral {
            Some(self.transition(now, VibeState::Neutral))
        } else {
            None
        }
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Run any re-evaluation that has come due by `now`
    pub fn fire_due(&mut self, now: Millis) -> Option<VibeTransition> {
        let due = self.timers.pop_due(now)?;
        self.reeval = None;

        let target = classify(&self.metrics);
        if target != VibeState::Neutral {
            return Some(self.transition(due.deadline, target));
        }

        // Still resting: keep polling on the same cadence
        self.arm_reeval(due.deadline);
        None
    }

    /// Tear down: no timer survives this
    pub fn shutdown(&mut self) {
        self.timers.clear();
        self.reeval = None;
    }

    fn transition(&mut self, now: Millis, to: VibeState) -> VibeTransition {
        let from = self.current;
        self.previous = Some(from);
        self.current = to;
        debug!(%from, %to, at = now, "vibe shift");

        if to == VibeState::Neutral {
            self.arm_reeval(now);
        } else {
            self.disarm_reeval();
        }

        VibeTransition { from, to, at: now }
    }

    fn arm_reeval(&mut self, now: Millis) {
        self.disarm_reeval();
        self.reeval = Some(self.timers.schedule(now, NEUTRAL_REEVAL_MS, ()));
    }

    fn disarm_reeval(&mut self) {
        if let Some(handle) = self.reeval.take() {
            self.timers.cancel(handle);
        }
    }
}
