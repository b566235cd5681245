use crate::vibe::VibeState;

pub const MIN_WEIGHT: f64 = 300.0;
pub const MAX_WEIGHT: f64 = 700.0;
/// WPM at which the speed component reaches MAX_WEIGHT
const MAX_WPM_FOR_SCALE: f64 = 60.0;
const LERP_SPEED: f64 = 0.08;
/// Vibe and speed shares of the blend, in tenths
const VIBE_SHARE: f64 = 7.0;
const WPM_SHARE: f64 = 3.0;
const SNAP_DISTANCE: f64 = 1.0;
const SETTLE_DISTANCE: f64 = 0.5;

/// Where the weight is heading for a given speed and vibe
pub fn blended_target(wpm: u32, vibe: VibeState) -> f64 {
    let wpm_normalized = (wpm as f64 / MAX_WPM_FOR_SCALE).min(1.0);
    let wpm_weight = MIN_WEIGHT + wpm_normalized * (MAX_WEIGHT - MIN_WEIGHT);
    let vibe_weight = vibe.profile().font_weight as f64;

    ((vibe_weight * VIBE_SHARE + wpm_weight * WPM_SHARE) / 10.0).clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Smooths the discrete vibe plus live WPM into a font weight.
///
/// Each animation frame moves the current value a fixed fraction of the way
/// to the target; the loop stops once it has settled.
#[derive(Debug, Clone)]
pub struct WeightInterpolator {
    current: f64,
    target: f64,
    inputs: Option<(u32, VibeState)>,
    running: bool,
}

impl WeightInterpolator {
    pub fn new(initial: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            inputs: None,
            running: false,
        }
    }

    /// Restart the approach toward a new target if the inputs changed
    pub fn set_inputs(&mut self, wpm: u32, vibe: VibeState) {
        if self.inputs == Some((wpm, vibe)) {
            return;
        }
        self.inputs = Some((wpm, vibe));
        self.target = blended_target(wpm, vibe);
        self.running = true;
    }

    /// One animation frame. Returns whether another frame is wanted.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.current += (self.target - self.current) * LERP_SPEED;
        if (self.target - self.current).abs() < SNAP_DISTANCE {
            self.current = self.target;
        }

        self.running = (self.target - self.current).abs() > SETTLE_DISTANCE;
        self.running
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// The value handed to the presentation layer
    pub fn rendered(&self) -> u16 {
        self.current.round() as u16
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_animating(&self) -> bool {
        self.running
    }

    pub fn teardown(&mut self) {
        self.running = false;
    }
}

impl Default for WeightInterpolator {
    fn default() -> Self {
        Self::new(VibeState::Neutral.profile().font_weight as f64)
    }
}
