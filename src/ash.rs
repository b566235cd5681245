use rand::seq::SliceRandom;
use rand::Rng;

use crate::clock::Millis;
use crate::transient::DissolveSnapshot;
use crate::vibe::Rgb;

/// Hard stop for the animation
pub const MAX_DURATION_MS: Millis = 2_500;

const EMBER_COLORS: [Rgb; 6] = [
    Rgb::new(0xe1, 0x70, 0x55),
    Rgb::new(0xd3, 0x54, 0x00),
    Rgb::new(0xe7, 0x4c, 0x3c),
    Rgb::new(0xf3, 0x9c, 0x12),
    Rgb::new(0xc0, 0x39, 0x2b),
    Rgb::new(0x2d, 0x34, 0x36),
];

/// Per-frame physics, in terminal cells
const GRAVITY: f64 = 0.04;
const OPACITY_DECAY: f64 = 0.006;
const SIZE_DECAY: f64 = 0.997;

/// An ember born from one character of dissolved text
#[derive(Debug, Clone)]
pub struct AshParticle {
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub opacity: f64,
    pub size: f64,
    pub color: Rgb,
    pub symbol: char,
}

impl AshParticle {
    fn spawn<R: Rng>(x: f64, y: f64, symbol: char, rng: &mut R) -> Self {
        Self {
            x,
            y,
            vel_x: rng.gen_range(-0.3..0.3),
            // initial upward burst
            vel_y: -rng.gen_range(0.15..0.6),
            opacity: rng.gen_range(0.7..1.0),
            size: rng.gen_range(1.0..3.5),
            color: *EMBER_COLORS.choose(rng).unwrap_or(&EMBER_COLORS[0]),
            symbol,
        }
    }

    fn update(&mut self) {
        self.vel_y += GRAVITY;
        self.y += self.vel_y;
        self.x += self.vel_x;
        self.opacity -= OPACITY_DECAY;
        self.size *= SIZE_DECAY;
    }

    pub fn is_alive(&self) -> bool {
        self.opacity > 0.0
    }

    /// Letters cool into sparks as they fade
    pub fn glyph(&self) -> char {
        match self.opacity {
            o if o > 0.8 => self.symbol,
            o if o > 0.5 => '*',
            o if o > 0.2 => '·',
            _ => '.',
        }
    }
}

/// Overlay played after a dissolve: the old text bursts into embers that
/// fall and fade.
#[derive(Debug)]
pub struct AshAnimation {
    pub particles: Vec<AshParticle>,
    pub started_at: Millis,
    pub is_active: bool,
}

impl AshAnimation {
    pub fn new(snapshot: &DissolveSnapshot, width: u16, height: u16) -> Self {
        Self::with_rng(snapshot, width, height, &mut rand::thread_rng())
    }

    /// Lay the snapshot out the way the writing screen does (one blank row
    /// between blocks, hard wrap at `width`) and seed a particle per glyph.
    pub fn with_rng<R: Rng>(
        snapshot: &DissolveSnapshot,
        width: u16,
        height: u16,
        rng: &mut R,
    ) -> Self {
        let width = width.max(1) as usize;
        let mut particles = Vec::new();
        let mut row = 0usize;

        for block in &snapshot.blocks {
            let chars: Vec<char> = block.text.chars().collect();
            for (i, c) in chars.iter().enumerate() {
                let y = row + i / width;
                if y >= height as usize {
                    break;
                }
                if !c.is_whitespace() {
                    particles.push(AshParticle::spawn((i % width) as f64, y as f64, *c, rng));
                }
            }
            row += chars.len().max(1).div_ceil(width) + 1;
        }

        Self {
            is_active: !particles.is_empty(),
            particles,
            started_at: snapshot.at,
        }
    }

    /// Advance one frame. Returns whether the overlay should keep playing.
    pub fn update(&mut self, now: Millis) -> bool {
        if !self.is_active {
            return false;
        }

        for particle in self.particles.iter_mut().filter(|p| p.is_alive()) {
            particle.update();
        }

        let elapsed = now.saturating_sub(self.started_at);
        if elapsed > MAX_DURATION_MS || !self.particles.iter().any(AshParticle::is_alive) {
            self.is_active = false;
            self.particles.clear();
        }
        self.is_active
    }
}
