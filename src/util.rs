use crate::clock::Millis;
use crate::vibe::Rgb;

/// Relative luminance above which a colour counts as light
const LIGHT_LUMINANCE: f64 = 0.55;

/// Whitespace-delimited token count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Compact duration for session listings: `45m`, `1h 5m`, `2h`
pub fn format_duration(ms: Millis) -> String {
    let minutes = (ms as f64 / 60_000.0).round() as u64;
    let hours = minutes / 60;
    let rest = minutes % 60;

    match (hours, rest) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

pub fn is_light_color(color: Rgb) -> bool {
    let luminance =
        (0.299 * color.r as f64 + 0.587 * color.g as f64 + 0.114 * color.b as f64) / 255.0;
    luminance > LIGHT_LUMINANCE
}

/// Per-channel weighted blend. Weights need not sum to one; `None` when they sum to zero.
pub fn weighted_blend(parts: &[(Rgb, f64)]) -> Option<Rgb> {
    let total: f64 = parts.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }

    let channel = |pick: fn(&Rgb) -> u8| {
        let sum: f64 = parts.iter().map(|(c, w)| pick(c) as f64 * w).sum();
        (sum / total).round().clamp(0.0, 255.0) as u8
    };
    Some(Rgb::new(channel(|c| c.r), channel(|c| c.g), channel(|c| c.b)))
}
