// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod ash;
pub mod cadence;
pub mod clock;
pub mod config;
pub mod document;
pub mod engine;
pub mod keymap;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod transient;
pub mod util;
pub mod vault;
pub mod vibe;
pub mod weight;
