use ratatui::{buffer::Buffer, layout::Rect};

use crate::{
    ui::{render_gate, render_session, render_vault, render_writing},
    App, AppState,
};

/// A UI Screen boundary: draws one app state into the frame buffer
pub trait Screen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);
}

/// The page itself, tinted by the current vibe
pub struct WritingScreen;

impl Screen for WritingScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        render_writing(app, area, buf);
    }
}

/// Passphrase prompt in front of the vault
pub struct GateScreen;

impl Screen for GateScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        render_gate(app, area, buf);
    }
}

pub struct VaultScreen;

impl Screen for VaultScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        render_vault(app, area, buf);
    }
}

/// Read-only view of one stored session
pub struct SessionScreen;

impl Screen for SessionScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        render_session(app, area, buf);
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: AppState) -> Box<dyn Screen> {
    match state {
        AppState::Writing => Box::new(WritingScreen),
        AppState::VaultGate => Box::new(GateScreen),
        AppState::Vault => Box::new(VaultScreen),
        AppState::VaultSession => Box::new(SessionScreen),
    }
}
