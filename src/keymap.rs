use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press means on the writing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleMode,
    Dissolve,
    OpenVault,
    Help,
    Quit,
    Back,
    Insert(char),
    Newline,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    Ignore,
}

impl Command {
    /// Shortcuts act on the app rather than on the text
    pub fn is_shortcut(self) -> bool {
        matches!(
            self,
            Command::ToggleMode
                | Command::Dissolve
                | Command::OpenVault
                | Command::Help
                | Command::Quit
                | Command::Back
        )
    }
}

pub fn command_for(key: &KeyEvent) -> Command {
    if key.kind == KeyEventKind::Release {
        return Command::Ignore;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('t') => Command::ToggleMode,
            KeyCode::Char('d') => Command::Dissolve,
            KeyCode::Char('o') => Command::OpenVault,
            KeyCode::Char('q') | KeyCode::Char('c') => Command::Quit,
            _ => Command::Ignore,
        };
    }

    match key.code {
        KeyCode::F(1) => Command::Help,
        KeyCode::Esc => Command::Back,
        KeyCode::Char(c) => Command::Insert(c),
        KeyCode::Enter => Command::Newline,
        KeyCode::Backspace => Command::Backspace,
        KeyCode::Delete => Command::Delete,
        KeyCode::Left => Command::Left,
        KeyCode::Right => Command::Right,
        KeyCode::Up => Command::Up,
        KeyCode::Down => Command::Down,
        KeyCode::Home => Command::Home,
        KeyCode::End => Command::End,
        _ => Command::Ignore,
    }
}

/// Whether a key press feeds the cadence analyzer, and if so whether it is a
/// deletion. Modifier-only keys, Tab, Esc and shortcuts never count.
pub fn cadence_input(key: &KeyEvent) -> Option<bool> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Modifier(_) | KeyCode::CapsLock | KeyCode::Tab | KeyCode::BackTab => {
            return None
        }
        _ => {}
    }

    match command_for(key) {
        Command::Ignore => None,
        cmd if cmd.is_shortcut() => None,
        Command::Backspace | Command::Delete => Some(true),
        _ => Some(false),
    }
}
