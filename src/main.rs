mod ui;

use std::fs::OpenOptions;
use std::io::{self, stdin};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::KeyEvent,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    Frame, Terminal,
};
use tracing::{error, info, warn};

use vessel::{
    app_dirs::AppDirs,
    ash::AshAnimation,
    clock::{Millis, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    document::BlockDocument,
    engine::{CloseOutcome, EngineEvent, Vessel},
    keymap::{cadence_input, command_for, Command},
    runtime::{ChannelSource, EventSource, Runner, VesselEvent},
    transient::WritingMode,
    vault::{GateStep, SqliteVault, VaultBrowser, VaultGate},
};

/// How long a status message stays in the status line
const STATUS_TTL_MS: Millis = 3_000;

/// distraction-free writing surface that reads your typing cadence
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A distraction-free writing TUI. The page takes on the colour and weight of your typing cadence, finished sessions go to a local vault, and in transient mode untouched paragraphs fade away."
)]
pub struct Cli {
    /// start in transient mode: paragraphs left alone fade and disappear
    #[clap(short = 't', long)]
    transient: bool,

    /// vault database to use instead of the default location
    #[clap(long, value_name = "PATH")]
    vault: Option<PathBuf>,

    /// milliseconds between timer and animation ticks
    #[clap(long, value_name = "MS")]
    tick_rate: Option<u64>,

    /// store the options given here as the new defaults
    #[clap(long)]
    save_config: bool,

    /// debug logging to the log file
    #[clap(short, long)]
    verbose: bool,
}

impl Cli {
    /// Command-line flags win over the stored config
    fn apply(&self, config: &mut Config) {
        if self.transient {
            config.start_mode = WritingMode::Transient;
        }
        if let Some(path) = &self.vault {
            config.vault_path = Some(path.clone());
        }
        if let Some(ms) = self.tick_rate {
            config.tick_rate_ms = ms;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Writing,
    VaultGate,
    Vault,
    VaultSession,
}

pub type Engine = Vessel<BlockDocument, SystemClock, SqliteVault>;

pub struct App {
    pub engine: Engine,
    pub state: AppState,
    pub gate: Option<VaultGate>,
    pub browser: VaultBrowser,
    pub ash: Option<AshAnimation>,
    pub show_help: bool,
    pub status: Option<(String, Millis)>,
    pub should_quit: bool,
}

impl App {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            state: AppState::Writing,
            gate: None,
            browser: VaultBrowser::new(),
            ash: None,
            show_help: false,
            status: None,
            should_quit: false,
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status.as_ref().map(|(msg, _)| msg.as_str())
    }

    pub fn on_key(&mut self, key: KeyEvent, width: u16, height: u16) {
        let cmd = command_for(&key);
        if cmd == Command::Quit {
            self.quit();
            return;
        }

        if self.show_help {
            if matches!(cmd, Command::Help | Command::Back) {
                self.show_help = false;
            }
            return;
        }

        match self.state {
            AppState::Writing => self.on_writing_key(&key, cmd, width, height),
            AppState::VaultGate => self.on_gate_key(cmd),
            AppState::Vault => self.on_vault_key(cmd),
            AppState::VaultSession => self.on_session_key(cmd),
        }
    }

    /// Fire due timers and step animations. Returns whether a redraw is needed.
    pub fn on_tick(&mut self) -> bool {
        let events = self.engine.advance();
        let mut dirty = !events.is_empty();
        self.handle_events(events);

        dirty |= self.engine.frame();

        let now = self.engine.now();
        if let Some(ash) = &mut self.ash {
            dirty = true;
            if !ash.update(now) {
                self.ash = None;
            }
        }

        if self
            .status
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_sub(*at) > STATUS_TTL_MS)
        {
            self.status = None;
            dirty = true;
        }
        dirty
    }

    fn on_writing_key(&mut self, key: &KeyEvent, cmd: Command, width: u16, height: u16) {
        if let Some(is_deletion) = cadence_input(key) {
            let events = self.engine.record_keystroke(is_deletion);
            self.handle_events(events);
        }

        let events = match cmd {
            Command::ToggleMode => {
                let mode = self.engine.toggle_mode();
                self.set_status(format!("{mode} mode"));
                Vec::new()
            }
            Command::Dissolve => {
                let snapshot = self.engine.dissolve();
                let page = ui::page_area(Rect::new(0, 0, width, height));
                let ash = AshAnimation::new(&snapshot, page.width, page.height);
                self.ash = ash.is_active.then_some(ash);
                Vec::new()
            }
            Command::OpenVault => {
                let committed = self.engine.open_vault();
                self.gate = Some(VaultGate::open(self.engine.vault()));
                self.state = AppState::VaultGate;
                committed.into_iter().collect()
            }
            Command::Help => {
                self.show_help = true;
                Vec::new()
            }
            Command::Insert(c) => self.engine.edit(|doc| doc.insert_char(c)),
            Command::Newline => self.engine.edit(BlockDocument::split_block),
            Command::Backspace => self.engine.edit(BlockDocument::backspace),
            Command::Delete => self.engine.edit(BlockDocument::delete_forward),
            Command::Left => self.move_cursor(BlockDocument::move_left),
            Command::Right => self.move_cursor(BlockDocument::move_right),
            Command::Up => self.move_cursor(BlockDocument::move_up),
            Command::Down => self.move_cursor(BlockDocument::move_down),
            Command::Home => self.move_cursor(BlockDocument::move_home),
            Command::End => self.move_cursor(BlockDocument::move_end),
            Command::Back | Command::Quit | Command::Ignore => Vec::new(),
        };
        self.handle_events(events);
    }

    fn move_cursor(&mut self, f: fn(&mut BlockDocument)) -> Vec<EngineEvent> {
        f(self.engine.document_mut());
        Vec::new()
    }

    fn on_gate_key(&mut self, cmd: Command) {
        let Some(gate) = self.gate.as_mut() else {
            self.state = AppState::Writing;
            return;
        };

        match cmd {
            Command::Insert(c) => gate.push_char(c),
            Command::Backspace => gate.backspace(),
            Command::Newline => {
                if gate.submit(self.engine.vault_mut()) == GateStep::Unlocked {
                    self.gate = None;
                    self.browser.refresh(self.engine.vault());
                    self.state = AppState::Vault;
                }
            }
            Command::Back => {
                self.gate = None;
                self.state = AppState::Writing;
            }
            _ => {}
        }
    }

    fn on_vault_key(&mut self, cmd: Command) {
        match cmd {
            Command::Up => self.browser.highlight_previous(),
            Command::Down => self.browser.highlight_next(),
            Command::Newline | Command::Right => {
                if self.browser.select_highlighted(self.engine.vault()) {
                    self.state = AppState::VaultSession;
                }
            }
            Command::Delete => {
                if let Some(id) = self.browser.highlighted().map(|s| s.id.clone()) {
                    if self.browser.remove(self.engine.vault_mut(), &id) {
                        self.set_status("session deleted".to_string());
                    }
                }
            }
            Command::Back | Command::OpenVault => self.state = AppState::Writing,
            _ => {}
        }
    }

    fn on_session_key(&mut self, cmd: Command) {
        match cmd {
            Command::Back | Command::Left => {
                self.browser.clear_selection();
                self.state = AppState::Vault;
            }
            Command::Delete => {
                if let Some(id) = self.browser.selected().map(|s| s.meta.id.clone()) {
                    if self.browser.remove(self.engine.vault_mut(), &id) {
                        self.set_status("session deleted".to_string());
                        self.state = AppState::Vault;
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_events(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::SessionCommitted { metadata, .. } => {
                    self.set_status(format!("session saved ({} words)", metadata.word_count));
                }
                EngineEvent::CommitFailed { reason } => {
                    warn!("commit failed: {reason}");
                    self.set_status("couldn't save session".to_string());
                }
                EngineEvent::VibeShifted(_)
                | EngineEvent::Lifecycle(_)
                | EngineEvent::SessionDiscarded { .. } => {}
            }
        }
    }

    fn set_status(&mut self, message: String) {
        let now = self.engine.now();
        self.status = Some((message, now));
    }

    fn quit(&mut self) {
        match self.engine.close() {
            CloseOutcome::Saved { id } => info!(%id, "saved session on exit"),
            CloseOutcome::SaveFailed { reason } => {
                error!("could not save session on exit: {reason}")
            }
            CloseOutcome::Closed => {}
        }
        self.should_quit = true;
    }
}

/// Log to a file in the state directory; the terminal belongs to the UI
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);
    if cli.save_config {
        store
            .save(&config)
            .with_context(|| format!("saving config to {}", store.path().display()))?;
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let vault_path = config
        .vault_path
        .clone()
        .or_else(AppDirs::vault_path)
        .unwrap_or_else(|| PathBuf::from("vessel_vault.db"));
    let vault = SqliteVault::open(&vault_path)
        .with_context(|| format!("opening vault at {}", vault_path.display()))?;

    let engine = Vessel::new(
        BlockDocument::default(),
        SystemClock::new(),
        vault,
        config.start_mode,
    );
    let mut app = App::new(engine);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let runner = Runner::with_tick_rate(ChannelSource::terminal(), config.tick_rate_ms);
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, S: EventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<S>,
) -> Result<()> {
    terminal.draw(|f| ui(app, f))?;

    while !app.should_quit {
        match runner.step() {
            VesselEvent::Tick => {
                if app.on_tick() {
                    terminal.draw(|f| ui(app, f))?;
                }
            }
            VesselEvent::Resize => {
                terminal.draw(|f| ui(app, f))?;
            }
            VesselEvent::Key(key) => {
                let size = terminal.size().unwrap_or_default();
                app.on_key(key, size.width, size.height);
                terminal.draw(|f| ui(app, f))?;
            }
        }
    }

    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
