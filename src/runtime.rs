//! Input side of the app loop. Terminal events arrive over a channel and a
//! quiet tick interval becomes `VesselEvent::Tick`, which is when the engine
//! fires its timers and the overlays animate.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};
use tracing::warn;

#[derive(Clone, Debug)]
pub enum VesselEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

impl VesselEvent {
    /// Key presses and repeats plus resizes; releases, focus, mouse and paste
    /// are ignored
    pub fn from_terminal(event: CtEvent) -> Option<Self> {
        match event {
            CtEvent::Key(key) if key.kind != KeyEventKind::Release => Some(Self::Key(key)),
            CtEvent::Resize(_, _) => Some(Self::Resize),
            _ => None,
        }
    }
}

pub trait EventSource {
    /// Next event if one shows up within `timeout`
    fn next_within(&self, timeout: Duration) -> Option<VesselEvent>;
}

/// Events pushed by another thread: the terminal reader in the binary, a
/// test's sender otherwise
pub struct ChannelSource {
    rx: Receiver<VesselEvent>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<VesselEvent>) -> Self {
        Self { rx }
    }

    /// Spawn a reader that forwards crossterm events until the terminal
    /// fails or the source is dropped
    pub fn terminal() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || loop {
            let ev = match event::read() {
                Ok(ev) => ev,
                Err(e) => {
                    warn!("terminal input closed: {e}");
                    break;
                }
            };
            let Some(ev) = VesselEvent::from_terminal(ev) else {
                continue;
            };
            if tx.send(ev).is_err() {
                break;
            }
        });
        Self::new(rx)
    }
}

impl EventSource for ChannelSource {
    fn next_within(&self, timeout: Duration) -> Option<VesselEvent> {
        // a closed channel idles like a timeout so timers keep running
        self.rx.recv_timeout(timeout).ok()
    }
}

pub struct Runner<S: EventSource> {
    source: S,
    tick: Duration,
}

impl<S: EventSource> Runner<S> {
    /// `tick` is raised to at least 1ms
    pub fn new(source: S, tick: Duration) -> Self {
        Self {
            source,
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn with_tick_rate(source: S, tick_rate_ms: u64) -> Self {
        Self::new(source, Duration::from_millis(tick_rate_ms))
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Wait one tick for input
    pub fn step(&self) -> VesselEvent {
        self.source.next_within(self.tick).unwrap_or(VesselEvent::Tick)
    }
}
