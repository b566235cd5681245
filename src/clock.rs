use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Milliseconds on the engine's time axis.
pub type Millis = u64;

/// Source of "now" for every timer in the engine
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Monotonic wall clock, measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Virtual clock for tests. Clones share the same time, so a test can keep a
/// handle and advance the clock the engine reads from.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Millis) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Millis) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}
