use std::collections::{BTreeMap, HashMap};

use crate::clock::Millis;

/// Handle returned by [`TimerQueue::schedule`], used to cancel the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// A timer that has come due
#[derive(Debug, Clone, PartialEq)]
pub struct DueTimer<T> {
    pub handle: TimerHandle,
    pub deadline: Millis,
    pub payload: T,
}

/// One-shot timers ordered by deadline. Timers sharing a deadline fire in the
/// order they were scheduled. Nothing fires on its own: the owner pops due
/// timers as its clock advances.
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    queue: BTreeMap<(Millis, u64), T>,
    deadlines: HashMap<u64, Millis>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, now: Millis, delay: Millis, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now.saturating_add(delay);
        self.queue.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Cancel a pending timer. Returns its payload if it was still armed.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let deadline = self.deadlines.remove(&handle.0)?;
        self.queue.remove(&(deadline, handle.0))
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn deadline(&self, handle: TimerHandle) -> Option<Millis> {
        self.deadlines.get(&handle.0).copied()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<DueTimer<T>> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > now {
            return None;
        }
        let payload = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some(DueTimer {
            handle: TimerHandle(id),
            deadline,
            payload,
        })
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
