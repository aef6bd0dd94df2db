//! Control-thread task queue for self-addressed messages.
//!
//! A session never calls back into itself while a caller may still depend on
//! the pre-call state. Instead it posts a message here and the owner of the
//! control thread delivers it later with [`TaskQueue::pop`]. Immediate posts
//! are delivered in post order; delayed posts join the back of that order once
//! their deadline has passed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Delayed<M> {
    due: Instant,
    seq: u64,
    message: M,
}

/// FIFO of immediate messages plus a set of delayed ones.
#[derive(Debug)]
pub struct TaskQueue<M> {
    immediate: VecDeque<M>,
    delayed: Vec<Delayed<M>>,
    next_seq: u64,
}

impl<M> Default for TaskQueue<M> {
    fn default() -> Self {
        Self {
            immediate: VecDeque::new(),
            delayed: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<M: PartialEq> TaskQueue<M> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a message for delivery on the next pass.
    pub fn post(&mut self, message: M) {
        self.immediate.push_back(message);
    }

    /// Post a message for delivery once `delay` has elapsed after `now`.
    ///
    /// A deadline past the representable range can never fall due, so the
    /// message is dropped and `false` returned.
    pub fn post_delayed(&mut self, now: Instant, delay: Duration, message: M) -> bool {
        let Some(due) = now.checked_add(delay) else {
            return false;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.delayed.push(Delayed { due, seq, message });
        true
    }

    /// Remove every undelivered message equal to `message`.
    ///
    /// Returns how many were removed.
    pub fn clear(&mut self, message: &M) -> usize {
        let before = self.len();
        self.immediate.retain(|m| m != message);
        self.delayed.retain(|d| &d.message != message);
        before - self.len()
    }

    /// Whether an undelivered message equal to `message` is queued.
    pub fn contains(&self, message: &M) -> bool {
        self.immediate.iter().any(|m| m == message)
            || self.delayed.iter().any(|d| &d.message == message)
    }

    /// Earliest deadline among delayed messages.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.delayed.iter().map(|d| d.due).min()
    }

    /// Whether a message is deliverable at `now`.
    pub fn has_ready(&self, now: Instant) -> bool {
        !self.immediate.is_empty() || self.delayed.iter().any(|d| d.due <= now)
    }

    /// Take the next message deliverable at `now`.
    pub fn pop(&mut self, now: Instant) -> Option<M> {
        self.promote_due(now);
        self.immediate.pop_front()
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn promote_due(&mut self, now: Instant) {
        if !self.delayed.iter().any(|d| d.due <= now) {
            return;
        }
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|d| d.due <= now);
        self.delayed = pending;
        due.sort_by_key(|d| (d.due, d.seq));
        self.immediate.extend(due.into_iter().map(|d| d.message));
    }
}
