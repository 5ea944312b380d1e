//! Deadline-ordered action queue for active reservations.
//!
//! Soonest deadline first; equal deadlines keep insertion order (new
//! entries land after existing ones with the same deadline). One entry per
//! reservation.

use crate::parameters::MAX_RANGES;
use crate::RangeId;
use embedded_time::duration::{Generic, Nanoseconds};
use embedded_time::{Clock, Instant};
use heapless::Vec;

/// One scheduled action.
pub struct TimerEntry<C: Clock> {
    pub deadline: Instant<C>,
    pub id: RangeId,
}

pub struct TimerQueue<C: Clock> {
    entries: Vec<TimerEntry<C>, MAX_RANGES>,
}

impl<C: Clock> TimerQueue<C> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Schedule `id` at `deadline`, replacing any earlier schedule for the
    /// same reservation.
    pub fn push(&mut self, id: RangeId, deadline: Instant<C>) {
        self.remove(id);
        let at = self
            .entries
            .iter()
            .position(|e| deadline < e.deadline)
            .unwrap_or(self.entries.len());
        if self.entries.insert(at, TimerEntry { deadline, id }).is_err() {
            // capacity mirrors the reservation table; reachable only on an
            // upstream bookkeeping bug
            maap_warn!("timer queue full, dropping deadline for range {}", id);
        }
    }

    /// Drop the schedule for `id`, returning its deadline if one existed.
    pub fn remove(&mut self, id: RangeId) -> Option<Instant<C>> {
        let at = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(at).deadline)
    }

    /// Soonest entry, if any.
    pub fn peek(&self) -> Option<&TimerEntry<C>> {
        self.entries.first()
    }

    /// Pop the head if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant<C>) -> Option<TimerEntry<C>> {
        if self.entries.first()?.deadline <= now {
            Some(self.entries.remove(0))
        } else {
            None
        }
    }
}

impl<C: Clock<T = u64>> TimerQueue<C> {
    /// Time from `now` until the head fires; zero when already due, `None`
    /// when nothing is scheduled.
    pub fn delay_to_head(&self, now: Instant<C>) -> Option<Nanoseconds<u64>> {
        let head = self.entries.first()?;
        let remaining: Generic<u64> = match head.deadline.checked_duration_since(&now) {
            Some(d) => d,
            None => return Some(Nanoseconds(0)),
        };
        Some(Nanoseconds::<u64>::try_from(remaining).unwrap_or(Nanoseconds(u64::MAX)))
    }
}
