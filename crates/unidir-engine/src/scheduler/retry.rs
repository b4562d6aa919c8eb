//! Bounded in-memory retry queue.
//!
//! Explicit retry-state records drained by a single timer loop, instead of
//! recursive delayed closures: exhaustion is decided by the `attempt`
//! counter carried on each record. Pending retries are lost on process
//! restart; that is a documented limitation, not masked.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use unidir_core::Source;

/// One pending retry of a schedule's failed run.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// The schedule being retried.
    pub schedule_id: Uuid,
    /// Source the schedule syncs.
    pub source: Source,
    /// 1-based attempt number within this failure chain.
    pub attempt: u32,
    /// Total retries budgeted for the chain.
    pub max_attempts: u32,
    /// When the retry becomes due.
    pub next_attempt_at: DateTime<Utc>,
}

/// Default capacity of the queue.
const DEFAULT_CAPACITY: usize = 64;

/// Bounded queue of pending retries.
#[derive(Debug)]
pub struct RetryQueue {
    entries: Mutex<Vec<RetryState>>,
    capacity: usize,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RetryQueue {
    /// Create a queue with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue with a specific capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Enqueue a retry. Returns `false` (and drops the retry) when full.
    pub fn push(&self, state: RetryState) -> bool {
        let mut entries = self.entries.lock().expect("retry queue lock poisoned");
        if entries.len() >= self.capacity {
            warn!(
                schedule_id = %state.schedule_id,
                attempt = state.attempt,
                "Retry queue full, dropping retry"
            );
            return false;
        }
        entries.push(state);
        true
    }

    /// Remove and return every retry due at `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<RetryState> {
        let mut entries = self.entries.lock().expect("retry queue lock poisoned");
        let (due, pending): (Vec<RetryState>, Vec<RetryState>) = entries
            .drain(..)
            .partition(|state| state.next_attempt_at <= now);
        *entries = pending;
        due
    }

    /// Number of pending retries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("retry queue lock poisoned").len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn state(minutes_from_now: i64) -> RetryState {
        RetryState {
            schedule_id: Uuid::new_v4(),
            source: Source::Ldap,
            attempt: 1,
            max_attempts: 3,
            next_attempt_at: Utc::now() + Duration::minutes(minutes_from_now),
        }
    }

    #[test]
    fn test_take_due_leaves_future_entries() {
        let queue = RetryQueue::new();
        queue.push(state(-5));
        queue.push(state(-1));
        queue.push(state(10));

        let due = queue.take_due(Utc::now());
        assert_eq!(due.len(), 2);
        assert_eq!(queue.len(), 1);

        let due = queue.take_due(Utc::now() + Duration::minutes(15));
        assert_eq!(due.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let queue = RetryQueue::with_capacity(2);
        assert!(queue.push(state(1)));
        assert!(queue.push(state(1)));
        assert!(!queue.push(state(1)));
        assert_eq!(queue.len(), 2);
    }
}
