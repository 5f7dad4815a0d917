//! Keyed one-shot timers.
//!
//! The queue only stores deadlines; the host runtime sleeps until
//! [`TimerQueue::next_deadline`] and then asks for the due keys. Tests drive
//! it with synthetic clocks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::effect::TimerKey;

/// Pending deadlines, at most one per key.
#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: HashMap<TimerKey, DateTime<Utc>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `key` at `at`, replacing any pending deadline for the same key.
    pub fn schedule(&mut self, key: TimerKey, at: DateTime<Utc>) {
        if self.deadlines.insert(key, at).is_some() {
            tracing::trace!(?key, %at, "timer re-armed");
        }
    }

    /// Disarms `key`. Returns whether it was pending.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.deadlines.remove(&key).is_some()
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.deadlines.contains_key(&key)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every key due at `now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<TimerKey> {
        let mut due: Vec<(DateTime<Utc>, TimerKey)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*at, *key))
            .collect();
        due.sort();

        for (_, key) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn schedule_replaces_existing_deadline() {
        let mut queue = TimerQueue::new();
        let key = TimerKey::FocusEnd { session: 1 };
        queue.schedule(key, t(10_000));
        queue.schedule(key, t(5_000));

        assert_eq!(queue.next_deadline(), Some(t(5_000)));
        assert_eq!(queue.pop_due(t(10_000)), vec![key]);
    }

    #[test]
    fn pop_due_returns_keys_in_deadline_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(TimerKey::FocusEndedNotice { session: 1 }, t(300));
        queue.schedule(TimerKey::FocusEnd { session: 2 }, t(100));
        queue.schedule(TimerKey::FocusEnd { session: 3 }, t(900));

        let due = queue.pop_due(t(300));
        assert_eq!(
            due,
            vec![
                TimerKey::FocusEnd { session: 2 },
                TimerKey::FocusEndedNotice { session: 1 },
            ]
        );
        assert!(queue.is_pending(TimerKey::FocusEnd { session: 3 }));
        assert!(queue.pop_due(t(300)).is_empty());
        assert_eq!(queue.next_deadline(), Some(t(900)));
    }

    #[test]
    fn cancel_disarms() {
        let mut queue = TimerQueue::new();
        let key = TimerKey::FocusEnd { session: 1 };
        queue.schedule(key, t(0));
        assert!(queue.cancel(key));
        assert!(!queue.cancel(key));
        assert!(queue.pop_due(t(0) + Duration::hours(1)).is_empty());
        assert_eq!(queue.next_deadline(), None);
    }
}
