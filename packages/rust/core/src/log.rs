//! Append-only, ordered job log shown to the operator.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use scrapedesk_shared::LogEvent;

/// Ordered event log. Events are never removed, reordered, or edited.
#[derive(Debug, Default)]
pub struct LogSink {
    events: Mutex<Vec<LogEvent>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its sequence index.
    pub fn append(&self, message: impl Into<String>) -> u64 {
        let message = message.into();
        let mut events = self.lock();
        let seq = events.len() as u64;
        tracing::info!(target: "scrapedesk::joblog", seq, "{message}");
        events.push(LogEvent {
            seq,
            at: Utc::now(),
            message,
        });
        seq
    }

    /// Copy of every event so far.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.lock().clone()
    }

    /// Events with `seq >= from`, for tailing.
    pub fn since(&self, from: u64) -> Vec<LogEvent> {
        let events = self.lock();
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(events.len());
        events[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_indices_increase_in_append_order() {
        let log = LogSink::new();
        assert!(log.is_empty());
        assert_eq!(log.append("first"), 0);
        assert_eq!(log.append("second"), 1);
        assert_eq!(log.append("first"), 2);

        let events = log.snapshot();
        let messages: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "first"]);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq && w[0].at <= w[1].at));
    }

    #[test]
    fn since_returns_the_tail() {
        let log = LogSink::new();
        for i in 0..5 {
            log.append(format!("line {i}"));
        }
        let tail = log.since(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 3);
        assert!(log.since(99).is_empty());
    }

    #[test]
    fn growth_is_unbounded() {
        let log = LogSink::new();
        for i in 0..10_000 {
            log.append(format!("event {i}"));
        }
        assert_eq!(log.len(), 10_000);
        assert_eq!(log.snapshot()[9_999].message, "event 9999");
    }
}
