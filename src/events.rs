// 📣 Notices & change events
// Two outward channels from AppState:
//   - Notifier: user-facing notices (fire and forget)
//   - EventBus: typed change events for whoever renders the data

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::time::Duration;

// ============================================================================
// NOTICES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// How long a notice should stay visible by default
    pub fn default_duration(&self) -> Duration {
        match self {
            Severity::Success | Severity::Info => Duration::from_secs(3),
            Severity::Warning => Duration::from_secs(5),
            Severity::Error => Duration::from_secs(6),
        }
    }
}

/// Receives user-facing notices. Nothing is returned to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity, duration: Duration);
}

/// Writes notices to the tracing subscriber
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity, _duration: Duration) {
        match severity {
            Severity::Success | Severity::Info => tracing::info!(target: "konomiza::notice", "{}", message),
            Severity::Warning => tracing::warn!(target: "konomiza::notice", "{}", message),
            Severity::Error => tracing::error!(target: "konomiza::notice", "{}", message),
        }
    }
}

// ============================================================================
// CHANGE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TransactionAdded { id: String },
    TransactionUpdated { id: String },
    TransactionDeleted { id: String },
    DuplicateFlagged { id: String, duplicate_of: String, confidence: u8 },
    DuplicatesResolved { removed: usize },
    CategoryLearned { name: String, category: String },
    CategoriesChanged,
    GoalChanged,
    DataImported { transactions: usize },
    DataCleared,
}

/// Events buffered per subscriber before new ones are dropped
pub const EVENT_BUFFER: usize = 256;

/// Fan-out of change events over bounded std channels.
///
/// Receivers are expected to drain with `try_iter` after each operation.
/// A subscriber whose buffer is full misses events until it drains; one
/// that dropped its receiver is pruned on the next publish.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Vec<SyncSender<Event>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::with_capacity(EVENT_BUFFER)
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        EventBus {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = sync_channel(self.capacity);
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: Event) {
        self.subscribers
            .retain(|subscriber| match subscriber.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(dropped)) => {
                    tracing::warn!(event = ?dropped, "event subscriber lagging, event dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every notice so tests can assert on them
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        pub notices: Arc<Mutex<Vec<(String, Severity)>>>,
    }

    impl RecordingNotifier {
        pub fn messages(&self) -> Vec<(String, Severity)> {
            self.notices.lock().unwrap().clone()
        }

        pub fn contains(&self, needle: &str, severity: Severity) -> bool {
            self.messages()
                .iter()
                .any(|(m, s)| *s == severity && m.contains(needle))
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, severity: Severity, _duration: Duration) {
            self.notices
                .lock()
                .unwrap()
                .push((message.to_string(), severity));
        }
    }
}
