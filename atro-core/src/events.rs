use std::sync::Arc;

use atro_model::DashboardEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One event as issued by the bus, numbered in publish order.
#[derive(Debug, Clone)]
pub struct EventFrame {
    pub sequence: u64,
    pub event: DashboardEvent,
}

pub type EventReceiver = mpsc::UnboundedReceiver<EventFrame>;

/// Fan-in point for every dashboard-visible mutation.
///
/// Producers (supervisor, command handlers, subscriptions) publish here;
/// exactly one consumer drains the receiver and fans out to clients, so all
/// clients observe the same order.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<EventFrame>,
    sequence: Arc<Mutex<u64>>,
}

impl EventBus {
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                sequence: Arc::new(Mutex::new(0)),
            },
            rx,
        )
    }

    /// Returns the assigned sequence number, or `None` once the consumer
    /// is gone.
    pub fn publish(&self, event: DashboardEvent) -> Option<u64> {
        // Numbering and enqueueing happen under one lock so sequence order
        // matches channel order.
        let mut sequence = self.sequence.lock();
        *sequence += 1;
        let frame = EventFrame {
            sequence: *sequence,
            event,
        };
        let kind = frame.event.kind();
        match self.tx.send(frame) {
            Ok(()) => Some(*sequence),
            Err(_) => {
                tracing::debug!(kind, "event bus closed; dropping event");
                None
            }
        }
    }

    /// Highest sequence issued so far; zero before the first publish.
    pub fn last_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
