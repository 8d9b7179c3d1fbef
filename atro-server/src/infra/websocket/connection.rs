use std::fmt;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Frames a client may have queued before new events are skipped for it.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// What happened to one frame offered to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Client is not keeping up; this frame is dropped for it.
    Full,
    /// Writer task is gone; the connection should be pruned.
    Closed,
}

/// One dashboard client. Frames are pre-serialized JSON text; a writer
/// task owned by the socket handler drains the queue.
///
/// A connection registered before its snapshot exists holds broadcasts
/// aside until [`Connection::release`] puts the snapshot in front of them.
pub struct Connection {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Utf8Bytes>,
    held: Mutex<Option<Vec<(u64, Utf8Bytes)>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("channel_closed", &self.sender.is_closed())
            .field("awaiting_snapshot", &self.held.lock().is_some())
            .field("queued", &(self.sender.max_capacity() - self.sender.capacity()))
            .finish()
    }
}

impl Connection {
    pub fn new(sender: mpsc::Sender<Utf8Bytes>) -> Self {
        Self {
            id: Uuid::now_v7(),
            connected_at: Utc::now(),
            sender,
            held: Mutex::new(None),
        }
    }

    /// Connection plus the receiving end its writer task drains.
    pub fn channel() -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (Self::new(tx), rx)
    }

    /// Like [`Connection::channel`], but broadcasts are held until
    /// [`Connection::release`].
    pub fn awaiting_snapshot() -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (connection, rx) = Self::channel();
        *connection.held.lock() = Some(Vec::new());
        (connection, rx)
    }

    /// Queue the frame for event `sequence` without waiting.
    pub fn offer(&self, sequence: u64, frame: Utf8Bytes) -> Delivery {
        let mut held = self.held.lock();
        match held.as_mut() {
            Some(_) if self.sender.is_closed() => Delivery::Closed,
            Some(frames) if frames.len() >= OUTBOUND_QUEUE_CAPACITY => Delivery::Full,
            Some(frames) => {
                frames.push((sequence, frame));
                Delivery::Queued
            }
            None => self.queue(frame),
        }
    }

    /// Queue `snapshot` first, then every held frame newer than
    /// `watermark`; later offers go straight to the queue.
    ///
    /// Events up to `watermark` were issued before the snapshot was read,
    /// so it already reflects them.
    pub fn release(&self, snapshot: Option<Utf8Bytes>, watermark: u64) -> Delivery {
        let mut held = self.held.lock();
        let frames = held.take().unwrap_or_default();
        let mut delivery = match snapshot {
            Some(frame) => self.queue(frame),
            None => Delivery::Queued,
        };
        for (sequence, frame) in frames {
            if sequence > watermark && delivery == Delivery::Queued {
                delivery = self.queue(frame);
            }
        }
        delivery
    }

    fn queue(&self, frame: Utf8Bytes) -> Delivery {
        match self.sender.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_reports_full_and_closed_queues() {
        let (tx, mut rx) = mpsc::channel(1);
        let connection = Connection::new(tx);

        assert_eq!(connection.offer(1, "one".into()), Delivery::Queued);
        assert_eq!(connection.offer(2, "two".into()), Delivery::Full);
        assert_eq!(rx.try_recv().unwrap().as_str(), "one");

        drop(rx);
        assert!(connection.is_closed());
        assert_eq!(connection.offer(3, "three".into()), Delivery::Closed);
    }

    fn drain(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Vec<String> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|frame| frame.as_str().to_string())
            .collect()
    }

    #[test]
    fn snapshot_goes_first_and_covered_events_are_dropped() {
        let (connection, mut rx) = Connection::awaiting_snapshot();

        assert_eq!(connection.offer(4, "in snapshot".into()), Delivery::Queued);
        assert_eq!(connection.offer(5, "after snapshot".into()), Delivery::Queued);
        assert!(drain(&mut rx).is_empty());

        assert_eq!(
            connection.release(Some("snapshot".into()), 4),
            Delivery::Queued
        );
        assert_eq!(connection.offer(6, "live".into()), Delivery::Queued);

        assert_eq!(drain(&mut rx), ["snapshot", "after snapshot", "live"]);
    }

    #[test]
    fn release_without_snapshot_keeps_newer_events() {
        let (connection, mut rx) = Connection::awaiting_snapshot();
        connection.offer(1, "old".into());
        connection.offer(2, "new".into());

        connection.release(None, 1);
        assert_eq!(drain(&mut rx), ["new"]);
    }
}
