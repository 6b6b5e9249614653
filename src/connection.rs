use crate::error::{AltitudeError, Result};
use crate::protocol::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use uuid::Uuid;

/// A command waiting for its `OK` / `ERROR` reply
struct PendingAck {
    id: Uuid,
    tx: oneshot::Sender<Result<Message>>,
}

/// Receiving half of an enqueued ack waiter
pub(crate) struct AckWaiter {
    pub id: Uuid,
    pub rx: oneshot::Receiver<Result<Message>>,
}

/// FIFO of outstanding ack waiters
///
/// Replies carry no request id, so each reply resolves the oldest waiter.
#[derive(Default)]
pub(crate) struct AckQueue {
    pending: Mutex<VecDeque<PendingAck>>,
}

impl AckQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingAck>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new waiter at the back of the queue
    pub fn enqueue(&self) -> AckWaiter {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.lock().push_back(PendingAck { id, tx });
        AckWaiter { id, rx }
    }

    /// Drop a waiter that timed out or whose send failed
    pub fn remove(&self, id: Uuid) -> bool {
        let mut pending = self.lock();
        match pending.iter().position(|p| p.id == id) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Hand a reply to the oldest waiter.
    ///
    /// Each reply consumes exactly one slot. If that waiter's caller has gone
    /// away the reply is dropped, never passed on to the next command.
    /// Returns false when the reply was not delivered.
    pub fn resolve(&self, message: &Message) -> bool {
        if !message.is_reply() {
            return false;
        }
        let Some(waiter) = self.lock().pop_front() else {
            tracing::debug!("Discarding reply with no pending waiter: {:?}", message);
            return false;
        };
        if waiter.tx.send(Ok(message.clone())).is_err() {
            tracing::debug!("Discarding reply for cancelled command: {:?}", message);
            return false;
        }
        true
    }

    /// Fail every pending waiter with a not-connected error
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingAck> = self.lock().drain(..).collect();
        let count = drained.len();
        for waiter in drained {
            let _ = waiter.tx.send(Err(AltitudeError::NotConnected(
                "connection lost while waiting for acknowledgement".to_string(),
            )));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_resolve_in_fifo_order() {
        let queue = AckQueue::new();
        let mut first = queue.enqueue();
        let mut second = queue.enqueue();

        assert!(queue.resolve(&Message::Ok));
        assert!(queue.resolve(&Message::Error {
            reason: "invalid command".into()
        }));

        assert_eq!(first.rx.try_recv().unwrap().unwrap(), Message::Ok);
        assert!(matches!(
            second.rx.try_recv().unwrap().unwrap(),
            Message::Error { .. }
        ));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn non_replies_and_extra_replies_are_ignored() {
        let queue = AckQueue::new();
        assert!(!queue.resolve(&Message::Ok));

        let _waiter = queue.enqueue();
        assert!(!queue.resolve(&Message::Volume { db: -10.0 }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn removed_waiter_is_never_matched() {
        let queue = AckQueue::new();
        let stale = queue.enqueue();
        let mut live = queue.enqueue();

        assert!(queue.remove(stale.id));
        assert!(!queue.remove(stale.id));
        queue.resolve(&Message::Ok);
        assert_eq!(live.rx.try_recv().unwrap().unwrap(), Message::Ok);
    }

    #[test]
    fn reply_for_cancelled_command_is_not_passed_on() {
        let queue = AckQueue::new();
        let cancelled = queue.enqueue();
        let mut next = queue.enqueue();
        drop(cancelled);

        assert!(!queue.resolve(&Message::Error {
            reason: "invalid command".into()
        }));
        assert!(next.rx.try_recv().is_err());
        assert_eq!(queue.len(), 1);

        assert!(queue.resolve(&Message::Ok));
        assert_eq!(next.rx.try_recv().unwrap().unwrap(), Message::Ok);
    }

    #[test]
    fn fail_all_errors_every_waiter() {
        let queue = AckQueue::new();
        let mut a = queue.enqueue();
        let mut b = queue.enqueue();

        assert_eq!(queue.fail_all(), 2);
        assert!(a.rx.try_recv().unwrap().unwrap_err().is_disconnect());
        assert!(b.rx.try_recv().unwrap().unwrap_err().is_disconnect());
        assert_eq!(queue.len(), 0);
    }
}
