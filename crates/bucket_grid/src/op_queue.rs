use std::fmt;

use crossbeam_channel::{Receiver, SendError, Sender, TrySendError, bounded};
use space::Aabb;

use crate::fragment::{EntryId, MAX_ENTRY_ID};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum GridOp {
    Insert {
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    },
    Remove {
        entry_id: EntryId,
    },
    Update {
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    },
    DirtyRect {
        rect: Aabb,
    },
}

impl GridOp {
    pub(crate) fn insert(
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<Self, QueueError> {
        check_entry_id(entry_id)?;
        Ok(GridOp::Insert {
            entry_id,
            aabb,
            mark_dirty,
        })
    }

    pub(crate) fn remove(entry_id: EntryId) -> Result<Self, QueueError> {
        check_entry_id(entry_id)?;
        Ok(GridOp::Remove { entry_id })
    }

    pub(crate) fn update(
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<Self, QueueError> {
        check_entry_id(entry_id)?;
        Ok(GridOp::Update {
            entry_id,
            aabb,
            mark_dirty,
        })
    }
}

/// What a producer does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOverflowPolicy {
    /// Wait for the consumer to flush. No mutation is ever lost.
    #[default]
    Block,
    /// Return [`QueueError::Full`]; the rejected mutation is dropped and the
    /// caller must resubmit it or accept a stale index.
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
    Disconnected,
    EntryIdOutOfRange(EntryId),
}

impl fmt::Display for QueueError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => write!(formatter, "bucket grid operation queue is full"),
            QueueError::Disconnected => {
                write!(formatter, "bucket grid manager has been dropped")
            }
            QueueError::EntryIdOutOfRange(entry_id) => write!(
                formatter,
                "entry id {entry_id} exceeds maximum {MAX_ENTRY_ID}"
            ),
        }
    }
}

impl std::error::Error for QueueError {}

/// Producer handle for one grid manager's operation queue.
///
/// Cheap to clone and safe to use from any thread. Operations apply in the
/// order they were queued when the owning manager flushes.
#[derive(Debug, Clone)]
pub struct BucketGridQueue {
    sender: Sender<GridOp>,
    overflow: QueueOverflowPolicy,
}

pub(crate) fn op_channel(
    capacity: usize,
    overflow: QueueOverflowPolicy,
) -> (BucketGridQueue, Receiver<GridOp>) {
    assert!(capacity > 0, "operation queue capacity must be greater than zero");
    let (sender, receiver) = bounded(capacity);
    (BucketGridQueue { sender, overflow }, receiver)
}

impl BucketGridQueue {
    pub fn queue_insert(
        &self,
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<(), QueueError> {
        self.push(GridOp::insert(entry_id, aabb, mark_dirty)?)
    }

    pub fn queue_remove(&self, entry_id: EntryId) -> Result<(), QueueError> {
        self.push(GridOp::remove(entry_id)?)
    }

    pub fn queue_update(
        &self,
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<(), QueueError> {
        self.push(GridOp::update(entry_id, aabb, mark_dirty)?)
    }

    pub fn queue_dirty_rect(&self, rect: Aabb) -> Result<(), QueueError> {
        self.push(GridOp::DirtyRect { rect })
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(usize::MAX)
    }

    pub fn overflow_policy(&self) -> QueueOverflowPolicy {
        self.overflow
    }

    fn push(&self, op: GridOp) -> Result<(), QueueError> {
        match self.overflow {
            QueueOverflowPolicy::Block => self
                .sender
                .send(op)
                .map_err(|SendError(_)| QueueError::Disconnected),
            QueueOverflowPolicy::FailFast => self.try_push(op).map_err(|error| match error {
                TrySendError::Full(op) => {
                    log::warn!("bucket grid queue full, dropping {op:?}");
                    QueueError::Full
                }
                TrySendError::Disconnected(_) => QueueError::Disconnected,
            }),
        }
    }

    pub(crate) fn try_push(&self, op: GridOp) -> Result<(), TrySendError<GridOp>> {
        self.sender.try_send(op)
    }
}

fn check_entry_id(entry_id: EntryId) -> Result<(), QueueError> {
    if entry_id > MAX_ENTRY_ID {
        return Err(QueueError::EntryIdOutOfRange(entry_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_reports_full_queue() {
        let (queue, receiver) = op_channel(2, QueueOverflowPolicy::FailFast);
        let rect = Aabb::new(0.0, 0.0, 1.0, 1.0);

        queue.queue_dirty_rect(rect).expect("first");
        queue.queue_remove(4).expect("second");
        assert_eq!(queue.queue_remove(5), Err(QueueError::Full));
        assert_eq!(queue.pending(), 2);

        assert_eq!(receiver.try_recv(), Ok(GridOp::DirtyRect { rect }));
        assert_eq!(receiver.try_recv(), Ok(GridOp::Remove { entry_id: 4 }));
    }

    #[test]
    fn dropped_consumer_disconnects_producers() {
        let (queue, receiver) = op_channel(2, QueueOverflowPolicy::Block);
        drop(receiver);

        assert_eq!(queue.queue_remove(1), Err(QueueError::Disconnected));
    }

    #[test]
    fn rejects_entry_ids_that_overflow_fragment_ids() {
        let (queue, _receiver) = op_channel(2, QueueOverflowPolicy::Block);

        assert_eq!(
            queue.queue_remove(MAX_ENTRY_ID + 1),
            Err(QueueError::EntryIdOutOfRange(MAX_ENTRY_ID + 1))
        );
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn blocking_producer_waits_for_consumer() {
        let (queue, receiver) = op_channel(1, QueueOverflowPolicy::Block);

        std::thread::scope(|scope| {
            let producer = scope.spawn(|| {
                for entry_id in 0..16 {
                    queue.queue_remove(entry_id).expect("queue remove");
                }
            });
            let mut received = Vec::new();
            while received.len() < 16 {
                if let Ok(GridOp::Remove { entry_id }) = receiver.recv() {
                    received.push(entry_id);
                }
            }
            producer.join().expect("producer thread");
            assert_eq!(received, (0..16).collect::<Vec<_>>());
        });
    }
}
