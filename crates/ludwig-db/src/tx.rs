//! Transaction façade (§4.7): `ReadTxn`/`WriteTxn` types, write
//! serialization via a priority queue, and dump/restore.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

pub use redb_bincode::ReadTransaction as ReadTxn;

pub use crate::WriteTransactionCtx as WriteTxn;

/// Two priority levels for queued writes: user-initiated requests jump ahead
/// of background/maintenance writes (e.g. the session-cleanup sweep) queued
/// at the same time. Equal-priority writes are served FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WritePriority {
    Background,
    UserInitiated,
}

struct Waiter {
    priority: WritePriority,
    seq: u64,
    notify: Arc<Notify>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    /// Higher priority wins; within equal priority, lower `seq` (older
    /// request) wins. `BinaryHeap` is a max-heap, so "wins" means "compares
    /// greater" here, hence the reversed `seq` comparison.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct WriteQueueState {
    locked: bool,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
}

/// Serializes access to the single write slot (§4.7, §5). `redb` itself
/// already refuses a second concurrent write transaction, but it has no
/// notion of priority -- this queue adds the two-level priority/FIFO
/// ordering the spec requires on top of that single-writer guarantee.
#[derive(Default)]
pub struct WriteQueue {
    state: Mutex<WriteQueueState>,
}

/// RAII guard for the write slot. Dropping it (whether by falling out of
/// scope normally or via an early return/panic unwind) hands the slot to the
/// next queued waiter, so a write that aborts still releases the slot.
pub struct WriteSlot<'q> {
    queue: &'q WriteQueue,
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        self.queue.release();
    }
}

impl WriteQueue {
    pub async fn acquire(&self, priority: WritePriority) -> WriteSlot<'_> {
        let notify = {
            let mut state = self.state.lock().expect("write queue lock poisoned");
            if !state.locked {
                state.locked = true;
                None
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;
                let notify = Arc::new(Notify::new());
                state.waiters.push(Waiter {
                    priority,
                    seq,
                    notify: notify.clone(),
                });
                Some(notify)
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
        }

        WriteSlot { queue: self }
    }

    fn release(&self) {
        let mut state = self.state.lock().expect("write queue lock poisoned");
        match state.waiters.pop() {
            Some(waiter) => waiter.notify.notify_one(), // hand off, `locked` stays true
            None => state.locked = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn user_initiated_jumps_ahead_of_background() {
        let queue = Arc::new(WriteQueue::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold the slot so both subsequent acquires queue up behind it.
        let holder = queue.acquire(WritePriority::UserInitiated).await;

        let bg_queue = queue.clone();
        let bg_order = order.clone();
        let bg = tokio::spawn(async move {
            let _slot = bg_queue.acquire(WritePriority::Background).await;
            bg_order.lock().unwrap().push("background");
        });

        // Give the background task a chance to enqueue before the
        // user-initiated one does, so ordering is actually exercised.
        tokio::task::yield_now().await;

        let user_queue = queue.clone();
        let user_order = order.clone();
        let user = tokio::spawn(async move {
            let _slot = user_queue.acquire(WritePriority::UserInitiated).await;
            user_order.lock().unwrap().push("user");
        });

        tokio::task::yield_now().await;
        drop(holder);

        bg.await.unwrap();
        user.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["user", "background"]);
    }
}
