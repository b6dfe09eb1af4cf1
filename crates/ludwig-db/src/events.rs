//! Event bus (§4.8, core-adjacent): a pub/sub facility that receives events
//! only after commit, never during, so that caches and out-of-band workers
//! can react without ever observing a partially-applied write.

use arc_swap::ArcSwapOption;
use ludwig_types::{BoardId, NotificationId, ThreadId, UserId};
use tokio::sync::broadcast;

use crate::tables::SiteDetail;

#[derive(Debug, Clone)]
pub enum DbEvent {
    UserStatsUpdate(UserId),
    BoardStatsUpdate(BoardId),
    PostStatsUpdate(u64),
    SiteUpdate,
    Notification(NotificationId),
    ThreadFetchLinkCard(ThreadId),
}

const EVENT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel of [`DbEvent`]s, fed exclusively from
/// `WriteTransactionCtx::on_commit` hooks (see `crate::WriteTransactionCtx`).
/// Subscribers run on a task executor distinct from the write transaction
/// thread, matching §4.8's "subscribers run on a task executor distinct from
/// the transaction thread".
pub struct EventBus {
    tx: broadcast::Sender<DbEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<DbEvent> {
        self.tx.subscribe()
    }

    /// Only ever called from an `on_commit` hook -- never mid-transaction.
    pub fn emit(&self, event: DbEvent) {
        // No receivers is a normal, non-error condition.
        let _ = self.tx.send(event);
    }
}

/// The cached [`SiteDetail`] snapshot: the sole piece of process-wide mutable
/// state outside the write slot (§5, §9). Readers load the current `Arc`
/// without ever blocking on the writer; a `SiteUpdate` event swaps in a
/// freshly-assembled snapshot.
#[derive(Default)]
pub struct SiteDetailCache {
    inner: ArcSwapOption<SiteDetail>,
}

impl SiteDetailCache {
    pub fn load(&self) -> Option<std::sync::Arc<SiteDetail>> {
        self.inner.load_full()
    }

    pub fn swap(&self, detail: SiteDetail) {
        self.inner.store(Some(std::sync::Arc::new(detail)));
    }
}
