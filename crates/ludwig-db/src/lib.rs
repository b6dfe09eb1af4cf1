//! Ludwig storage and ranking engine: the keyed indexes, write-time
//! invariant maintenance, paginated cursor iterators, and Hot/Active/
//! New-Comments ranking that back a federated forum server.
//!
//! This crate is a library; it exposes no HTTP routes, no ActivityPub
//! federation client, and no rich-text parser. Callers hand it
//! already-validated, already-parsed payloads and consume typed results.

pub mod auth;
mod application_ops;
mod board_ops;
pub mod error;
pub mod events;
mod comment_ops;
mod dump;
mod feed;
mod invite_ops;
mod linkcard_ops;
mod notification_ops;
pub mod paginate;
mod session_ops;
mod site_ops;
mod stats_ops;
pub mod tables;
mod thread_ops;
pub mod tx;
mod user_ops;
mod vote_ops;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::ops;
use std::path::{Path, PathBuf};

use ludwig_types::Timestamp;
use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::ResultExt as _;
use tracing::{debug, instrument};

pub use dump::{DumpRecord, DumpType};
pub use error::{DbError, DbResult};
pub use events::DbEvent;
pub use feed::{FeedScope, RankedPage};
pub use paginate::{PageCursor, DEFAULT_PAGE_SIZE};
pub use tables::*;
pub use tx::WritePriority;

use events::{EventBus, SiteDetailCache};
use tx::WriteQueue;

const LOG_TARGET: &str = "ludwig::db";

/// A write transaction plus the bookkeeping the storage core layers on top
/// of a bare `redb` write transaction: a buffer of events to publish after
/// commit (§4.8 -- "events are emitted after commit, never during").
pub struct WriteTransactionCtx {
    dbtx: WriteTransaction,
    pending_events: RefCell<Vec<DbEvent>>,
}

impl From<WriteTransaction> for WriteTransactionCtx {
    fn from(dbtx: WriteTransaction) -> Self {
        Self {
            dbtx,
            pending_events: RefCell::new(Vec::new()),
        }
    }
}

impl ops::Deref for WriteTransactionCtx {
    type Target = WriteTransaction;
    fn deref(&self) -> &Self::Target {
        &self.dbtx
    }
}

impl ops::DerefMut for WriteTransactionCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dbtx
    }
}

impl WriteTransactionCtx {
    /// Queue an event for publication once this transaction commits. A
    /// transaction that returns an error before `commit` never publishes
    /// anything it queued here.
    pub fn emit(&self, event: DbEvent) {
        self.pending_events.borrow_mut().push(event);
    }

    fn commit(self) -> DbResult<Vec<DbEvent>> {
        let Self {
            dbtx,
            pending_events,
        } = self;
        dbtx.commit().context(error::CommitSnafu)?;
        Ok(pending_events.into_inner())
    }
}

/// The storage and ranking engine's handle: a single embedded database file,
/// the write-serialization queue, the post-commit event bus, and the cached
/// [`SiteDetail`] snapshot (§5).
pub struct Database {
    inner: redb_bincode::Database,
    write_queue: WriteQueue,
    events: EventBus,
    site_detail: SiteDetailCache,
    /// Counts session-creation write transactions so that every Nth one
    /// (§5, `SESSION_CLEANUP_SAMPLING_RATE`) also sweeps expired sessions.
    session_counter: std::sync::atomic::AtomicU64,
}

impl Database {
    pub async fn new_in_memory() -> DbResult<Self> {
        debug!(target: LOG_TARGET, "opening in-memory database");
        let inner = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(error::DatabaseSnafu)?;
        Self::open_inner(inner).await
    }

    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "opening database");
        let inner = tokio::task::spawn_blocking(move || redb::Database::create(path))
            .await
            .context(error::JoinSnafu)?
            .context(error::DatabaseSnafu)?;
        Self::open_inner(inner).await
    }

    #[instrument(skip_all)]
    async fn open_inner(inner: redb::Database) -> DbResult<Self> {
        let inner = redb_bincode::Database::from(inner);

        let db = Self {
            inner,
            write_queue: WriteQueue::default(),
            events: EventBus::default(),
            site_detail: SiteDetailCache::default(),
            session_counter: std::sync::atomic::AtomicU64::new(0),
        };

        db.write_with(WritePriority::Background, |tx| {
            Self::init_tables_tx(tx)?;
            Ok(())
        })
        .await?;

        if let Some(detail) = db
            .read_with(|tx| Self::read_site_detail_tx(tx))
            .await?
        {
            db.site_detail.swap(detail);
        }

        Ok(db)
    }

    /// Force every table definition to exist (`redb` creates a table lazily
    /// on its first `open_table` in a write transaction).
    fn init_tables_tx(tx: &WriteTransactionCtx) -> DbResult<()> {
        macro_rules! touch {
            ($($m:ident),* $(,)?) => {
                $( tx.open_table(&tables::$m::TABLE)?; )*
            };
        }
        touch!(
            db_version,
            settings,
            site_stats,
            users,
            local_users,
            boards,
            local_boards,
            threads,
            comments,
            sessions,
            notifications,
            invites,
            applications,
            link_cards,
            users_by_name,
            local_users_by_email,
            boards_by_name,
            user_stats,
            board_stats,
            post_stats,
            threads_new,
            threads_top,
            threads_most_comments,
            threads_of_board_new,
            threads_of_board_top,
            threads_of_board_most_comments,
            threads_of_user_new,
            threads_of_user_top,
            threads_by_domain,
            comments_new,
            comments_top,
            comments_most_comments,
            comments_of_board_new,
            comments_of_board_top,
            comments_of_board_most_comments,
            comments_of_user_new,
            comments_of_user_top,
            children_top,
            children_new,
            users_new,
            users_new_posts,
            users_most_posts,
            subscribed_boards,
            board_subscribers,
            owned_boards,
            upvoted_posts,
            downvoted_posts,
            post_upvoters,
            post_downvoters,
            saved_posts,
            hidden_posts,
            hidden_users,
            hidden_boards,
            boards_new,
            boards_new_posts,
            boards_most_posts,
            boards_most_subscribers,
        );
        Ok(())
    }

    /// Run `f` inside a write transaction, serialized behind the write queue
    /// at the given priority (§4.7, §5). Events queued via
    /// [`WriteTransactionCtx::emit`] are published only if `f` returns `Ok`
    /// and the commit succeeds; an error propagates without publishing
    /// anything and without committing.
    pub async fn write_with<T>(
        &self,
        priority: WritePriority,
        f: impl FnOnce(&WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        let _slot = self.write_queue.acquire(priority).await;
        tokio::task::block_in_place(|| {
            let dbtx = WriteTransactionCtx::from(
                self.inner.begin_write().context(error::TransactionSnafu)?,
            );
            let result = f(&dbtx)?;
            let events = dbtx.commit()?;
            for event in events {
                self.events.emit(event);
            }
            Ok(result)
        })
    }

    /// Open a snapshot-isolated read transaction and run `f` against it.
    /// Readers never block the writer and never block each other (§5).
    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = self.inner.begin_read().context(error::TransactionSnafu)?;
            f(&dbtx)
        })
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<DbEvent> {
        self.events.subscribe()
    }

    /// The cached [`SiteDetail`] snapshot (§5, §9): loaded without ever
    /// touching the write slot. `None` only before the very first
    /// `create_site`.
    pub fn site_detail(&self) -> Option<std::sync::Arc<tables::SiteDetail>> {
        self.site_detail.load()
    }

    fn refresh_site_detail_cache(&self, detail: tables::SiteDetail) {
        self.site_detail.swap(detail);
    }

    /// Opportunistic maintenance hook: every
    /// [`ludwig_types::SESSION_CLEANUP_SAMPLING_RATE`]th call returns `true`,
    /// signalling that the in-flight write transaction should also sweep
    /// expired sessions (§5).
    fn should_sweep_sessions(&self) -> bool {
        let n = self
            .session_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        n % ludwig_types::SESSION_CLEANUP_SAMPLING_RATE == 0
    }
}

/// Wall-clock `now`, as a single call site so tests can reason about it; not
/// itself mockable (no virtual clock in scope for the core).
pub(crate) fn now() -> Timestamp {
    Timestamp::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn opens_in_memory_and_creates_all_tables() {
        let db = Database::new_in_memory().await.unwrap();
        db.read_with(|tx| {
            tx.open_table(&tables::users::TABLE)?;
            tx.open_table(&tables::threads_of_board_top::TABLE)?;
            Ok(())
        })
        .await
        .unwrap();
    }
}
