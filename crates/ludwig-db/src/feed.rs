//! Ranked feed streamer (§4.5): Hot/Active/NewComments pages streamed by
//! merging a creation-time iterator with a karma iterator behind a bounded
//! max-priority-queue, plus plain New/Top/MostComments list views over the
//! same scopes.
//!
//! This only ranks threads, not comments -- replies are ordered within a
//! single parent via `children_top`/`children_new` (see `comment_ops`), not
//! across the whole instance, so there is no standalone "hot comments feed".

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ludwig_types::{
    BoardId, Karma, PostId, ThreadId, Timestamp, UserId, ACTIVE_COMMENT_MAX_AGE_SECS, RANK_GRAVITY,
};
use redb_bincode::{ReadTransaction, ReadableTable as _};

use crate::error::DbResult;
use crate::paginate::{
    paginate_table_partition_rev, paginate_table_rev, PageCursor,
};
use crate::stats_ops::get_post_stats_tx;
use crate::tables::{
    post_stats, threads_most_comments, threads_new, threads_of_board_most_comments,
    threads_of_board_new, threads_of_board_top, threads_of_user_new, threads_of_user_top,
    threads_top, PostStatsRecord,
};
use crate::{DbError, Database};

/// Which slice of the store a feed or list operation reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    /// Every thread on the instance.
    Global,
    /// Threads posted to one board.
    Board(BoardId),
    /// Threads authored by one user.
    User(UserId),
}

/// The three ranking modes (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSort {
    Hot,
    Active,
    NewComments,
}

/// A plain (non-ranked) index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleSort {
    New,
    Top,
    MostComments,
}

/// A page of ranked results plus the cursor to resume from.
#[derive(Debug, Clone, Default)]
pub struct RankedPage {
    pub items: Vec<ThreadId>,
    pub next_cursor: Option<PageCursor>,
}

fn hot_numerator(karma: Karma) -> f64 {
    let raw = 3i64.saturating_add(karma.0);
    (raw.max(1) as f64).ln()
}

fn hot_denominator(age_hours: u64) -> f64 {
    (age_hours as f64 + 2.0).powf(RANK_GRAVITY)
}

fn hot_rank(karma: Karma, age_hours: u64) -> f64 {
    hot_numerator(karma) / hot_denominator(age_hours)
}

/// The value a given post ranks by under `sort`, as of `now`.
fn rank_value(sort: FeedSort, stats: &PostStatsRecord, created_at: Timestamp, now: Timestamp) -> f64 {
    match sort {
        FeedSort::Hot => hot_rank(stats.karma, created_at.age_hours_at(now)),
        FeedSort::Active => hot_rank(stats.karma, stats.latest_comment.age_hours_at(now)),
        FeedSort::NewComments => stats.latest_comment.as_secs() as f64,
    }
}

/// Upper bound on the rank of any not-yet-visited id, given that `iter_new`
/// has just produced an id created at `created_at_i` (§4.5 step 4). Every
/// remaining id has `created_at <= created_at_i`, so its age (for Hot) or its
/// clamped latest-comment window (for Active/NewComments) can only be as
/// favorable as this bound.
fn rank_bound(sort: FeedSort, created_at_i: Timestamp, karma_max: Karma, now: Timestamp) -> f64 {
    match sort {
        FeedSort::Hot => hot_numerator(karma_max) / hot_denominator(created_at_i.age_hours_at(now)),
        FeedSort::Active => {
            let t_max = std::cmp::min(now, created_at_i.saturating_add_secs(ACTIVE_COMMENT_MAX_AGE_SECS));
            hot_numerator(karma_max) / hot_denominator(t_max.age_hours_at(now))
        }
        FeedSort::NewComments => {
            std::cmp::min(now, created_at_i.saturating_add_secs(ACTIVE_COMMENT_MAX_AGE_SECS)).as_secs() as f64
        }
    }
}

/// A candidate held in the bounded max-heap, ordered by `(rank_bits, id)` so
/// ties break by id descending (§4.5's pagination-stability property).
/// `rank_bits` is `f64::to_bits()`, which preserves numeric order for the
/// non-negative, finite ranks this module ever produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapItem {
    rank_bits: u64,
    id: ThreadId,
}

/// Visits every `(created_at, ThreadId)` pair in `scope`'s creation-time
/// index, newest first, until `visit` returns `false` or the index is
/// exhausted.
fn scan_new_desc(
    tx: &ReadTransaction,
    scope: FeedScope,
    mut visit: impl FnMut(Timestamp, ThreadId) -> DbResult<bool>,
) -> DbResult<()> {
    match scope {
        FeedScope::Global => {
            let t = tx.open_table(&threads_new::TABLE)?;
            for entry in t.range(..)?.rev() {
                let (k, _) = entry?;
                let (secs, id) = k.value();
                if !visit(Timestamp::from_secs(secs), id)? {
                    break;
                }
            }
        }
        FeedScope::Board(board) => {
            let t = tx.open_table(&threads_of_board_new::TABLE)?;
            let lo = (board, 0u64, ThreadId::new(0));
            let hi = (board, u64::MAX, ThreadId::new(u64::MAX));
            for entry in t.range(&lo..=&hi)?.rev() {
                let (k, _) = entry?;
                let (_, secs, id) = k.value();
                if !visit(Timestamp::from_secs(secs), id)? {
                    break;
                }
            }
        }
        FeedScope::User(user) => {
            let t = tx.open_table(&threads_of_user_new::TABLE)?;
            let lo = (user, 0u64, ThreadId::new(0));
            let hi = (user, u64::MAX, ThreadId::new(u64::MAX));
            for entry in t.range(&lo..=&hi)?.rev() {
                let (k, _) = entry?;
                let (_, secs, id) = k.value();
                if !visit(Timestamp::from_secs(secs), id)? {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// The highest karma present in `scope`, i.e. the head of `iter_top`. `None`
/// if the scope has no threads at all.
fn max_karma_in_scope(tx: &ReadTransaction, scope: FeedScope) -> DbResult<Option<Karma>> {
    Ok(match scope {
        FeedScope::Global => {
            let t = tx.open_table(&threads_top::TABLE)?;
            t.range(..)?
                .rev()
                .next()
                .transpose()?
                .map(|(k, _)| Karma::from_sort_key(k.value().0))
        }
        FeedScope::Board(board) => {
            let t = tx.open_table(&threads_of_board_top::TABLE)?;
            let lo = (board, 0u64, ThreadId::new(0));
            let hi = (board, u64::MAX, ThreadId::new(u64::MAX));
            t.range(&lo..=&hi)?
                .rev()
                .next()
                .transpose()?
                .map(|(k, _)| Karma::from_sort_key(k.value().1))
        }
        FeedScope::User(user) => {
            let t = tx.open_table(&threads_of_user_top::TABLE)?;
            let lo = (user, 0u64, ThreadId::new(0));
            let hi = (user, u64::MAX, ThreadId::new(u64::MAX));
            t.range(&lo..=&hi)?
                .rev()
                .next()
                .transpose()?
                .map(|(k, _)| Karma::from_sort_key(k.value().1))
        }
    })
}

/// Streams one page of a Hot/Active/NewComments feed (§4.5).
pub(crate) fn rank_page(
    tx: &ReadTransaction,
    scope: FeedScope,
    sort: FeedSort,
    cursor: Option<PageCursor>,
    limit: usize,
) -> DbResult<RankedPage> {
    let now = crate::now();
    let from = cursor.map(|c| (c.k, c.v));

    let karma_max = if sort == FeedSort::NewComments {
        Karma::ZERO
    } else {
        match max_karma_in_scope(tx, scope)? {
            Some(k) => k,
            None => return Ok(RankedPage::default()),
        }
    };

    let post_stats_t = tx.open_table(&post_stats::TABLE)?;
    let mut heap: BinaryHeap<HeapItem> = BinaryHeap::new();
    let mut items = vec![];
    let mut last_popped: Option<(u64, u64)> = None;

    scan_new_desc(tx, scope, |created_at, id| {
        let Some(stats) = get_post_stats_tx(&post_stats_t, PostId::Thread(id))? else {
            return Ok(true);
        };
        let rank_bits = rank_value(sort, &stats, created_at, now).to_bits();

        if let Some((fk, fv)) = from {
            if (rank_bits, id.get()) >= (fk, fv) {
                return Ok(true);
            }
        }
        heap.push(HeapItem { rank_bits, id });

        let bound = rank_bound(sort, created_at, karma_max, now).to_bits();
        while items.len() < limit {
            let Some(top) = heap.peek() else { break };
            if bound > top.rank_bits {
                break;
            }
            let top = heap.pop().expect("just peeked");
            last_popped = Some((top.rank_bits, top.id.get()));
            items.push(top.id);
        }
        Ok(items.len() < limit)
    })?;

    while items.len() < limit {
        let Some(top) = heap.pop() else { break };
        last_popped = Some((top.rank_bits, top.id.get()));
        items.push(top.id);
    }

    let next_cursor = if items.len() == limit {
        last_popped.map(|(k, v)| PageCursor::new(k, v))
    } else {
        None
    };

    Ok(RankedPage { items, next_cursor })
}

/// Plain (non-ranked) index scan over New/Top/MostComments, newest or
/// highest first. There is no user-scoped `MostComments` index (§4.3 defines
/// nine thread indexes, not twelve); that combination fails with `Invariant`.
pub(crate) fn list_page(
    tx: &ReadTransaction,
    scope: FeedScope,
    sort: SimpleSort,
    cursor: Option<PageCursor>,
    limit: usize,
) -> DbResult<(Vec<ThreadId>, Option<PageCursor>)> {
    let to_cursor = |k: (u64, ThreadId)| Some(PageCursor::new(k.0, k.1.get()));

    match (scope, sort) {
        (FeedScope::Global, SimpleSort::New) => {
            let t = tx.open_table(&threads_new::TABLE)?;
            let cur = cursor.map(|c| (c.k, ThreadId::new(c.v)));
            let (ids, next) = paginate_table_rev(&t, cur, limit, |k, _| Ok(Some(k.1)))?;
            Ok((ids, next.and_then(to_cursor)))
        }
        (FeedScope::Global, SimpleSort::Top) => {
            let t = tx.open_table(&threads_top::TABLE)?;
            let cur = cursor.map(|c| (c.k, ThreadId::new(c.v)));
            let (ids, next) = paginate_table_rev(&t, cur, limit, |k, _| Ok(Some(k.1)))?;
            Ok((ids, next.and_then(to_cursor)))
        }
        (FeedScope::Global, SimpleSort::MostComments) => {
            let t = tx.open_table(&threads_most_comments::TABLE)?;
            let cur = cursor.map(|c| (c.k, ThreadId::new(c.v)));
            let (ids, next) = paginate_table_rev(&t, cur, limit, |k, _| Ok(Some(k.1)))?;
            Ok((ids, next.and_then(to_cursor)))
        }
        (FeedScope::Board(board), SimpleSort::New) => {
            let t = tx.open_table(&threads_of_board_new::TABLE)?;
            let (ids, next) = paginate_table_partition_rev(
                &t,
                (board, 0u64, ThreadId::new(0)),
                (board, u64::MAX, ThreadId::new(u64::MAX)),
                move |(k, id)| (board, k, id),
                cursor.map(|c| (c.k, ThreadId::new(c.v))),
                limit,
                |k, _| Ok(Some(k.2)),
            )?;
            Ok((ids, next.and_then(|k| to_cursor((k.1, k.2)))))
        }
        (FeedScope::Board(board), SimpleSort::Top) => {
            let t = tx.open_table(&threads_of_board_top::TABLE)?;
            let (ids, next) = paginate_table_partition_rev(
                &t,
                (board, 0u64, ThreadId::new(0)),
                (board, u64::MAX, ThreadId::new(u64::MAX)),
                move |(k, id)| (board, k, id),
                cursor.map(|c| (c.k, ThreadId::new(c.v))),
                limit,
                |k, _| Ok(Some(k.2)),
            )?;
            Ok((ids, next.and_then(|k| to_cursor((k.1, k.2)))))
        }
        (FeedScope::Board(board), SimpleSort::MostComments) => {
            let t = tx.open_table(&threads_of_board_most_comments::TABLE)?;
            let (ids, next) = paginate_table_partition_rev(
                &t,
                (board, 0u64, ThreadId::new(0)),
                (board, u64::MAX, ThreadId::new(u64::MAX)),
                move |(k, id)| (board, k, id),
                cursor.map(|c| (c.k, ThreadId::new(c.v))),
                limit,
                |k, _| Ok(Some(k.2)),
            )?;
            Ok((ids, next.and_then(|k| to_cursor((k.1, k.2)))))
        }
        (FeedScope::User(user), SimpleSort::New) => {
            let t = tx.open_table(&threads_of_user_new::TABLE)?;
            let (ids, next) = paginate_table_partition_rev(
                &t,
                (user, 0u64, ThreadId::new(0)),
                (user, u64::MAX, ThreadId::new(u64::MAX)),
                move |(k, id)| (user, k, id),
                cursor.map(|c| (c.k, ThreadId::new(c.v))),
                limit,
                |k, _| Ok(Some(k.2)),
            )?;
            Ok((ids, next.and_then(|k| to_cursor((k.1, k.2)))))
        }
        (FeedScope::User(user), SimpleSort::Top) => {
            let t = tx.open_table(&threads_of_user_top::TABLE)?;
            let (ids, next) = paginate_table_partition_rev(
                &t,
                (user, 0u64, ThreadId::new(0)),
                (user, u64::MAX, ThreadId::new(u64::MAX)),
                move |(k, id)| (user, k, id),
                cursor.map(|c| (c.k, ThreadId::new(c.v))),
                limit,
                |k, _| Ok(Some(k.2)),
            )?;
            Ok((ids, next.and_then(|k| to_cursor((k.1, k.2)))))
        }
        (FeedScope::User(_), SimpleSort::MostComments) => {
            Err(DbError::invariant("no user-scoped most_comments index"))
        }
    }
}

impl Database {
    pub async fn rank_feed(
        &self,
        scope: FeedScope,
        sort: FeedSort,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> DbResult<RankedPage> {
        self.read_with(move |tx| rank_page(tx, scope, sort, cursor, limit))
            .await
    }

    pub async fn list_feed(
        &self,
        scope: FeedScope,
        sort: SimpleSort,
        cursor: Option<PageCursor>,
        limit: usize,
    ) -> DbResult<(Vec<ThreadId>, Option<PageCursor>)> {
        self.read_with(move |tx| list_page(tx, scope, sort, cursor, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;
    use ludwig_types::VoteValue;

    async fn setup() -> (Database, UserId, BoardId) {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let user = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        let board = db
            .create_board()
            .name("main".to_string())
            .owner(user)
            .call()
            .await
            .unwrap();
        (db, user, board)
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn hot_feed_ranks_higher_karma_first_at_equal_age() {
        let (db, alice, board) = setup().await;
        let bob = db
            .create_local_user()
            .name("bob".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();

        let low = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("low karma".to_string())
            .call()
            .await
            .unwrap();
        let high = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("high karma".to_string())
            .call()
            .await
            .unwrap();
        db.set_vote_on_thread(bob, high, VoteValue::Upvote).await.unwrap();

        let page = db
            .rank_feed(FeedScope::Board(board), FeedSort::Hot, None, 10)
            .await
            .unwrap();
        assert_eq!(page.items, vec![high, low]);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn empty_scope_returns_empty_page() {
        let (db, _, board) = setup().await;
        let page = db
            .rank_feed(FeedScope::Board(board), FeedSort::Hot, None, 10)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn list_new_returns_newest_first() {
        let (db, alice, board) = setup().await;
        let first = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("first".to_string())
            .call()
            .await
            .unwrap();
        let second = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("second".to_string())
            .call()
            .await
            .unwrap();

        let (ids, _) = db
            .list_feed(FeedScope::Board(board), SimpleSort::New, None, 10)
            .await
            .unwrap();
        assert_eq!(ids, vec![second, first]);
    }

    /// §8 S4, exact value: a thread at karma 1 (author's auto-upvote), one
    /// hour old, hot-ranks at `log(4) / 3^1.8`.
    #[test]
    fn hot_rank_matches_s4_literal_value() {
        let rank = hot_rank(Karma(1), 1);
        let expected = 4f64.ln() / 3f64.powf(1.8);
        assert!(
            (rank - expected).abs() < 1e-12,
            "rank {rank} != expected {expected}"
        );
    }

    #[test]
    fn hot_numerator_clamps_negative_karma_to_floor_of_one() {
        // karma so negative that 3+karma goes negative: numerator still
        // floors at ln(1) = 0, never takes ln() of a non-positive number.
        assert_eq!(hot_numerator(Karma(-100)), 0.0);
    }
}
