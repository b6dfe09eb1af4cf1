//! Vote changes (§4.4 "On vote change", §8 S4/S5): membership in
//! `upvoted_posts`/`downvoted_posts` (plus their post-keyed reverse indexes)
//! *is* the vote; there is no stored `NoVote` row.

use ludwig_types::{Karma, PostId, UserId, VoteValue};
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::stats_ops::{post_stats_key, update_user_stats_tx};
use crate::tables::{
    comments, downvoted_posts, post_downvoters, post_stats, post_upvoters, threads,
    upvoted_posts,
};
use crate::{DbError, DbEvent, Database, WritePriority, WriteTransactionCtx};

/// Current vote a user has cast on a post, read from the set tables.
fn current_vote_tx(
    tx: &WriteTransactionCtx,
    voter: UserId,
    key: u64,
) -> DbResult<VoteValue> {
    let up_t = tx.open_table(&upvoted_posts::TABLE)?;
    if up_t.get(&(voter, key))?.is_some() {
        return Ok(VoteValue::Upvote);
    }
    drop(up_t);
    let down_t = tx.open_table(&downvoted_posts::TABLE)?;
    if down_t.get(&(voter, key))?.is_some() {
        return Ok(VoteValue::Downvote);
    }
    Ok(VoteValue::NoVote)
}

fn remove_vote_tx(tx: &WriteTransactionCtx, voter: UserId, key: u64, vote: VoteValue) -> DbResult<()> {
    match vote {
        VoteValue::Upvote => {
            tx.open_table(&upvoted_posts::TABLE)?.remove(&(voter, key))?;
            tx.open_table(&post_upvoters::TABLE)?.remove(&(key, voter))?;
        }
        VoteValue::Downvote => {
            tx.open_table(&downvoted_posts::TABLE)?.remove(&(voter, key))?;
            tx.open_table(&post_downvoters::TABLE)?.remove(&(key, voter))?;
        }
        VoteValue::NoVote => {}
    }
    Ok(())
}

fn insert_vote_tx(tx: &WriteTransactionCtx, voter: UserId, key: u64, vote: VoteValue) -> DbResult<()> {
    match vote {
        VoteValue::Upvote => {
            tx.open_table(&upvoted_posts::TABLE)?.insert(&(voter, key), &())?;
            tx.open_table(&post_upvoters::TABLE)?.insert(&(key, voter), &())?;
        }
        VoteValue::Downvote => {
            tx.open_table(&downvoted_posts::TABLE)?.insert(&(voter, key), &())?;
            tx.open_table(&post_downvoters::TABLE)?.insert(&(key, voter), &())?;
        }
        VoteValue::NoVote => {}
    }
    Ok(())
}

impl Database {
    /// Sets `voter`'s vote on `post` to `value` (§4.4). Setting the vote a
    /// user already has is a no-op; setting `NoVote` retracts an existing
    /// vote. Updates `PostStats.{upvotes,downvotes,karma}`, the author's
    /// `thread_karma`/`comment_karma`, and the post's three/four `top`
    /// indexes in the same transaction.
    pub async fn set_vote(&self, voter: UserId, post: PostId, value: VoteValue) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let key = post_stats_key(post);
            let old_vote = current_vote_tx(tx, voter, key)?;
            if old_vote == value {
                return Ok(());
            }

            let (author, board, parent) = match post {
                PostId::Thread(id) => {
                    let threads_t = tx.open_table(&threads::TABLE)?;
                    let r = threads_t
                        .get(&id)?
                        .map(|g| g.value())
                        .ok_or_else(|| DbError::not_found(format!("thread {id}")))?;
                    (r.author, r.board, None)
                }
                PostId::Comment(id) => {
                    let comments_t = tx.open_table(&comments::TABLE)?;
                    let r = comments_t
                        .get(&id)?
                        .map(|g| g.value())
                        .ok_or_else(|| DbError::not_found(format!("comment {id}")))?;
                    drop(comments_t);
                    let threads_t = tx.open_table(&threads::TABLE)?;
                    let board = threads_t
                        .get(&r.thread)?
                        .map(|g| g.value().board)
                        .ok_or_else(|| DbError::invariant("comment's thread missing"))?;
                    (r.author, board, Some(r.parent))
                }
            };

            remove_vote_tx(tx, voter, key, old_vote)?;
            insert_vote_tx(tx, voter, key, value)?;

            let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
            let mut stats = post_stats_t
                .get(&key)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::invariant("post_stats missing for existing post"))?;
            let old_karma = stats.karma;
            match old_vote {
                VoteValue::Upvote => stats.upvotes = stats.upvotes.saturating_sub(1),
                VoteValue::Downvote => stats.downvotes = stats.downvotes.saturating_sub(1),
                VoteValue::NoVote => {}
            }
            match value {
                VoteValue::Upvote => stats.upvotes += 1,
                VoteValue::Downvote => stats.downvotes += 1,
                VoteValue::NoVote => {}
            }
            stats.karma = Karma(stats.upvotes as i64 - stats.downvotes as i64);
            let new_karma = stats.karma;
            post_stats_t.insert(&key, &stats)?;
            drop(post_stats_t);

            match post {
                PostId::Thread(id) => {
                    crate::thread_ops::reindex_thread_top_tx(tx, id, board, author, old_karma, new_karma)?
                }
                PostId::Comment(id) => crate::comment_ops::reindex_comment_top_tx(
                    tx,
                    id,
                    board,
                    author,
                    parent.expect("comment vote always carries a parent"),
                    old_karma,
                    new_karma,
                )?,
            }

            let karma_diff = new_karma.0 - old_karma.0;
            update_user_stats_tx(tx, author, |s| match post {
                PostId::Thread(_) => s.thread_karma += karma_diff,
                PostId::Comment(_) => s.comment_karma += karma_diff,
            })?;

            tx.emit(DbEvent::PostStatsUpdate(key));
            tx.emit(DbEvent::UserStatsUpdate(author));
            Ok(())
        })
        .await
    }

    pub async fn set_vote_on_thread(
        &self,
        voter: UserId,
        thread: ludwig_types::ThreadId,
        value: VoteValue,
    ) -> DbResult<()> {
        self.set_vote(voter, PostId::Thread(thread), value).await
    }

    pub async fn set_vote_on_comment(
        &self,
        voter: UserId,
        comment: ludwig_types::CommentId,
        value: VoteValue,
    ) -> DbResult<()> {
        self.set_vote(voter, PostId::Comment(comment), value).await
    }

    pub async fn get_vote(&self, voter: UserId, post: PostId) -> DbResult<VoteValue> {
        let key = post_stats_key(post);
        self.read_with(|tx| {
            let up_t = tx.open_table(&upvoted_posts::TABLE)?;
            if up_t.get(&(voter, key))?.is_some() {
                return Ok(VoteValue::Upvote);
            }
            let down_t = tx.open_table(&downvoted_posts::TABLE)?;
            if down_t.get(&(voter, key))?.is_some() {
                return Ok(VoteValue::Downvote);
            }
            Ok(VoteValue::NoVote)
        })
        .await
    }
}

/// Resolves a raw post key back to its [`PostId`] variant during restore.
/// Ids are never reused and threads/comments share one monotonic counter
/// (§3), so a key present in `threads` can never also be a comment.
fn resolve_post_id_tx(tx: &WriteTransactionCtx, key: u64) -> DbResult<PostId> {
    let threads_t = tx.open_table(&threads::TABLE)?;
    if threads_t.get(&ludwig_types::ThreadId::new(key))?.is_some() {
        return Ok(PostId::Thread(ludwig_types::ThreadId::new(key)));
    }
    Ok(PostId::Comment(ludwig_types::CommentId::new(key)))
}

fn post_owner_tx(
    tx: &WriteTransactionCtx,
    post: PostId,
) -> DbResult<(UserId, ludwig_types::BoardId, Option<u64>)> {
    match post {
        PostId::Thread(id) => {
            let threads_t = tx.open_table(&threads::TABLE)?;
            let r = threads_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::invariant("thread missing during restore"))?;
            Ok((r.author, r.board, None))
        }
        PostId::Comment(id) => {
            let comments_t = tx.open_table(&comments::TABLE)?;
            let r = comments_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::invariant("comment missing during restore"))?;
            drop(comments_t);
            let threads_t = tx.open_table(&threads::TABLE)?;
            let board = threads_t
                .get(&r.thread)?
                .map(|g| g.value().board)
                .ok_or_else(|| DbError::invariant("comment's thread missing"))?;
            Ok((r.author, board, Some(r.parent)))
        }
    }
}

/// Replays one vote recorded in a dump's `UpvoteBatch`/`DownvoteBatch` (§6)
/// during `restore`. Assumes the pre-restore vote state is `NoVote`, which
/// holds by construction: `restore_thread_tx`/`restore_comment_tx` always
/// seed a fresh zeroed `post_stats` row before any vote batch is replayed,
/// so there is no old vote to retract.
pub(crate) fn restore_vote_tx(
    tx: &WriteTransactionCtx,
    voter: UserId,
    post_key: u64,
    value: VoteValue,
) -> DbResult<()> {
    let post = resolve_post_id_tx(tx, post_key)?;
    insert_vote_tx(tx, voter, post_key, value)?;

    let (author, board, parent) = post_owner_tx(tx, post)?;

    let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
    let mut stats = post_stats_t
        .get(&post_key)?
        .map(|g| g.value())
        .ok_or_else(|| DbError::invariant("post_stats missing for existing post"))?;
    let old_karma = stats.karma;
    match value {
        VoteValue::Upvote => stats.upvotes += 1,
        VoteValue::Downvote => stats.downvotes += 1,
        VoteValue::NoVote => {}
    }
    stats.karma = Karma(stats.upvotes as i64 - stats.downvotes as i64);
    let new_karma = stats.karma;
    post_stats_t.insert(&post_key, &stats)?;
    drop(post_stats_t);

    match post {
        PostId::Thread(id) => {
            crate::thread_ops::reindex_thread_top_tx(tx, id, board, author, old_karma, new_karma)?
        }
        PostId::Comment(id) => crate::comment_ops::reindex_comment_top_tx(
            tx,
            id,
            board,
            author,
            parent.expect("comment vote always carries a parent"),
            old_karma,
            new_karma,
        )?,
    }

    let karma_diff = new_karma.0 - old_karma.0;
    update_user_stats_tx(tx, author, |s| match post {
        PostId::Thread(_) => s.thread_karma += karma_diff,
        PostId::Comment(_) => s.comment_karma += karma_diff,
    })?;
    Ok(())
}

/// Clears every vote cast on `post`, used by the delete cascade
/// (`thread_ops::delete_thread`, `comment_ops::delete_comment_inner_tx`).
/// Walks the post-keyed reverse indexes rather than scanning every voter.
pub(crate) fn clear_votes_on_post_tx(tx: &WriteTransactionCtx, post: PostId) -> DbResult<()> {
    let key = post_stats_key(post);

    let up_voters: Vec<UserId> = {
        let t = tx.open_table(&post_upvoters::TABLE)?;
        let lo = (key, UserId::new(0));
        let hi = (key, UserId::new(u64::MAX));
        t.range(&lo..=&hi)?
            .map(|entry| entry.map(|(k, _)| k.value().1))
            .collect::<Result<_, _>>()?
    };
    let down_voters: Vec<UserId> = {
        let t = tx.open_table(&post_downvoters::TABLE)?;
        let lo = (key, UserId::new(0));
        let hi = (key, UserId::new(u64::MAX));
        t.range(&lo..=&hi)?
            .map(|entry| entry.map(|(k, _)| k.value().1))
            .collect::<Result<_, _>>()?
    };

    {
        let mut upvoted_t = tx.open_table(&upvoted_posts::TABLE)?;
        for voter in &up_voters {
            upvoted_t.remove(&(*voter, key))?;
        }
    }
    {
        let mut downvoted_t = tx.open_table(&downvoted_posts::TABLE)?;
        for voter in &down_voters {
            downvoted_t.remove(&(*voter, key))?;
        }
    }
    {
        let mut t = tx.open_table(&post_upvoters::TABLE)?;
        for voter in &up_voters {
            t.remove(&(key, *voter))?;
        }
    }
    {
        let mut t = tx.open_table(&post_downvoters::TABLE)?;
        for voter in &down_voters {
            t.remove(&(key, *voter))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    async fn setup() -> (Database, UserId, UserId, ludwig_types::ThreadId) {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        let carol = db
            .create_local_user()
            .name("carol".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        let board = db
            .create_board()
            .name("main".to_string())
            .owner(alice)
            .call()
            .await
            .unwrap();
        let thread = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("Hello".to_string())
            .call()
            .await
            .unwrap();
        (db, alice, carol, thread)
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn downvote_from_another_user_flips_karma_to_zero() {
        let (db, alice, carol, thread) = setup().await;
        // alice's auto-upvote already put karma at 1.
        db.set_vote_on_thread(carol, thread, VoteValue::Downvote)
            .await
            .unwrap();

        let stats = db
            .get_post_stats(PostId::Thread(thread))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.upvotes, 1);
        assert_eq!(stats.downvotes, 1);
        assert_eq!(stats.karma, Karma(0));
        assert!(stats.karma_matches_votes());

        let alice_stats = db.get_user_stats(alice).await.unwrap();
        assert_eq!(alice_stats.thread_karma, 0);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn retracting_a_vote_is_idempotent_with_novote() {
        let (db, alice, carol, thread) = setup().await;
        db.set_vote_on_thread(carol, thread, VoteValue::Upvote)
            .await
            .unwrap();
        db.set_vote_on_thread(carol, thread, VoteValue::NoVote)
            .await
            .unwrap();
        db.set_vote_on_thread(carol, thread, VoteValue::NoVote)
            .await
            .unwrap();

        let stats = db
            .get_post_stats(PostId::Thread(thread))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.upvotes, 1);
        assert_eq!(stats.downvotes, 0);
        assert_eq!(stats.karma, Karma(1));
        assert_eq!(db.get_vote(carol, PostId::Thread(thread)).await.unwrap(), VoteValue::NoVote);
        let _ = alice;
    }
}
