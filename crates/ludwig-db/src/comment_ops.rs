//! Comment create/set/delete (§4.2, §4.3, §4.4): ancestor-chain stats
//! rollup lives in `stats_ops`; this module owns the comment's own record
//! and its indexes.

use ludwig_types::{validate_post_content, CommentId, Karma, ModState, PostId, ThreadId, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::site_ops::{allocate_id_tx, get_setting};
use crate::stats_ops::{
    post_stats_key, reindex_board_post_indexes_tx, reindex_top_tx,
    reindex_user_post_indexes_tx, rollup_comment_create_tx, rollup_comment_delete_tx,
    update_board_stats_tx, update_user_stats_tx,
};
use crate::tables::{
    children_new, children_top, comments, comments_new, comments_of_board_new,
    comments_of_board_top, comments_of_user_new, comments_of_user_top, comments_top, post_stats,
    settings, site::setting_keys, threads, CommentRecord, PostStatsRecord,
};
use crate::{now, DbError, DbEvent, Database, WritePriority, WriteTransactionCtx};

const DEFAULT_POST_MAX_LENGTH: usize = 100_000;

#[bon::bon]
impl Database {
    /// Creates a comment (§8 S3). The author automatically upvotes their
    /// own comment, matching thread creation's auto-upvote.
    #[builder]
    pub async fn create_comment(
        &self,
        author: UserId,
        thread: ThreadId,
        /// Immediate parent: either `thread`'s own id (top-level reply) or
        /// another comment's id.
        parent: u64,
        content: String,
        #[builder(default)] content_warning: Option<String>,
    ) -> DbResult<CommentId> {
        let id = self
            .write_with(WritePriority::UserInitiated, |tx| {
                let settings_t = tx.open_table(&settings::TABLE)?;
                let max_len = get_setting::<u64>(&settings_t, setting_keys::POST_MAX_LENGTH)?
                    .unwrap_or(DEFAULT_POST_MAX_LENGTH as u64) as usize;
                drop(settings_t);
                validate_post_content(&content, max_len, false)?;

                let thread_record = {
                    let threads_t = tx.open_table(&threads::TABLE)?;
                    threads_t
                        .get(&thread)?
                        .map(|g| g.value())
                        .ok_or_else(|| DbError::not_found(format!("thread {thread}")))?
                };

                let created_at = now();
                let mut salt_bytes = [0u8; 4];
                rand::rng().fill_bytes(&mut salt_bytes);

                let mut settings_t = tx.open_table(&settings::TABLE)?;
                let id = CommentId::new(allocate_id_tx(&mut settings_t)?);
                drop(settings_t);

                let record = CommentRecord {
                    author,
                    thread,
                    parent,
                    created_at,
                    updated_at: None,
                    content,
                    content_warning,
                    federation: None,
                    mod_state: None,
                    mod_reason: None,
                    salt: u32::from_le_bytes(salt_bytes),
                };

                let mut comments_t = tx.open_table(&comments::TABLE)?;
                comments_t.insert(&id, &record)?;
                drop(comments_t);

                let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
                post_stats_t.insert(&id.get(), &PostStatsRecord::new(created_at))?;
                drop(post_stats_t);

                index_new_comment_tx(tx, id, &record, thread_record.board)?;

                rollup_comment_create_tx(tx, thread, parent, created_at)?;

                let (before, after) = update_user_stats_tx(tx, author, |s| {
                    s.comment_count += 1;
                    s.latest_post_time = created_at;
                    s.latest_post_id = id.get();
                })?;
                reindex_user_post_indexes_tx(tx, author, before, after)?;

                let (before, after) = update_board_stats_tx(tx, thread_record.board, |s| {
                    s.comment_count += 1;
                    s.latest_post_time = created_at;
                    s.latest_post_id = id.get();
                })?;
                reindex_board_post_indexes_tx(tx, thread_record.board, before, after)?;

                Database::update_site_stats_tx(tx, |s| s.comment_count += 1)?;

                tx.emit(DbEvent::UserStatsUpdate(author));
                tx.emit(DbEvent::BoardStatsUpdate(thread_record.board));
                tx.emit(DbEvent::PostStatsUpdate(id.get()));
                tx.emit(DbEvent::PostStatsUpdate(parent));

                Ok(id)
            })
            .await?;

        self.set_vote_on_comment(author, id, ludwig_types::VoteValue::Upvote)
            .await?;
        Ok(id)
    }

    pub async fn set_comment(&self, id: CommentId, content: String) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut comments_t = tx.open_table(&comments::TABLE)?;
            let mut record = comments_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("comment {id}")))?;
            record.content = content;
            record.updated_at = Some(now());
            comments_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    pub async fn get_comment(&self, id: CommentId) -> DbResult<Option<CommentRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&comments::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// Deletes a comment and its own descendant comments (§3 lifecycle:
    /// deleting a thread cascades through comments; the same holds for
    /// deleting a single comment subtree).
    pub async fn delete_comment(&self, id: CommentId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let exists = {
                let t = tx.open_table(&comments::TABLE)?;
                t.get(&id)?.is_some()
            };
            if !exists {
                return Ok(());
            }
            let descendants = collect_comment_descendant_ids_impl(tx, id.get())?;
            for d in descendants {
                delete_comment_inner_tx(tx, d)?;
            }
            delete_comment_inner_tx(tx, id)?;
            Ok(())
        })
        .await
    }

    pub async fn set_comment_mod_state(
        &self,
        id: CommentId,
        mod_state: Option<ModState>,
        reason: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut comments_t = tx.open_table(&comments::TABLE)?;
            let mut record = comments_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("comment {id}")))?;
            record.mod_state = mod_state;
            record.mod_reason = reason;
            comments_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }
}

/// Re-inserts a comment record dumped by `dump::Database::dump`, preserving
/// its original id and `created_at`. Mirrors `restore_thread_tx`: stats seed
/// fresh and the auto-upvote comes back through the dump's `UpvoteBatch`.
pub(crate) fn restore_comment_tx(
    tx: &WriteTransactionCtx,
    id: CommentId,
    record: CommentRecord,
    board: ludwig_types::BoardId,
) -> DbResult<()> {
    let created_at = record.created_at;
    let thread = record.thread;
    let parent = record.parent;

    tx.open_table(&comments::TABLE)?.insert(&id, &record)?;
    tx.open_table(&post_stats::TABLE)?
        .insert(&id.get(), &PostStatsRecord::new(created_at))?;
    index_new_comment_tx(tx, id, &record, board)?;

    rollup_comment_create_tx(tx, thread, parent, created_at)?;

    let (before, after) = update_user_stats_tx(tx, record.author, |s| {
        s.comment_count += 1;
        s.latest_post_time = created_at;
        s.latest_post_id = id.get();
    })?;
    reindex_user_post_indexes_tx(tx, record.author, before, after)?;

    let (before, after) = update_board_stats_tx(tx, board, |s| {
        s.comment_count += 1;
        s.latest_post_time = created_at;
        s.latest_post_id = id.get();
    })?;
    reindex_board_post_indexes_tx(tx, board, before, after)?;

    Database::update_site_stats_tx(tx, |s| s.comment_count += 1)?;
    Ok(())
}

fn index_new_comment_tx(
    tx: &WriteTransactionCtx,
    id: CommentId,
    record: &CommentRecord,
    board: ludwig_types::BoardId,
) -> DbResult<()> {
    let t = record.created_at.as_secs();
    let karma0 = Karma::ZERO.to_sort_key();

    tx.open_table(&comments_new::TABLE)?.insert(&(t, id), &())?;
    tx.open_table(&comments_top::TABLE)?
        .insert(&(karma0, id), &())?;
    tx.open_table(&comments_of_board_new::TABLE)?
        .insert(&(board, t, id), &())?;
    tx.open_table(&comments_of_board_top::TABLE)?
        .insert(&(board, karma0, id), &())?;
    tx.open_table(&comments_of_user_new::TABLE)?
        .insert(&(record.author, t, id), &())?;
    tx.open_table(&comments_of_user_top::TABLE)?
        .insert(&(record.author, karma0, id), &())?;
    tx.open_table(&children_new::TABLE)?
        .insert(&(record.parent, t, id), &())?;
    tx.open_table(&children_top::TABLE)?
        .insert(&(record.parent, karma0, id), &())?;
    Ok(())
}

fn unindex_comment_tx(
    tx: &WriteTransactionCtx,
    id: CommentId,
    record: &CommentRecord,
    board: ludwig_types::BoardId,
    final_karma: Karma,
    descendant_count: u64,
) -> DbResult<()> {
    let t = record.created_at.as_secs();
    let karma_key = final_karma.to_sort_key();

    tx.open_table(&comments_new::TABLE)?.remove(&(t, id))?;
    tx.open_table(&comments_top::TABLE)?.remove(&(karma_key, id))?;
    tx.open_table(&comments_of_board_new::TABLE)?
        .remove(&(board, t, id))?;
    tx.open_table(&comments_of_board_top::TABLE)?
        .remove(&(board, karma_key, id))?;
    tx.open_table(&comments_of_user_new::TABLE)?
        .remove(&(record.author, t, id))?;
    tx.open_table(&comments_of_user_top::TABLE)?
        .remove(&(record.author, karma_key, id))?;
    tx.open_table(&children_new::TABLE)?
        .remove(&(record.parent, t, id))?;
    tx.open_table(&children_top::TABLE)?
        .remove(&(record.parent, karma_key, id))?;

    tx.open_table(&crate::tables::comments_most_comments::TABLE)?
        .remove(&(descendant_count, id))?;
    tx.open_table(&crate::tables::comments_of_board_most_comments::TABLE)?
        .remove(&(board, descendant_count, id))?;
    Ok(())
}

/// Actually performs the delete for a single comment, assuming its own
/// descendants have already been removed. Called both from
/// `delete_comment` and from `thread_ops::delete_thread`'s cascade.
pub(crate) fn delete_comment_inner_tx(tx: &WriteTransactionCtx, id: CommentId) -> DbResult<()> {
    let mut comments_t = tx.open_table(&comments::TABLE)?;
    let Some(record) = comments_t.get(&id)?.map(|g| g.value()) else {
        return Ok(());
    };
    comments_t.remove(&id)?;
    drop(comments_t);

    let threads_t = tx.open_table(&threads::TABLE)?;
    let board = threads_t
        .get(&record.thread)?
        .map(|g| g.value().board)
        .ok_or_else(|| DbError::invariant("comment's thread missing"))?;
    drop(threads_t);

    let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
    let stats = post_stats_t
        .remove(&post_stats_key(PostId::Comment(id)))?
        .map(|g| g.value())
        .unwrap_or_default();
    drop(post_stats_t);

    unindex_comment_tx(tx, id, &record, board, stats.karma, stats.descendant_count)?;
    crate::vote_ops::clear_votes_on_post_tx(tx, PostId::Comment(id))?;
    rollup_comment_delete_tx(tx, record.thread, record.parent)?;

    let (before, after) = update_user_stats_tx(tx, record.author, |s| {
        s.comment_count = s.comment_count.saturating_sub(1);
        s.comment_karma -= stats.karma.0;
    })?;
    reindex_user_post_indexes_tx(tx, record.author, before, after)?;

    let (before, after) =
        update_board_stats_tx(tx, board, |s| s.comment_count = s.comment_count.saturating_sub(1))?;
    reindex_board_post_indexes_tx(tx, board, before, after)?;

    if record.federation.is_none() {
        Database::update_site_stats_tx(tx, |s| s.comment_count = s.comment_count.saturating_sub(1))?;
    }

    tx.emit(DbEvent::UserStatsUpdate(record.author));
    tx.emit(DbEvent::BoardStatsUpdate(board));
    Ok(())
}

/// Every comment whose `thread` field is `thread` (used by
/// `thread_ops::delete_thread`'s cascade). A plain table scan over
/// `comments_of_board_new` would require knowing the board; scanning the
/// `comments` table directly by `thread` has no dedicated index, so this
/// walks `children_new` breadth-first from the thread's id instead, which
/// only visits actual descendants.
pub(crate) fn collect_thread_comment_ids_tx(
    tx: &WriteTransactionCtx,
    thread: ThreadId,
) -> DbResult<Vec<CommentId>> {
    collect_comment_descendant_ids_impl(tx, thread.get())
}

fn collect_comment_descendant_ids_impl(
    tx: &WriteTransactionCtx,
    parent: u64,
) -> DbResult<Vec<CommentId>> {
    let mut out = Vec::new();
    let mut frontier = vec![parent];
    let children_new_t = tx.open_table(&children_new::TABLE)?;
    while let Some(p) = frontier.pop() {
        let lo = (p, 0u64, CommentId::new(0));
        let hi = (p, u64::MAX, CommentId::new(u64::MAX));
        for entry in children_new_t.range(&lo..=&hi)? {
            let (k, _) = entry?;
            let (_, _, child_id) = k.value();
            out.push(child_id);
            frontier.push(child_id.get());
        }
    }
    Ok(out)
}

pub(crate) fn post_stats_for_tx(
    tx: &WriteTransactionCtx,
    id: CommentId,
) -> DbResult<Option<PostStatsRecord>> {
    let t = tx.open_table(&post_stats::TABLE)?;
    crate::stats_ops::get_post_stats_tx(&t, PostId::Comment(id))
}

pub(crate) fn reindex_comment_top_tx(
    tx: &WriteTransactionCtx,
    id: CommentId,
    board: ludwig_types::BoardId,
    author: UserId,
    parent: u64,
    old_karma: Karma,
    new_karma: Karma,
) -> DbResult<()> {
    reindex_top_tx(
        tx,
        PostId::Comment(id),
        board,
        author,
        Some(parent),
        old_karma,
        new_karma,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    async fn setup() -> (Database, UserId, UserId, ThreadId) {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        let bob = db
            .create_local_user()
            .name("bob".to_string())
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
        (db, alice, bob, thread)
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn reply_updates_thread_descendant_count_and_author_comment_count() {
        let (db, alice, bob, thread) = setup().await;
        db.create_comment()
            .author(bob)
            .thread(thread)
            .parent(thread.get())
            .content("hi".to_string())
            .call()
            .await
            .unwrap();

        let stats = db
            .get_post_stats(PostId::Thread(thread))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.descendant_count, 1);
        assert_eq!(stats.child_count, 1);

        let alice_stats = db.get_user_stats(alice).await.unwrap();
        assert_eq!(alice_stats.comment_count, 0);
        let bob_stats = db.get_user_stats(bob).await.unwrap();
        assert_eq!(bob_stats.comment_count, 1);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn nested_reply_increments_every_ancestor() {
        let (db, _alice, bob, thread) = setup().await;
        let c1 = db
            .create_comment()
            .author(bob)
            .thread(thread)
            .parent(thread.get())
            .content("hi".to_string())
            .call()
            .await
            .unwrap();
        db.create_comment()
            .author(bob)
            .thread(thread)
            .parent(c1.get())
            .content("nested".to_string())
            .call()
            .await
            .unwrap();

        let thread_stats = db
            .get_post_stats(PostId::Thread(thread))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(thread_stats.descendant_count, 2);
        assert_eq!(thread_stats.child_count, 1);

        let c1_stats = db.get_post_stats(PostId::Comment(c1)).await.unwrap().unwrap();
        assert_eq!(c1_stats.descendant_count, 1);
        assert_eq!(c1_stats.child_count, 1);
    }
}
