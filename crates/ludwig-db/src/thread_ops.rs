//! Thread create/set/delete (§4.2, §4.3, §4.4): the primary record plus its
//! nine indexes (global/board/user × new/top/most_comments, minus the
//! user-scoped most_comments variant the spec doesn't define) and cascading
//! stats.

use ludwig_types::{validate_content_url, validate_post_content, validate_title, BoardId, Karma, ModState, PostId, ThreadId, UserId};
use rand::RngCore as _;
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::site_ops::{allocate_id_tx, get_setting};
use crate::stats_ops::{
    get_post_stats_tx, reindex, reindex_board_post_indexes_tx, reindex_user_post_indexes_tx,
    reindex_top_tx, update_board_stats_tx, update_user_stats_tx,
};
use crate::tables::{
    post_stats, settings, site::setting_keys, threads, threads_by_domain,
    threads_new, threads_of_board_new, threads_of_board_top, threads_of_user_new,
    threads_of_user_top, threads_top, PostStatsRecord, ThreadRecord,
};
use crate::{now, DbError, DbEvent, Database, WritePriority, WriteTransactionCtx};

const DEFAULT_POST_MAX_LENGTH: usize = 100_000;

#[bon::bon]
impl Database {
    /// Creates a thread (§8 S2). The author automatically upvotes their own
    /// post (matching the scenario: "alice votes +1 on T1 (automatic on
    /// create)"), so the returned thread starts at karma 1.
    #[builder]
    pub async fn create_thread(
        &self,
        author: UserId,
        board: BoardId,
        title: String,
        #[builder(default)] content_url: Option<String>,
        #[builder(default)] content_text: Option<String>,
        #[builder(default)] content_warning: Option<String>,
    ) -> DbResult<ThreadId> {
        validate_title(&title)?;
        if let Some(url) = &content_url {
            validate_content_url(url)?;
        }

        let result = self
            .write_with(WritePriority::UserInitiated, |tx| {
                let settings_t = tx.open_table(&settings::TABLE)?;
                let max_len = get_setting::<u64>(&settings_t, setting_keys::POST_MAX_LENGTH)?
                    .unwrap_or(DEFAULT_POST_MAX_LENGTH as u64) as usize;
                drop(settings_t);
                if let Some(text) = &content_text {
                    validate_post_content(text, max_len, true)?;
                }

                let created_at = now();
                let mut salt_bytes = [0u8; 4];
                rand::rng().fill_bytes(&mut salt_bytes);

                let mut settings_t = tx.open_table(&settings::TABLE)?;
                let id = ThreadId::new(allocate_id_tx(&mut settings_t)?);
                drop(settings_t);

                let record = ThreadRecord {
                    author,
                    board,
                    title: title.clone(),
                    created_at,
                    updated_at: None,
                    content_url: content_url.clone(),
                    content_text,
                    content_warning,
                    federation: None,
                    mod_state: None,
                    mod_reason: None,
                    salt: u32::from_le_bytes(salt_bytes),
                };

                let mut threads_t = tx.open_table(&threads::TABLE)?;
                threads_t.insert(&id, &record)?;
                drop(threads_t);

                let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
                post_stats_t.insert(&id.get(), &PostStatsRecord::new(created_at))?;
                drop(post_stats_t);

                index_new_thread_tx(tx, id, &record)?;

                let (before, after) =
                    update_user_stats_tx(tx, author, |s| {
                        s.thread_count += 1;
                        s.latest_post_time = created_at;
                        s.latest_post_id = id.get();
                    })?;
                reindex_user_post_indexes_tx(tx, author, before, after)?;

                let (before, after) =
                    update_board_stats_tx(tx, board, |s| {
                        s.thread_count += 1;
                        s.latest_post_time = created_at;
                        s.latest_post_id = id.get();
                    })?;
                reindex_board_post_indexes_tx(tx, board, before, after)?;

                Database::update_site_stats_tx(tx, |s| s.thread_count += 1)?;

                tx.emit(DbEvent::UserStatsUpdate(author));
                tx.emit(DbEvent::BoardStatsUpdate(board));
                tx.emit(DbEvent::PostStatsUpdate(id.get()));
                if content_url.is_some() {
                    tx.emit(DbEvent::ThreadFetchLinkCard(id));
                }

                Ok(id)
            })
            .await?;

        self.set_vote_on_thread(author, result, ludwig_types::VoteValue::Upvote)
            .await?;
        Ok(result)
    }

    /// Mutates a thread's editable fields, preserving `author`/`created_at`
    /// (§3 lifecycle). Does not touch votes or stats.
    pub async fn set_thread(
        &self,
        id: ThreadId,
        title: String,
        content_text: Option<String>,
        content_warning: Option<String>,
    ) -> DbResult<()> {
        validate_title(&title)?;
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut threads_t = tx.open_table(&threads::TABLE)?;
            let mut record = threads_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("thread {id}")))?;
            record.title = title;
            record.content_text = content_text;
            record.content_warning = content_warning;
            record.updated_at = Some(now());
            threads_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    pub async fn get_thread(&self, id: ThreadId) -> DbResult<Option<ThreadRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&threads::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// Deletes a thread and cascades (§3 Lifecycle, §8 S6): every descendant
    /// comment, every vote on the thread or its descendants, every index
    /// entry, and decrements board/user/site stats.
    pub async fn delete_thread(&self, id: ThreadId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut threads_t = tx.open_table(&threads::TABLE)?;
            let Some(record) = threads_t.get(&id)?.map(|g| g.value()) else {
                return Ok(());
            };

            // Cascade: delete every descendant comment first so ancestor
            // stats rollups triggered by comment deletion see a thread that
            // still exists.
            let descendant_ids = crate::comment_ops::collect_thread_comment_ids_tx(tx, id)?;
            for comment_id in descendant_ids {
                crate::comment_ops::delete_comment_inner_tx(tx, comment_id)?;
            }

            threads_t.remove(&id)?;
            drop(threads_t);

            let mut post_stats_t = tx.open_table(&post_stats::TABLE)?;
            let stats = post_stats_t.remove(&id.get())?.map(|g| g.value()).unwrap_or_default();
            drop(post_stats_t);

            unindex_thread_tx(tx, id, &record, stats.karma)?;
            crate::vote_ops::clear_votes_on_post_tx(tx, PostId::Thread(id))?;

            let (before, after) = update_user_stats_tx(tx, record.author, |s| {
                s.thread_count = s.thread_count.saturating_sub(1);
                s.thread_karma -= stats.karma.0;
            })?;
            reindex_user_post_indexes_tx(tx, record.author, before, after)?;

            let (before, after) = update_board_stats_tx(tx, record.board, |s| {
                s.thread_count = s.thread_count.saturating_sub(1);
            })?;
            reindex_board_post_indexes_tx(tx, record.board, before, after)?;

            if record.federation.is_none() {
                Database::update_site_stats_tx(tx, |s| {
                    s.thread_count = s.thread_count.saturating_sub(1)
                })?;
            }

            tx.emit(DbEvent::UserStatsUpdate(record.author));
            tx.emit(DbEvent::BoardStatsUpdate(record.board));

            Ok(())
        })
        .await
    }

    pub async fn set_thread_mod_state(
        &self,
        id: ThreadId,
        mod_state: Option<ModState>,
        reason: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut threads_t = tx.open_table(&threads::TABLE)?;
            let mut record = threads_t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("thread {id}")))?;
            record.mod_state = mod_state;
            record.mod_reason = reason;
            threads_t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }
}

/// Re-inserts a thread record dumped by `dump::Database::dump`, preserving
/// its original id and `created_at`. Stats and votes are not carried in the
/// dump envelope (§6: only `Setting`/`User`/`LocalUser`/`Board`/`LocalBoard`/
/// `Thread`/`Comment`/`Notification`/vote-and-subscription batches are), so
/// `post_stats` is seeded fresh here and the author's auto-upvote is restored
/// separately by replaying the dump's `UpvoteBatch` records.
pub(crate) fn restore_thread_tx(tx: &WriteTransactionCtx, id: ThreadId, record: ThreadRecord) -> DbResult<()> {
    let created_at = record.created_at;

    tx.open_table(&threads::TABLE)?.insert(&id, &record)?;
    tx.open_table(&post_stats::TABLE)?
        .insert(&id.get(), &PostStatsRecord::new(created_at))?;
    index_new_thread_tx(tx, id, &record)?;

    let (before, after) = update_user_stats_tx(tx, record.author, |s| {
        s.thread_count += 1;
        s.latest_post_time = created_at;
        s.latest_post_id = id.get();
    })?;
    reindex_user_post_indexes_tx(tx, record.author, before, after)?;

    let (before, after) = update_board_stats_tx(tx, record.board, |s| {
        s.thread_count += 1;
        s.latest_post_time = created_at;
        s.latest_post_id = id.get();
    })?;
    reindex_board_post_indexes_tx(tx, record.board, before, after)?;

    Database::update_site_stats_tx(tx, |s| s.thread_count += 1)?;
    Ok(())
}

fn index_new_thread_tx(tx: &WriteTransactionCtx, id: ThreadId, record: &ThreadRecord) -> DbResult<()> {
    let t = record.created_at.as_secs();
    let karma0 = Karma::ZERO.to_sort_key();

    let mut new_t = tx.open_table(&threads_new::TABLE)?;
    new_t.insert(&(t, id), &())?;
    drop(new_t);
    let mut top_t = tx.open_table(&threads_top::TABLE)?;
    top_t.insert(&(karma0, id), &())?;
    drop(top_t);

    let mut board_new = tx.open_table(&threads_of_board_new::TABLE)?;
    board_new.insert(&(record.board, t, id), &())?;
    drop(board_new);
    let mut board_top = tx.open_table(&threads_of_board_top::TABLE)?;
    board_top.insert(&(record.board, karma0, id), &())?;
    drop(board_top);

    let mut user_new = tx.open_table(&threads_of_user_new::TABLE)?;
    user_new.insert(&(record.author, t, id), &())?;
    drop(user_new);
    let mut user_top = tx.open_table(&threads_of_user_top::TABLE)?;
    user_top.insert(&(record.author, karma0, id), &())?;
    drop(user_top);

    if let Some(domain) = record.url_domain() {
        let mut by_domain = tx.open_table(&threads_by_domain::TABLE)?;
        by_domain.insert(&(domain, t, id), &())?;
    }
    Ok(())
}

fn unindex_thread_tx(
    tx: &WriteTransactionCtx,
    id: ThreadId,
    record: &ThreadRecord,
    final_karma: Karma,
) -> DbResult<()> {
    let t = record.created_at.as_secs();
    let karma_key = final_karma.to_sort_key();

    tx.open_table(&threads_new::TABLE)?.remove(&(t, id))?;
    tx.open_table(&threads_top::TABLE)?.remove(&(karma_key, id))?;
    tx.open_table(&threads_of_board_new::TABLE)?
        .remove(&(record.board, t, id))?;
    tx.open_table(&threads_of_board_top::TABLE)?
        .remove(&(record.board, karma_key, id))?;
    tx.open_table(&threads_of_user_new::TABLE)?
        .remove(&(record.author, t, id))?;
    tx.open_table(&threads_of_user_top::TABLE)?
        .remove(&(record.author, karma_key, id))?;

    let mut most_comments = tx.open_table(&crate::tables::threads_most_comments::TABLE)?;
    // descendant_count is always 0 by the time this runs (descendants were
    // deleted first), so the key is `(0, id)`.
    most_comments.remove(&(0u64, id))?;
    drop(most_comments);
    let mut board_most_comments = tx.open_table(&crate::tables::threads_of_board_most_comments::TABLE)?;
    board_most_comments.remove(&(record.board, 0u64, id))?;

    if let Some(domain) = record.url_domain() {
        tx.open_table(&threads_by_domain::TABLE)?.remove(&(domain, t, id))?;
    }
    Ok(())
}

/// Reindexes a thread's `top` position after a vote change (called from
/// `vote_ops`).
pub(crate) fn reindex_thread_top_tx(
    tx: &WriteTransactionCtx,
    id: ThreadId,
    board: BoardId,
    author: UserId,
    old_karma: Karma,
    new_karma: Karma,
) -> DbResult<()> {
    reindex_top_tx(tx, PostId::Thread(id), board, author, None, old_karma, new_karma)
}

pub(crate) fn post_stats_for_tx(
    tx: &crate::WriteTransactionCtx,
    id: ThreadId,
) -> DbResult<Option<PostStatsRecord>> {
    let t = tx.open_table(&post_stats::TABLE)?;
    get_post_stats_tx(&t, PostId::Thread(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, UserId, BoardId) {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(crate::site_ops::SiteConfig::default())
            .await
            .unwrap();
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
    async fn create_thread_auto_upvotes_and_updates_indexes() {
        let (db, alice, board) = setup().await;
        let thread = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("Hello".to_string())
            .content_url("https://x.invalid".to_string())
            .call()
            .await
            .unwrap();

        let stats = db.get_post_stats(PostId::Thread(thread)).await.unwrap().unwrap();
        assert_eq!(stats.upvotes, 1);
        assert_eq!(stats.downvotes, 0);
        assert_eq!(stats.karma, Karma(1));
        assert_eq!(stats.descendant_count, 0);

        let user_stats = db.get_user_stats(alice).await.unwrap();
        assert_eq!(user_stats.thread_count, 1);
        assert_eq!(user_stats.thread_karma, 1);

        let board_stats = db.get_board_stats(board).await.unwrap();
        assert_eq!(board_stats.thread_count, 1);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn delete_thread_cascades_and_zeroes_stats() {
        let (db, alice, board) = setup().await;
        let thread = db
            .create_thread()
            .author(alice)
            .board(board)
            .title("Hello".to_string())
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
        db.create_comment()
            .author(bob)
            .thread(thread)
            .parent(thread.get())
            .content("hi".to_string())
            .call()
            .await
            .unwrap();

        db.delete_thread(thread).await.unwrap();

        assert!(db.get_thread(thread).await.unwrap().is_none());
        let board_stats = db.get_board_stats(board).await.unwrap();
        assert_eq!(board_stats.thread_count, 0);
        assert_eq!(board_stats.comment_count, 0);
        let user_stats = db.get_user_stats(alice).await.unwrap();
        assert_eq!(user_stats.thread_count, 0);
    }
}
