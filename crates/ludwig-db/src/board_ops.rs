//! Board create/set/delete (§4.2, §4.3) and subscription membership (§4.3
//! "owned-subsets": subscribed boards / board subscribers).

use ludwig_types::{validate_name, BoardId, ModState, UserId};
use redb_bincode::ReadableTable as _;

use crate::error::DbResult;
use crate::site_ops::allocate_id_tx;
use crate::stats_ops::reindex;
use crate::tables::{
    board_stats, board_subscribers, boards, boards_by_name, boards_most_subscribers,
    boards_new, local_boards, owned_boards, settings, subscribed_boards, BoardRecord,
    BoardStatsRecord, LocalBoardRecord,
};
use crate::{now, DbError, DbEvent, Database, WritePriority};

#[bon::bon]
impl Database {
    /// Creates a local board (§8 S1 creates a board as part of setup). Board
    /// names are lowercase-unique, same rule as user names.
    #[builder]
    pub async fn create_board(
        &self,
        name: String,
        owner: UserId,
        #[builder(default)] display_name: Option<String>,
        #[builder(default)] description: Option<String>,
        #[builder(default)] private: bool,
    ) -> DbResult<BoardId> {
        validate_name(&name)?;
        let name_key = name.to_lowercase();

        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut by_name_t = tx.open_table(&boards_by_name::TABLE)?;
            if by_name_t.get(&name_key)?.is_some() {
                return Err(DbError::conflict(format!("board name {name} taken")));
            }

            let created_at = now();
            let mut settings_t = tx.open_table(&settings::TABLE)?;
            let id = BoardId::new(allocate_id_tx(&mut settings_t)?);
            drop(settings_t);

            let record = BoardRecord {
                name: name.clone(),
                display_name,
                icon_url: None,
                banner_url: None,
                description,
                content_warning: None,
                created_at,
                restricted_posting: false,
                can_upvote: true,
                can_downvote: true,
                approve_subscribe: false,
                federation: None,
                mod_state: None,
                mod_reason: None,
            };
            tx.open_table(&boards::TABLE)?.insert(&id, &record)?;
            by_name_t.insert(&name_key, &id)?;
            drop(by_name_t);

            tx.open_table(&local_boards::TABLE)?.insert(
                &id,
                &LocalBoardRecord {
                    owner,
                    private,
                    federated: false,
                },
            )?;

            tx.open_table(&board_stats::TABLE)?
                .insert(&id, &BoardStatsRecord::default())?;
            tx.open_table(&boards_new::TABLE)?
                .insert(&(created_at.as_secs(), id), &())?;
            tx.open_table(&crate::tables::boards_new_posts::TABLE)?
                .insert(&(0u64, id), &())?;
            tx.open_table(&crate::tables::boards_most_posts::TABLE)?
                .insert(&(0u64, id), &())?;
            tx.open_table(&boards_most_subscribers::TABLE)?
                .insert(&(0u64, id), &())?;

            tx.open_table(&owned_boards::TABLE)?.insert(&(owner, id), &())?;

            Database::update_site_stats_tx(tx, |s| s.board_count += 1)?;
            tx.emit(DbEvent::SiteUpdate);
            Ok(id)
        })
        .await
    }

    pub async fn get_board(&self, id: BoardId) -> DbResult<Option<BoardRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&boards::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_board_by_name(&self, name: &str) -> DbResult<Option<BoardRecord>> {
        let name_key = name.to_lowercase();
        self.read_with(|tx| {
            let by_name_t = tx.open_table(&boards_by_name::TABLE)?;
            let Some(id) = by_name_t.get(&name_key)?.map(|g| g.value()) else {
                return Ok(None);
            };
            let boards_t = tx.open_table(&boards::TABLE)?;
            Ok(boards_t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_local_board(&self, id: BoardId) -> DbResult<Option<LocalBoardRecord>> {
        self.read_with(|tx| {
            let t = tx.open_table(&local_boards::TABLE)?;
            Ok(t.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn set_board(
        &self,
        id: BoardId,
        display_name: Option<String>,
        description: Option<String>,
        content_warning: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut t = tx.open_table(&boards::TABLE)?;
            let mut record = t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("board {id}")))?;
            record.display_name = display_name;
            record.description = description;
            record.content_warning = content_warning;
            t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    pub async fn set_board_mod_state(
        &self,
        id: BoardId,
        mod_state: Option<ModState>,
        reason: Option<String>,
    ) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut t = tx.open_table(&boards::TABLE)?;
            let mut record = t
                .get(&id)?
                .map(|g| g.value())
                .ok_or_else(|| DbError::not_found(format!("board {id}")))?;
            record.mod_state = mod_state;
            record.mod_reason = reason;
            t.insert(&id, &record)?;
            Ok(())
        })
        .await
    }

    /// Deletes a board. Out of scope: cascading the deletion into every
    /// thread the board contains (unlike `delete_thread`'s comment cascade,
    /// `spec.md` does not describe board deletion cascading into posts --
    /// boards are a coarser, rarer deletion than a single thread). Removes
    /// the board's own index entries and subscriber set.
    pub async fn delete_board(&self, id: BoardId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut boards_t = tx.open_table(&boards::TABLE)?;
            let Some(record) = boards_t.get(&id)?.map(|g| g.value()) else {
                return Ok(());
            };
            boards_t.remove(&id)?;
            drop(boards_t);

            tx.open_table(&boards_by_name::TABLE)?
                .remove(&record.name.to_lowercase())?;
            tx.open_table(&boards_new::TABLE)?
                .remove(&(record.created_at.as_secs(), id))?;

            if let Some(local) = tx.open_table(&local_boards::TABLE)?.remove(&id)?.map(|g| g.value()) {
                tx.open_table(&owned_boards::TABLE)?.remove(&(local.owner, id))?;
            }

            let stats = tx
                .open_table(&board_stats::TABLE)?
                .remove(&id)?
                .map(|g| g.value())
                .unwrap_or_default();
            tx.open_table(&crate::tables::boards_new_posts::TABLE)?
                .remove(&(stats.latest_post_time.as_secs(), id))?;
            let post_count = stats.thread_count + stats.comment_count;
            tx.open_table(&crate::tables::boards_most_posts::TABLE)?
                .remove(&(post_count, id))?;
            tx.open_table(&boards_most_subscribers::TABLE)?
                .remove(&(stats.subscriber_count, id))?;

            let subscribers: Vec<UserId> = {
                let t = tx.open_table(&board_subscribers::TABLE)?;
                let lo = (id, UserId::new(0));
                let hi = (id, UserId::new(u64::MAX));
                t.range(&lo..=&hi)?
                    .map(|entry| entry.map(|(k, _)| k.value().1))
                    .collect::<Result<_, _>>()?
            };
            {
                let mut rev_t = tx.open_table(&board_subscribers::TABLE)?;
                let mut fwd_t = tx.open_table(&subscribed_boards::TABLE)?;
                for user in subscribers {
                    rev_t.remove(&(id, user))?;
                    fwd_t.remove(&(user, id))?;
                }
            }

            Database::update_site_stats_tx(tx, |s| s.board_count = s.board_count.saturating_sub(1))?;
            tx.emit(DbEvent::SiteUpdate);
            Ok(())
        })
        .await
    }

    /// Subscribes `user` to `board` (§3's Subscription entity). A no-op if
    /// already subscribed.
    pub async fn subscribe(&self, user: UserId, board: BoardId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut fwd_t = tx.open_table(&subscribed_boards::TABLE)?;
            if fwd_t.get(&(user, board))?.is_some() {
                return Ok(());
            }
            fwd_t.insert(&(user, board), &())?;
            drop(fwd_t);
            tx.open_table(&board_subscribers::TABLE)?.insert(&(board, user), &())?;

            let mut stats_t = tx.open_table(&board_stats::TABLE)?;
            let mut stats = stats_t.get(&board)?.map(|g| g.value()).unwrap_or_default();
            let old_count = stats.subscriber_count;
            stats.subscriber_count += 1;
            let new_count = stats.subscriber_count;
            stats_t.insert(&board, &stats)?;
            drop(stats_t);

            let mut idx = tx.open_table(&boards_most_subscribers::TABLE)?;
            reindex(&mut idx, Some((old_count, board)), (new_count, board))?;

            tx.emit(DbEvent::BoardStatsUpdate(board));
            Ok(())
        })
        .await
    }

    /// Unsubscribes `user` from `board`. A no-op if not subscribed.
    pub async fn unsubscribe(&self, user: UserId, board: BoardId) -> DbResult<()> {
        self.write_with(WritePriority::UserInitiated, |tx| {
            let mut fwd_t = tx.open_table(&subscribed_boards::TABLE)?;
            if fwd_t.get(&(user, board))?.is_none() {
                return Ok(());
            }
            fwd_t.remove(&(user, board))?;
            drop(fwd_t);
            tx.open_table(&board_subscribers::TABLE)?.remove(&(board, user))?;

            let mut stats_t = tx.open_table(&board_stats::TABLE)?;
            let mut stats = stats_t.get(&board)?.map(|g| g.value()).unwrap_or_default();
            let old_count = stats.subscriber_count;
            stats.subscriber_count = stats.subscriber_count.saturating_sub(1);
            let new_count = stats.subscriber_count;
            stats_t.insert(&board, &stats)?;
            drop(stats_t);

            let mut idx = tx.open_table(&boards_most_subscribers::TABLE)?;
            reindex(&mut idx, Some((old_count, board)), (new_count, board))?;

            tx.emit(DbEvent::BoardStatsUpdate(board));
            Ok(())
        })
        .await
    }

    pub async fn is_subscribed(&self, user: UserId, board: BoardId) -> DbResult<bool> {
        self.read_with(|tx| {
            let t = tx.open_table(&subscribed_boards::TABLE)?;
            Ok(t.get(&(user, board))?.is_some())
        })
        .await
    }
}

/// Replays one subscription recorded in a dump's `SubscriptionBatch` (§6)
/// during `restore`. Mirrors [`Database::subscribe`] without the
/// write-transaction wrapper, since restore runs every record inside one
/// shared transaction.
pub(crate) fn restore_subscription_tx(
    tx: &crate::WriteTransactionCtx,
    user: UserId,
    board: BoardId,
) -> DbResult<()> {
    let mut fwd_t = tx.open_table(&subscribed_boards::TABLE)?;
    if fwd_t.get(&(user, board))?.is_some() {
        return Ok(());
    }
    fwd_t.insert(&(user, board), &())?;
    drop(fwd_t);
    tx.open_table(&board_subscribers::TABLE)?.insert(&(board, user), &())?;

    let mut stats_t = tx.open_table(&board_stats::TABLE)?;
    let mut stats = stats_t.get(&board)?.map(|g| g.value()).unwrap_or_default();
    let old_count = stats.subscriber_count;
    stats.subscriber_count += 1;
    let new_count = stats.subscriber_count;
    stats_t.insert(&board, &stats)?;
    drop(stats_t);

    let mut idx = tx.open_table(&boards_most_subscribers::TABLE)?;
    reindex(&mut idx, Some((old_count, board)), (new_count, board))?;
    Ok(())
}

/// Re-inserts a board record dumped by `dump::Database::dump`, preserving its
/// original id.
pub(crate) fn restore_board_tx(tx: &crate::WriteTransactionCtx, id: BoardId, record: BoardRecord) -> DbResult<()> {
    let name_key = record.name.to_lowercase();
    let created_at = record.created_at;
    tx.open_table(&boards::TABLE)?.insert(&id, &record)?;
    tx.open_table(&boards_by_name::TABLE)?.insert(&name_key, &id)?;
    tx.open_table(&board_stats::TABLE)?
        .insert(&id, &BoardStatsRecord::default())?;
    tx.open_table(&boards_new::TABLE)?
        .insert(&(created_at.as_secs(), id), &())?;
    tx.open_table(&crate::tables::boards_new_posts::TABLE)?
        .insert(&(0u64, id), &())?;
    tx.open_table(&crate::tables::boards_most_posts::TABLE)?
        .insert(&(0u64, id), &())?;
    tx.open_table(&boards_most_subscribers::TABLE)?
        .insert(&(0u64, id), &())?;
    Database::update_site_stats_tx(tx, |s| s.board_count += 1)?;
    Ok(())
}

/// Re-inserts a `LocalBoardRecord` dumped alongside its `BoardRecord`.
pub(crate) fn restore_local_board_tx(
    tx: &crate::WriteTransactionCtx,
    id: BoardId,
    record: LocalBoardRecord,
) -> DbResult<()> {
    tx.open_table(&owned_boards::TABLE)?.insert(&(record.owner, id), &())?;
    tx.open_table(&local_boards::TABLE)?.insert(&id, &record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site_ops::SiteConfig;

    async fn setup() -> (Database, UserId) {
        let db = Database::new_in_memory().await.unwrap();
        db.create_site(SiteConfig::default()).await.unwrap();
        let alice = db
            .create_local_user()
            .name("alice".to_string())
            .password("Passw0rd!".to_string())
            .call()
            .await
            .unwrap();
        (db, alice)
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn create_board_rejects_duplicate_name() {
        let (db, alice) = setup().await;
        db.create_board()
            .name("main".to_string())
            .owner(alice)
            .call()
            .await
            .unwrap();
        let err = db
            .create_board()
            .name("Main".to_string())
            .owner(alice)
            .call()
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn subscribe_and_unsubscribe_update_subscriber_count() {
        let (db, alice) = setup().await;
        let board = db
            .create_board()
            .name("main".to_string())
            .owner(alice)
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

        db.subscribe(bob, board).await.unwrap();
        assert!(db.is_subscribed(bob, board).await.unwrap());
        assert_eq!(db.get_board_stats(board).await.unwrap().subscriber_count, 1);

        db.unsubscribe(bob, board).await.unwrap();
        assert!(!db.is_subscribed(bob, board).await.unwrap());
        assert_eq!(db.get_board_stats(board).await.unwrap().subscriber_count, 0);
    }
}
