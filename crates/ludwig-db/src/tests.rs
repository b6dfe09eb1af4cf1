//! Cross-cutting property tests (§8): invariants that span more than one
//! `*_ops` module, so they don't naturally live next to a single entity's
//! unit tests. Per-module tests (auto-upvote, cascade-delete, dump/restore,
//! ...) stay where the code they exercise lives; this file is for
//! properties of the system as a whole.

use ludwig_types::VoteValue;

use crate::feed::{FeedScope, SimpleSort};
use crate::paginate::PageCursor;
use crate::site_ops::SiteConfig;
use crate::Database;

async fn seeded_board() -> (Database, ludwig_types::UserId, ludwig_types::BoardId) {
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

/// §8 property 1: every id the monotonic counter hands out is strictly
/// greater than the last one, regardless of which entity type is being
/// created -- the counter is shared, not per-table.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn ids_are_strictly_increasing_across_entity_types() {
    let (db, alice, board) = seeded_board().await;

    let t1 = db
        .create_thread()
        .author(alice)
        .board(board)
        .title("one".to_string())
        .call()
        .await
        .unwrap();
    let c1 = db
        .create_comment()
        .thread(t1)
        .parent(t1.get())
        .author(alice)
        .content("first reply".to_string())
        .call()
        .await
        .unwrap();
    let t2 = db
        .create_thread()
        .author(alice)
        .board(board)
        .title("two".to_string())
        .call()
        .await
        .unwrap();
    let c2 = db
        .create_comment()
        .thread(t1)
        .parent(t1.get())
        .author(alice)
        .content("second reply".to_string())
        .call()
        .await
        .unwrap();

    assert!(t1.get() < c1.get());
    assert!(c1.get() < t2.get());
    assert!(t2.get() < c2.get());
}

/// §8 property 2: an entity that exists in the primary table appears in
/// every secondary index the spec prescribes for it, and a deleted entity
/// appears in none of them.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn thread_presence_in_every_index_matches_existence_in_primary_table() {
    let (db, alice, board) = seeded_board().await;
    let thread = db
        .create_thread()
        .author(alice)
        .board(board)
        .title("indexed thread".to_string())
        .call()
        .await
        .unwrap();

    let (new_ids, _) = db
        .list_feed(FeedScope::Board(board), SimpleSort::New, None, 10)
        .await
        .unwrap();
    assert!(new_ids.contains(&thread));
    let (top_ids, _) = db
        .list_feed(FeedScope::Board(board), SimpleSort::Top, None, 10)
        .await
        .unwrap();
    assert!(top_ids.contains(&thread));

    db.delete_thread(thread).await.unwrap();

    let (new_ids, _) = db
        .list_feed(FeedScope::Board(board), SimpleSort::New, None, 10)
        .await
        .unwrap();
    assert!(!new_ids.contains(&thread));
    let (top_ids, _) = db
        .list_feed(FeedScope::Board(board), SimpleSort::Top, None, 10)
        .await
        .unwrap();
    assert!(!top_ids.contains(&thread));
    assert!(db.get_thread(thread).await.unwrap().is_none());
}

/// §8 property 4 (stats recount equivalence): `PostStats.upvotes -
/// PostStats.downvotes` always equals `PostStats.karma`, across a sequence
/// of votes and vote changes by several users.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn karma_always_equals_upvotes_minus_downvotes() {
    let (db, alice, board) = seeded_board().await;
    let bob = db
        .create_local_user()
        .name("bob".to_string())
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

    let thread = db
        .create_thread()
        .author(alice)
        .board(board)
        .title("voted thread".to_string())
        .call()
        .await
        .unwrap();

    for (user, vote) in [
        (bob, VoteValue::Upvote),
        (carol, VoteValue::Downvote),
        (bob, VoteValue::NoVote),
        (bob, VoteValue::Downvote),
    ] {
        db.set_vote_on_thread(user, thread, vote).await.unwrap();
        let stats = db
            .get_post_stats(ludwig_types::PostId::Thread(thread))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stats.karma.0,
            stats.upvotes as i64 - stats.downvotes as i64,
            "karma diverged from upvotes/downvotes after {user:?} -> {vote:?}"
        );
    }
}

/// §8 property (pagination stability): consuming a feed one item at a time
/// via `next_cursor` visits every item exactly once and in the same order
/// as a single unpaged call.
#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn paginating_one_item_at_a_time_matches_single_unpaged_call() {
    let (db, alice, board) = seeded_board().await;
    let mut created = Vec::new();
    for i in 0..5 {
        let id = db
            .create_thread()
            .author(alice)
            .board(board)
            .title(format!("thread {i}"))
            .call()
            .await
            .unwrap();
        created.push(id);
    }

    let (all_at_once, _) = db
        .list_feed(FeedScope::Board(board), SimpleSort::New, None, 100)
        .await
        .unwrap();

    let mut paged = Vec::new();
    let mut cursor: Option<PageCursor> = None;
    loop {
        let (ids, next) = db
            .list_feed(FeedScope::Board(board), SimpleSort::New, cursor, 1)
            .await
            .unwrap();
        if ids.is_empty() {
            break;
        }
        paged.extend(ids);
        match next {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    assert_eq!(paged, all_at_once);
    assert_eq!(paged.len(), created.len());
}
