//! Table definitions for the Ludwig storage engine.
//!
//! # Table categories
//!
//! - **Entity tables** (`users`, `boards`, `threads`, `comments`, ...): the
//!   primary record store, keyed by 64-bit id (§4.2 of the design).
//! - **Stats tables** (`user_stats`, `board_stats`, `post_stats`): one record
//!   per entity, maintained by the stats rollup engine (§4.4).
//! - **Index tables** (`threads_new`, `threads_of_board_top`, ...): sorted
//!   duplicate-key indexes maintained by the secondary index manager (§4.3).
//! - **Set tables** (`subscriptions`, `upvotes`, `saved_posts`, ...): indexes
//!   whose value is `()`, used purely for membership/range queries.
//!
//! See the per-entity `*_ops` modules (`thread_ops`, `comment_ops`,
//! `user_ops`, `board_ops`, ...), `crate::stats_ops` (index reindexing and
//! stats rollup), and `crate::feed` (ranking) for the operations that keep
//! all of the above mutually consistent.

use ludwig_types::{BoardId, CommentId, NotificationId, SessionId, ThreadId, UserId};

pub mod application;
pub mod board;
pub mod comment;
pub mod invite;
pub mod linkcard;
pub mod notification;
pub mod session;
pub mod site;
pub mod stats;
pub mod thread;
pub mod user;

pub use application::ApplicationRecord;
pub use board::{BoardRecord, LocalBoardRecord};
pub use comment::CommentRecord;
pub use invite::InviteRecord;
pub use linkcard::LinkCardRecord;
pub use notification::NotificationRecord;
pub use session::SessionRecord;
pub use site::{SiteDetail, SiteStatsRecord};
pub use stats::{BoardStatsRecord, PostStatsRecord, UserStatsRecord};
pub use thread::ThreadRecord;
pub use user::{LocalUserRecord, UserRecord};

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

// ============================================================================
// SYSTEM TABLES
// ============================================================================

def_table! {
    /// Schema/db version marker, checked at open time.
    db_version: () => u64
}

def_table! {
    /// Reserved string-keyed settings (see §6 of the design: `next_id`,
    /// `hash_seed`, `jwt_secret`, feature flags, ...). Values are stored as
    /// their natural bincode encoding of whatever type the setting holds;
    /// callers are expected to know the type for a given key.
    settings: String => Vec<u8>
}

def_table! {
    /// Singleton site-wide aggregate counters.
    site_stats: () => SiteStatsRecord
}

// ============================================================================
// ENTITY TABLES
// ============================================================================

def_table! {
    users: UserId => UserRecord
}

def_table! {
    local_users: UserId => LocalUserRecord
}

def_table! {
    boards: BoardId => BoardRecord
}

def_table! {
    local_boards: BoardId => LocalBoardRecord
}

def_table! {
    threads: ThreadId => ThreadRecord
}

def_table! {
    comments: CommentId => CommentRecord
}

def_table! {
    sessions: SessionId => SessionRecord
}

def_table! {
    notifications: NotificationId => NotificationRecord
}

def_table! {
    invites: ludwig_types::InviteId => InviteRecord
}

def_table! {
    applications: ludwig_types::ApplicationId => ApplicationRecord
}

def_table! {
    /// Keyed by the lowercased url string.
    link_cards: String => LinkCardRecord
}

// ============================================================================
// NAME / EMAIL LOOKUP TABLES (lowercase-unique string keys)
// ============================================================================

def_table! {
    users_by_name: String => UserId
}

def_table! {
    local_users_by_email: String => UserId
}

def_table! {
    boards_by_name: String => BoardId
}

// ============================================================================
// STATS TABLES
// ============================================================================

def_table! {
    user_stats: UserId => UserStatsRecord
}

def_table! {
    board_stats: BoardId => BoardStatsRecord
}

/// `PostStats` is shared between threads and comments; since both draw their
/// ids from the same monotonic counter (§3: "all ids are ... allocated
/// monotonically from a single counter"), a thread id and a comment id can
/// never collide, so the raw `u64` id is used directly as the key here (see
/// [`crate::stats_ops::post_stats_key`]).
def_table! {
    post_stats: u64 => PostStatsRecord
}

// ============================================================================
// THREAD INDEXES (§4.3) -- global / per-board / per-user, each by
// created_at, karma_uint, descendant_count.
// ============================================================================

def_table! { threads_new: (u64, ThreadId) => () }
def_table! { threads_top: (u64, ThreadId) => () }
def_table! { threads_most_comments: (u64, ThreadId) => () }

def_table! { threads_of_board_new: (BoardId, u64, ThreadId) => () }
def_table! { threads_of_board_top: (BoardId, u64, ThreadId) => () }
def_table! { threads_of_board_most_comments: (BoardId, u64, ThreadId) => () }

def_table! { threads_of_user_new: (UserId, u64, ThreadId) => () }
def_table! { threads_of_user_top: (UserId, u64, ThreadId) => () }

def_table! {
    /// Domain of `content_url`, lowercased, for "threads from this domain".
    threads_by_domain: (String, u64, ThreadId) => ()
}

// ============================================================================
// COMMENT INDEXES -- same pattern as threads, plus children-of-parent.
// ============================================================================

def_table! { comments_new: (u64, CommentId) => () }
def_table! { comments_top: (u64, CommentId) => () }
def_table! { comments_most_comments: (u64, CommentId) => () }

def_table! { comments_of_board_new: (BoardId, u64, CommentId) => () }
def_table! { comments_of_board_top: (BoardId, u64, CommentId) => () }
def_table! { comments_of_board_most_comments: (BoardId, u64, CommentId) => () }

def_table! { comments_of_user_new: (UserId, u64, CommentId) => () }
def_table! { comments_of_user_top: (UserId, u64, CommentId) => () }

def_table! {
    /// Children of a given parent post, ordered by karma. Parent may be a
    /// thread id or a comment id (see [`crate::stats_ops::post_stats_key`]).
    children_top: (u64, u64, CommentId) => ()
}
def_table! {
    /// Children of a given parent post, ordered by creation time.
    children_new: (u64, u64, CommentId) => ()
}

// ============================================================================
// USER INDEXES
// ============================================================================

def_table! { users_new: (u64, UserId) => () }
def_table! { users_new_posts: (u64, UserId) => () }
def_table! { users_most_posts: (u64, UserId) => () }

def_table! { subscribed_boards: (UserId, BoardId) => () }
def_table! { board_subscribers: (BoardId, UserId) => () }

def_table! { owned_boards: (UserId, BoardId) => () }

def_table! { upvoted_posts: (UserId, u64) => () }
def_table! { downvoted_posts: (UserId, u64) => () }

def_table! {
    /// Reverse of `upvoted_posts`, keyed by post first, so a post delete can
    /// find and clear every vote on it without scanning every user.
    post_upvoters: (u64, UserId) => ()
}
def_table! {
    /// Reverse of `downvoted_posts`.
    post_downvoters: (u64, UserId) => ()
}

def_table! { saved_posts: (UserId, u64) => () }
def_table! { hidden_posts: (UserId, u64) => () }
def_table! { hidden_users: (UserId, UserId) => () }
def_table! { hidden_boards: (UserId, BoardId) => () }

// ============================================================================
// BOARD INDEXES
// ============================================================================

def_table! { boards_new: (u64, BoardId) => () }
def_table! { boards_new_posts: (u64, BoardId) => () }
def_table! { boards_most_posts: (u64, BoardId) => () }
def_table! { boards_most_subscribers: (u64, BoardId) => () }
