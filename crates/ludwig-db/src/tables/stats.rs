use bincode::{Decode, Encode};
use ludwig_types::{Karma, Timestamp};

/// One per Thread or Comment (§3). Shares a single table keyed by a
/// disambiguated `u64` (see [`crate::entity_ops::post_stats_key`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct PostStatsRecord {
    pub latest_comment: Timestamp,
    pub latest_comment_necro: Timestamp,
    pub descendant_count: u64,
    pub child_count: u64,
    pub upvotes: u64,
    pub downvotes: u64,
    pub karma: Karma,
}

impl PostStatsRecord {
    pub fn new(created_at: Timestamp) -> Self {
        Self {
            latest_comment: created_at,
            latest_comment_necro: created_at,
            descendant_count: 0,
            child_count: 0,
            upvotes: 0,
            downvotes: 0,
            karma: Karma::ZERO,
        }
    }

    /// Invariant: `karma = upvotes - downvotes` (testable property 3).
    pub fn karma_matches_votes(&self) -> bool {
        self.karma.0 == self.upvotes as i64 - self.downvotes as i64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct UserStatsRecord {
    pub thread_count: u64,
    pub comment_count: u64,
    pub thread_karma: i64,
    pub comment_karma: i64,
    pub latest_post_time: Timestamp,
    pub latest_post_id: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct BoardStatsRecord {
    pub thread_count: u64,
    pub comment_count: u64,
    pub latest_post_time: Timestamp,
    pub latest_post_id: u64,
    pub subscriber_count: u64,
}
