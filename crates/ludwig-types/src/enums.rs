/// Moderation status of a post, board, or user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode, serde::Serialize, serde::Deserialize)]
pub enum ModState {
    Visible,
    Flagged,
    Locked,
    Removed,
}

impl Default for ModState {
    fn default() -> Self {
        ModState::Visible
    }
}

/// Registration policy for new local users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode, serde::Serialize, serde::Deserialize)]
pub enum RegistrationMode {
    Open,
    RequireApplication,
    RequireInvite,
    Closed,
}

/// Which pseudo-board a logged-out or default view lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode, serde::Serialize, serde::Deserialize)]
pub enum HomePageType {
    Local,
    All,
    Subscribed,
}

/// Why a [`crate::NotificationId`] was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode, serde::Serialize, serde::Deserialize)]
pub enum NotificationType {
    ReplyToThread,
    ReplyToComment,
    MentionInThread,
    MentionInComment,
}

/// A user's vote on a post. `NoVote` is never stored -- membership in the
/// upvote or downvote set *is* the vote; its absence from both is `NoVote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteValue {
    Downvote,
    #[default]
    NoVote,
    Upvote,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Downvote => -1,
            VoteValue::NoVote => 0,
            VoteValue::Upvote => 1,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            -1 => Some(VoteValue::Downvote),
            0 => Some(VoteValue::NoVote),
            1 => Some(VoteValue::Upvote),
            _ => None,
        }
    }
}

/// Which ranking mode a ranked feed request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    Hot,
    Active,
    New,
    NewComments,
    Top,
    MostComments,
}

/// Sort direction for the non-ranked (plain timestamp/count) list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDirection {
    Ascending,
    Descending,
}
