use bincode::{Decode, Encode};
use ludwig_types::{ModState, Timestamp, UserId};

use super::user::UserFederation;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BoardRecord {
    pub name: String,
    pub display_name: Option<String>,
    pub icon_url: Option<String>,
    pub banner_url: Option<String>,
    pub description: Option<String>,
    pub content_warning: Option<String>,
    pub created_at: Timestamp,
    pub restricted_posting: bool,
    pub can_upvote: bool,
    pub can_downvote: bool,
    pub approve_subscribe: bool,
    pub federation: Option<UserFederation>,
    pub mod_state: Option<ModState>,
    pub mod_reason: Option<String>,
}

/// Extension record present only for local (this-instance) boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct LocalBoardRecord {
    pub owner: UserId,
    pub private: bool,
    pub federated: bool,
}
