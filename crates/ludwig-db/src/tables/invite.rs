use bincode::{Decode, Encode};
use ludwig_types::{Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct InviteRecord {
    pub from_user: UserId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub to_user: Option<UserId>,
}

impl InviteRecord {
    pub fn is_usable(&self, now: Timestamp) -> bool {
        self.accepted_at.is_none() && now < self.expires_at
    }
}
