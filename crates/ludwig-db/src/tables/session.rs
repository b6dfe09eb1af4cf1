use bincode::{Decode, Encode};
use ludwig_types::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SessionRecord {
    pub user: UserId,
    pub client_ip: String,
    pub user_agent: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub remember: bool,
}

impl SessionRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}
