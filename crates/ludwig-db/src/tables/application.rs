use bincode::{Decode, Encode};
use ludwig_types::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ApplicationRecord {
    pub ip: String,
    pub user_agent: String,
    pub text: String,
    pub user: UserId,
    pub created_at: Timestamp,
    pub approved_at: Option<Timestamp>,
}
