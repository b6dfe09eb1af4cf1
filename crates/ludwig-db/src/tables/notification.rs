use bincode::{Decode, Encode};
use ludwig_types::{NotificationType, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct NotificationRecord {
    pub user: UserId,
    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub kind: NotificationType,
    /// Thread or comment id the notification refers to.
    pub subject: u64,
}
