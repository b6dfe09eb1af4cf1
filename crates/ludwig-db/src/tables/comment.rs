use bincode::{Decode, Encode};
use ludwig_types::{CommentId, ModState, ThreadId, Timestamp, UserId};

use super::user::UserFederation;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CommentRecord {
    pub author: UserId,
    /// The root thread ancestor. Denormalized (every comment carries it
    /// directly) so board-scoped comment indexes don't need an ancestor
    /// walk at read time.
    pub thread: ThreadId,
    /// Immediate parent: either the thread's id (top-level comment) or
    /// another comment's id.
    pub parent: u64,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub content: String,
    pub content_warning: Option<String>,
    pub federation: Option<UserFederation>,
    pub mod_state: Option<ModState>,
    pub mod_reason: Option<String>,
    pub salt: u32,
}

impl CommentRecord {
    /// `true` if this comment's immediate parent is the thread itself
    /// (a top-level reply) rather than another comment.
    pub fn is_top_level(&self) -> bool {
        self.parent == self.thread.get()
    }

    pub fn parent_comment(&self) -> Option<CommentId> {
        (!self.is_top_level()).then_some(CommentId(self.parent))
    }
}
