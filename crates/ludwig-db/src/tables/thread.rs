use bincode::{Decode, Encode};
use ludwig_types::{BoardId, ModState, Timestamp, UserId};

use super::user::UserFederation;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ThreadRecord {
    pub author: UserId,
    pub board: BoardId,
    pub title: String,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub content_url: Option<String>,
    pub content_text: Option<String>,
    pub content_warning: Option<String>,
    pub federation: Option<UserFederation>,
    pub mod_state: Option<ModState>,
    pub mod_reason: Option<String>,
    /// Random per-post salt, used by the caller for media-blob addressing
    /// and to keep post ids from being guessable from media URLs alone.
    pub salt: u32,
}

impl ThreadRecord {
    /// Lowercased host component of `content_url`, if any and parseable,
    /// used as the key in `threads_by_domain`.
    pub fn url_domain(&self) -> Option<String> {
        let url = self.content_url.as_ref()?;
        let rest = url.split("://").nth(1).unwrap_or(url);
        let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
        if host.is_empty() {
            None
        } else {
            Some(host.to_lowercase())
        }
    }
}
