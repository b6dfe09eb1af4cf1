use bincode::{Decode, Encode};

/// Cached preview of an external URL, keyed by the (lowercased) url string.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LinkCardRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}
