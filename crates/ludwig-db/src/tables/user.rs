use bincode::{Decode, Encode};
use ludwig_types::{InviteId, ModState, Timestamp};

/// Federation fields present on a non-local (remote) user, or absent for a
/// local user of this instance.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct UserFederation {
    pub instance_host: String,
    pub actor_url: String,
    pub inbox_url: String,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct UserRecord {
    pub name: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub bio: Option<String>,
    pub bot: bool,
    pub created_at: Timestamp,
    pub federation: Option<UserFederation>,
    pub deleted_at: Option<Timestamp>,
    pub mod_state: Option<ModState>,
    pub mod_reason: Option<String>,
}

impl UserRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_local(&self) -> bool {
        self.federation.is_none()
    }
}

/// Extension record present only for local (this-instance) users.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LocalUserRecord {
    pub email: Option<String>,
    pub password_hash: [u8; 32],
    pub password_salt: [u8; 16],
    pub approved: bool,
    pub admin: bool,
    /// Opaque preference bitfield (e.g. show-nsfw, open-links-in-new-tab);
    /// the core does not interpret individual bits.
    pub preferences: u32,
    pub invite_id: Option<InviteId>,
}
