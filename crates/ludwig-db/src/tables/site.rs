use bincode::{Decode, Encode};

/// Site-wide aggregate counters, incrementally maintained by the stats
/// rollup engine. Stored once under the `site_stats` table key `()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct SiteStatsRecord {
    pub user_count: u64,
    pub board_count: u64,
    pub thread_count: u64,
    pub comment_count: u64,
}

/// String constants naming every reserved key in the `settings` table (§6).
pub mod setting_keys {
    pub const NEXT_ID: &str = "next_id";
    pub const HASH_SEED: &str = "hash_seed";
    pub const JWT_SECRET: &str = "jwt_secret";
    pub const PUBLIC_KEY: &str = "public_key";
    pub const PRIVATE_KEY: &str = "private_key";
    pub const BASE_URL: &str = "base_url";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const ICON_URL: &str = "icon_url";
    pub const BANNER_URL: &str = "banner_url";
    pub const POST_MAX_LENGTH: &str = "post_max_length";
    pub const HOME_PAGE_TYPE: &str = "home_page_type";
    pub const VOTES_ENABLED: &str = "votes_enabled";
    pub const DOWNVOTES_ENABLED: &str = "downvotes_enabled";
    pub const CWS_ENABLED: &str = "cws_enabled";
    pub const BOARD_CREATION_ADMIN_ONLY: &str = "board_creation_admin_only";
    pub const REGISTRATION_ENABLED: &str = "registration_enabled";
    pub const REGISTRATION_APPLICATION_REQUIRED: &str = "registration_application_required";
    pub const REGISTRATION_INVITE_REQUIRED: &str = "registration_invite_required";
    pub const INVITE_ADMIN_ONLY: &str = "invite_admin_only";
    pub const APPLICATION_QUESTION: &str = "application_question";
    pub const SETUP_DONE: &str = "setup_done";
    /// Packed id array: `bincode`-encoded `Vec<u64>` of admin user ids.
    pub const ADMINS: &str = "admins";
    pub const SITE_STATS: &str = "site_stats";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const INFINITE_SCROLL_ENABLED: &str = "infinite_scroll_enabled";
    pub const JAVASCRIPT_ENABLED: &str = "javascript_enabled";
    pub const COLOR_ACCENT: &str = "color_accent";
    pub const COLOR_ACCENT_DIM: &str = "color_accent_dim";
    pub const COLOR_ACCENT_HOVER: &str = "color_accent_hover";
}

/// Cached, read-mostly snapshot of site configuration plus stats, swapped
/// atomically on `SiteUpdate` events (§5, §4.8). Not itself a stored table --
/// assembled from `settings` + `site_stats` and held behind an `ArcSwap` by
/// [`crate::events::SiteDetailCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDetail {
    pub name: String,
    pub description: Option<String>,
    pub base_url: String,
    pub votes_enabled: bool,
    pub downvotes_enabled: bool,
    pub cws_enabled: bool,
    pub board_creation_admin_only: bool,
    pub registration_enabled: bool,
    pub setup_done: bool,
    pub stats: SiteStatsRecord,
}
