use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
///
/// Encoded as a plain `u64` so that two timestamps compare in byte-lex order
/// exactly as they compare numerically -- required for every index keyed on
/// `created_at`/`latest_comment`/etc (see the codec invariant in
/// `ludwig-db`'s key codec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, bincode::Encode, bincode::Decode)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub const fn as_secs(self) -> u64 {
        self.0
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        Self(secs)
    }

    /// Saturating `self + seconds`.
    pub fn saturating_add_secs(self, seconds: u64) -> Self {
        Self(self.0.saturating_add(seconds))
    }

    /// Whole hours elapsed between `self` (the earlier timestamp) and `at`.
    ///
    /// Saturates to zero if `at` is before `self` (a post observed "in the
    /// past" relative to its own creation time, which a clamped clock can
    /// produce -- treated as age zero rather than panicking).
    pub fn age_hours_at(self, at: Timestamp) -> u64 {
        at.0.saturating_sub(self.0) / 3600
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
