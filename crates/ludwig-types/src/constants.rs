/// Entity ids below this threshold are reserved for well-known feed
/// pseudo-ids (`FEED_ALL`, `FEED_LOCAL`, `FEED_HOME`); the monotonic id
/// counter starts allocating real entity ids at this value.
pub const ID_MIN_USER: u64 = 16;

/// The "All" feed: every thread on the instance, federated or local.
pub const FEED_ALL: u64 = 1;
/// The "Local" feed: threads authored on this instance only.
pub const FEED_LOCAL: u64 = 2;
/// The "Home" feed: threads from boards the requesting user subscribes to.
pub const FEED_HOME: u64 = 3;

/// A reply older than this, relative to its ancestor's `created_at`, does not
/// advance that ancestor's Active-rank timestamp ("necro" reply).
pub const ACTIVE_COMMENT_MAX_AGE_SECS: u64 = 2 * 24 * 3600;

/// Exponent in the Hot/Active rank denominator.
pub const RANK_GRAVITY: f64 = 1.8;

/// PBKDF2-HMAC-SHA256 iteration count for local-user password hashing, per
/// the OWASP password storage cheat sheet recommendation current at the time
/// this was specified.
pub const PASSWORD_HASH_ITERATIONS: u32 = 600_000;

pub const PASSWORD_HASH_LEN: usize = 32;
pub const PASSWORD_SALT_LEN: usize = 16;

/// Maximum thread title length in bytes.
pub const THREAD_TITLE_MAX_BYTES: usize = 1024;
/// Maximum thread content-url length in bytes.
pub const THREAD_URL_MAX_BYTES: usize = 2048;

/// Every Nth session creation triggers an opportunistic sweep of the session
/// table for expired entries, performed in the same write transaction.
pub const SESSION_CLEANUP_SAMPLING_RATE: u64 = 256;

/// Default session lifetime (§8 S1: "expires_at = now + 1 day").
pub const SESSION_TTL_DEFAULT_SECS: u64 = 24 * 3600;
/// Session lifetime when the caller asked to be remembered (§8 S1:
/// "now + 1 month if remember=true"). Callers pick between this and
/// [`SESSION_TTL_DEFAULT_SECS`] and pass the chosen value to
/// `Database::create_session`; the core does not interpret the `remember`
/// flag itself, since "a month" is a calendar concept the caller's
/// locale/timezone handling owns, not the storage core.
pub const SESSION_TTL_REMEMBER_SECS: u64 = 30 * 24 * 3600;
