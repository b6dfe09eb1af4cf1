use ludwig_types::ValidationError;
use snafu::{Location, Snafu};
use tokio::task::JoinError;

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Requested id or unique key does not exist.
    #[snafu(display("not found: {what}"))]
    NotFound {
        what: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Violation of a uniqueness constraint (duplicate username/email/board
    /// name).
    #[snafu(display("conflict: {what}"))]
    Conflict {
        what: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// Malformed payload: length bounds, invalid name, empty content, etc.
    #[snafu(transparent)]
    InvalidArgument {
        source: ValidationError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Caller lacks the capability for this mutation. The storage core does
    /// not enforce authorization policy itself; this variant exists so
    /// operations that need to expose "you are not the author/an admin" can
    /// do so uniformly, for a policy layer above the core to interpret.
    #[snafu(display("permission denied: {what}"))]
    PermissionDenied {
        what: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// A stored payload failed validation on read. Always escalated, never
    /// silently skipped (unlike a stale index entry, which is logged and
    /// skipped -- see `index_ops`).
    #[snafu(display("corrupt data: {what}"))]
    CorruptData {
        what: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// An internal invariant was violated (e.g. "post_stats missing for
    /// existing thread"). Indicates a bug in this crate, not a caller error.
    #[snafu(display("invariant violated: {what}"))]
    Invariant {
        what: String,
        #[snafu(implicit)]
        location: Location,
    },

    Overflow,
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DbError::NotFound {
            what: what.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        DbError::Conflict {
            what: what.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn corrupt(what: impl Into<String>) -> Self {
        DbError::CorruptData {
            what: what.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }

    pub fn invariant(what: impl Into<String>) -> Self {
        DbError::Invariant {
            what: what.into(),
            location: snafu::Location::new(file!(), line!(), column!()),
        }
    }
}
