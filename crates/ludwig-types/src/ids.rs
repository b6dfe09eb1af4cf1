/// Defines a newtype wrapping a `u64` entity id.
///
/// All ids in the store are allocated from a single monotonic counter (see
/// [`crate::ID_MIN_USER`]), so the wrapper intentionally carries no validity
/// invariant beyond "some id the counter produced at some point".
macro_rules! define_id_type {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            bincode::Encode, bincode::Decode,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(
    /// Id of a [`User`](crate) (or `LocalUser`).
    UserId
);
define_id_type!(
    /// Id of a Board.
    BoardId
);
define_id_type!(
    /// Id of a Thread. Also used as the "root" ancestor id for a Comment tree.
    ThreadId
);
define_id_type!(
    /// Id of a Comment.
    CommentId
);
define_id_type!(
    /// Id of a login Session. Allocated as a cryptographically random value,
    /// not from the monotonic id counter (see spec's Session entity).
    SessionId
);
define_id_type!(
    /// Id of a registration Invite.
    InviteId
);
define_id_type!(
    /// Id of a registration Application.
    ApplicationId
);
define_id_type!(
    /// Id of a Notification.
    NotificationId
);

/// Either a [`ThreadId`] or a [`CommentId`]: the two entities that carry
/// [`crate::Karma`], `PostStats`, and participate in ranked feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, bincode::Encode, bincode::Decode)]
pub enum PostId {
    Thread(ThreadId),
    Comment(CommentId),
}

impl PostId {
    pub fn as_u64(self) -> u64 {
        match self {
            PostId::Thread(id) => id.0,
            PostId::Comment(id) => id.0,
        }
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostId::Thread(id) => write!(f, "thread:{id}"),
            PostId::Comment(id) => write!(f, "comment:{id}"),
        }
    }
}
