//! Layer 0: user records and time primitives.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dots granted per successful daily check-in.
pub const DAILY_REWARD: u32 = 10;

/// Dots granted per successful share claim.
pub const SHARE_REWARD: u32 = 20;

/// Stable external identity of a user (the chat account id).
///
/// Immutable once a record exists; uniqueness is enforced by the store.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Zero means "never". The zero-value convention is part of the wire/file
/// format, so this stays a plain integer rather than an `Option`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WallMillis(pub u64);

impl WallMillis {
    pub const NEVER: WallMillis = WallMillis(0);

    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn is_never(self) -> bool {
        self.0 == 0
    }
}

/// A single user's ledger row.
///
/// Field names are the wire/file format shared with the REST row store and
/// the snapshot file; renaming one breaks compatibility with existing rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub last_check_in: WallMillis,
    #[serde(default)]
    pub dots: u32,
    #[serde(default)]
    pub last_share_reward: WallMillis,
}

impl UserRecord {
    /// Fresh record: zero dots, never claimed.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            last_check_in: WallMillis::NEVER,
            dots: 0,
            last_share_reward: WallMillis::NEVER,
        }
    }

    /// Merge two copies of the same record.
    ///
    /// Every mutable field is monotone (dots only grow, timestamps only move
    /// forward), so field-wise max is a proper join: commutative, idempotent,
    /// and it never loses a granted reward. Username prefers whichever side
    /// is non-empty, left-biased.
    pub fn join(a: &UserRecord, b: &UserRecord) -> UserRecord {
        debug_assert_eq!(a.id, b.id);
        UserRecord {
            id: a.id,
            username: if a.username.is_empty() {
                b.username.clone()
            } else {
                a.username.clone()
            },
            last_check_in: a.last_check_in.max(b.last_check_in),
            dots: a.dots.max(b.dots),
            last_share_reward: a.last_share_reward.max(b.last_share_reward),
        }
    }
}
