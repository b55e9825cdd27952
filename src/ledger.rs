//! The ledger service: balance queries and claim operations.
//!
//! Composes the in-memory store, the claim-window rule, and the durable
//! backend. The store mutex makes each claim's read-check-write atomic;
//! backend I/O happens after the lock is released. A persistence failure
//! never rolls back an in-memory claim: it is logged and reported through
//! the `persisted` flag.

use std::sync::Arc;

use crate::core::{
    DAILY_REWARD, SHARE_REWARD, UserId, UserRecord, UserStore, WallMillis, WindowRule,
};
use crate::persist::Backend;

/// Result of a claim attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Balance after the attempt (unchanged when `claimed` is false).
    pub dots: u32,
    /// Whether the reward was granted.
    pub claimed: bool,
    /// Whether the durable backend accepted the save. True for an
    /// ineligible claim, since there was nothing to persist.
    pub persisted: bool,
}

#[derive(Clone, Copy, Debug)]
enum ClaimKind {
    Daily,
    Share,
}

impl ClaimKind {
    fn reward(self) -> u32 {
        match self {
            ClaimKind::Daily => DAILY_REWARD,
            ClaimKind::Share => SHARE_REWARD,
        }
    }

    fn last_claim(self, record: &UserRecord) -> WallMillis {
        match self {
            ClaimKind::Daily => record.last_check_in,
            ClaimKind::Share => record.last_share_reward,
        }
    }

    fn stamp(self, record: &mut UserRecord, now: WallMillis) {
        match self {
            ClaimKind::Daily => record.last_check_in = now,
            ClaimKind::Share => record.last_share_reward = now,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ClaimKind::Daily => "daily",
            ClaimKind::Share => "share",
        }
    }
}

pub struct Ledger {
    store: UserStore,
    backend: Arc<dyn Backend>,
    rule: WindowRule,
}

impl Ledger {
    pub fn new(rule: WindowRule, backend: Arc<dyn Backend>) -> Self {
        Self {
            store: UserStore::new(),
            backend,
            rule,
        }
    }

    /// Populate the store from the durable backend. Returns the user count.
    pub fn load(&self) -> Result<usize, crate::persist::PersistError> {
        let records = self.backend.load()?;
        let count = records.len();
        self.store.load_all(records);
        Ok(count)
    }

    /// Current balance; 0 for an unknown user. Creates nothing, never fails.
    pub fn balance(&self, id: UserId) -> u32 {
        self.store.get(id).map(|r| r.dots).unwrap_or(0)
    }

    /// Full record for `id`, if one exists.
    pub fn user(&self, id: UserId) -> Option<UserRecord> {
        self.store.get(id)
    }

    pub fn claim_daily(&self, id: UserId, username: &str) -> ClaimOutcome {
        self.claim(id, username, ClaimKind::Daily, WallMillis::now())
    }

    pub fn claim_share(&self, id: UserId, username: &str) -> ClaimOutcome {
        self.claim(id, username, ClaimKind::Share, WallMillis::now())
    }

    /// `claim_daily` with an explicit clock reading, for tests.
    pub fn claim_daily_at(&self, id: UserId, username: &str, now: WallMillis) -> ClaimOutcome {
        self.claim(id, username, ClaimKind::Daily, now)
    }

    /// `claim_share` with an explicit clock reading, for tests.
    pub fn claim_share_at(&self, id: UserId, username: &str, now: WallMillis) -> ClaimOutcome {
        self.claim(id, username, ClaimKind::Share, now)
    }

    fn claim(&self, id: UserId, username: &str, kind: ClaimKind, now: WallMillis) -> ClaimOutcome {
        // Read-check-write under the store lock; no I/O inside.
        let (record, all, claimed) = self.store.with_record(id, username, |record| {
            if !self.rule.may_claim(now, kind.last_claim(record)) {
                return false;
            }
            record.dots += kind.reward();
            kind.stamp(record, now);
            true
        });

        if !claimed {
            return ClaimOutcome {
                dots: record.dots,
                claimed: false,
                persisted: true,
            };
        }

        let persisted = match self.backend.save(&record, &all) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user = %id,
                    kind = kind.as_str(),
                    backend = self.backend.name(),
                    transience = ?e.transience(),
                    "claim not persisted, in-memory state stays authoritative: {e}"
                );
                false
            }
        };

        tracing::debug!(user = %id, kind = kind.as_str(), dots = record.dots, "claim granted");
        ClaimOutcome {
            dots: record.dots,
            claimed: true,
            persisted,
        }
    }
}
