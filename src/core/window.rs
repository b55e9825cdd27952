//! Claim-window eligibility rules.
//!
//! Two interchangeable rules govern when a reward may be claimed again:
//!
//! - `FixedReset`: one reset instant per calendar day at a fixed hour in a
//!   fixed UTC offset (canonically 01:00 UTC+1). The reset instant is the
//!   same for every user. This is the canonical rule.
//! - `Rolling`: a claim is allowed once a fixed span has elapsed since the
//!   last one. Kept as an alternate configuration.
//!
//! Both are pure functions of `(now, last)` so tests can inject clock values.

use crate::core::WallMillis;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// Eligibility rule for one reward type's claim window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowRule {
    /// Daily reset at `reset_hour` o'clock in the `utc_offset_hours` frame.
    FixedReset {
        reset_hour: u8,
        utc_offset_hours: i8,
    },
    /// Claim allowed once `hours` have elapsed since the last claim.
    Rolling { hours: u64 },
}

impl WindowRule {
    /// Canonical production rule: reset at 01:00 UTC+1.
    pub fn fixed_default() -> Self {
        WindowRule::FixedReset {
            reset_hour: 1,
            utc_offset_hours: 1,
        }
    }

    /// True if a claim last made at `last` may be made again at `now`.
    pub fn may_claim(&self, now: WallMillis, last: WallMillis) -> bool {
        if last.is_never() {
            return true;
        }
        match *self {
            WindowRule::FixedReset {
                reset_hour,
                utc_offset_hours,
            } => {
                let reset = reset_instant(now, reset_hour, utc_offset_hours);
                (last.0 as i64) < reset
            }
            WindowRule::Rolling { hours } => {
                now.0.saturating_sub(last.0) >= hours * HOUR_MS as u64
            }
        }
    }
}

/// Most recent reset instant at or before `now`, in UTC milliseconds.
///
/// Computed in the shifted frame: the reset is `reset_hour` o'clock of the
/// shifted day containing `now`, or of the previous shifted day when `now`
/// has not reached that hour yet.
fn reset_instant(now: WallMillis, reset_hour: u8, utc_offset_hours: i8) -> i64 {
    let offset_ms = i64::from(utc_offset_hours) * HOUR_MS;
    let shifted = now.0 as i64 + offset_ms;
    let day_start = shifted - shifted.rem_euclid(DAY_MS);
    let mut reset_shifted = day_start + i64::from(reset_hour) * HOUR_MS;
    if shifted < reset_shifted {
        reset_shifted -= DAY_MS;
    }
    reset_shifted - offset_ms
}
