//! Ledger core: data model, claim windows, in-memory store.
//!
//! Module order follows type dependency order: user records and time
//! primitives first, then the eligibility rules over them, then the store.

mod store;
mod user;
mod window;

pub use store::UserStore;
pub use user::{DAILY_REWARD, SHARE_REWARD, UserId, UserRecord, WallMillis};
pub use window::WindowRule;
