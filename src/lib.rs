#![forbid(unsafe_code)]

pub mod bot;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod persist;
pub mod server;
pub mod telemetry;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    DAILY_REWARD, SHARE_REWARD, UserId, UserRecord, UserStore, WallMillis, WindowRule,
};
pub use crate::ledger::{ClaimOutcome, Ledger};
