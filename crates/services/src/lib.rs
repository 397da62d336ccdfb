//! # services
//!
//! Application logic on top of the domain ports: the sync engine that mirrors
//! remote posts and the account service behind the HTTP surface.

pub mod accounts;
pub mod pacing;
pub mod sync;

pub use accounts::{validate_host, AccountService, ArchiveView, LoginOutcome, PublicProfile};
pub use pacing::{FixedInterval, PacingPolicy};
pub use sync::{HeadSync, SyncService, TailSync};
