//! # remote-adapters
//!
//! Clients for remote instances. The only implementation today speaks the
//! Mastodon REST API, which most ActivityPub servers also accept.

mod error;
pub mod mastodon;

pub use mastodon::{MastodonClient, MastodonConfig};
