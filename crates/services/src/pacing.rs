//! Courtesy delays between remote page fetches during a backfill.

use std::time::Duration;

use async_trait::async_trait;

/// Decides how long the backfill loop waits before requesting the next page.
#[async_trait]
pub trait PacingPolicy: Send + Sync {
    async fn pause(&self);
}

/// Sleeps for the same interval after every page.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval(pub Duration);

impl FixedInterval {
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self(Duration::from_secs(2))
    }
}

#[async_trait]
impl PacingPolicy for FixedInterval {
    async fn pause(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}
