use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use services::{AccountService, SyncService};

use crate::inflight::InFlight;
use crate::metrics::Metrics;

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub accounts: Arc<AccountService>,
    pub in_flight: InFlight,
    pub metrics: Arc<Metrics>,
    pub display_tz: Tz,
    /// Upper bound on one tail-sync request before it is cancelled.
    pub backfill_timeout: Duration,
}

impl AppState {
    pub fn new(sync: Arc<SyncService>, accounts: Arc<AccountService>) -> Self {
        Self {
            sync,
            accounts,
            in_flight: InFlight::new(),
            metrics: Arc::new(Metrics::new()),
            display_tz: Tz::UTC,
            backfill_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_display_tz(mut self, tz: Tz) -> Self {
        self.display_tz = tz;
        self
    }

    pub fn with_backfill_timeout(mut self, timeout: Duration) -> Self {
        self.backfill_timeout = timeout;
        self
    }
}
