//! At most one backfill per account at a time.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::AccountKey;

#[derive(Clone, Default)]
pub struct InFlight {
    running: Arc<DashMap<AccountKey, ()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `key`, or `None` if another pass holds it.
    pub fn try_acquire(&self, key: &AccountKey) -> Option<InFlightSlot> {
        match self.running.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightSlot {
                    running: Arc::clone(&self.running),
                    key: key.clone(),
                })
            }
        }
    }

    pub fn is_running(&self, key: &AccountKey) -> bool {
        self.running.contains_key(key)
    }
}

/// Releases the account's slot when dropped, whether the pass finished,
/// failed or was abandoned.
pub struct InFlightSlot {
    running: Arc<DashMap<AccountKey, ()>>,
    key: AccountKey,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let in_flight = InFlight::new();
        let alice = AccountKey::new("1", "example.social");
        let bob = AccountKey::new("2", "example.social");

        let slot = in_flight.try_acquire(&alice).unwrap();
        assert!(in_flight.try_acquire(&alice).is_none());
        assert!(in_flight.try_acquire(&bob).is_some());
        assert!(in_flight.is_running(&alice));

        drop(slot);
        assert!(!in_flight.is_running(&alice));
        assert!(in_flight.try_acquire(&alice).is_some());
    }
}
