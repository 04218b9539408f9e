//! Points synchronizer.
//!
//! Mirrors a fresh on-chain points read into the wallet cache. A strict
//! increase over the previously cached value is the only external evidence
//! that a GM landed when the receipt event was missed, so it doubles as an
//! implicit confirmation.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::state::WalletCache;
use crate::store::KeyValueStore;

/// Result of mirroring one read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Cached value before this read; `None` on the first read for a wallet.
    pub previous: Option<u64>,
    pub current: u64,
    /// Set when the read was taken as proof of a landed GM.
    pub implicit_confirmation: Option<DateTime<Utc>>,
}

impl SyncOutcome {
    pub fn increased(&self) -> bool {
        matches!(self.previous, Some(prev) if self.current > prev)
    }

    pub fn decreased(&self) -> bool {
        matches!(self.previous, Some(prev) if self.current < prev)
    }
}

/// Overwrite the cached points with `fresh`.
///
/// The first read for a wallet only establishes a baseline and never stamps
/// a GM time, even when non-zero.
pub fn sync_points<S: KeyValueStore + ?Sized>(
    cache: &mut WalletCache<'_, S>,
    fresh: u64,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, StoreError> {
    let previous = cache.points()?;
    cache.set_points(fresh)?;

    let mut outcome = SyncOutcome {
        previous,
        current: fresh,
        implicit_confirmation: None,
    };
    if outcome.increased() {
        cache.set_last_gm(now)?;
        outcome.implicit_confirmation = Some(now);
    }
    Ok(outcome)
}

/// Explicit confirmation path used when a receipt arrives.
pub fn record_confirmation<S: KeyValueStore + ?Sized>(
    cache: &mut WalletCache<'_, S>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    cache.set_last_gm(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared_types::Address;

    const OWNER: Address = Address::new([7; 20]);

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-02T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn first_read_is_baseline_only() {
        let mut store = MemoryStore::new();
        let mut cache = WalletCache::new(&mut store, OWNER);
        let outcome = sync_points(&mut cache, 5, now()).unwrap();
        assert_eq!(outcome.previous, None);
        assert!(!outcome.increased());
        assert_eq!(outcome.implicit_confirmation, None);
        assert_eq!(cache.points().unwrap(), Some(5));
        assert_eq!(cache.last_gm().unwrap(), None);
    }

    #[test]
    fn increase_stamps_gm_time() {
        let mut store = MemoryStore::new();
        let mut cache = WalletCache::new(&mut store, OWNER);
        sync_points(&mut cache, 5, now()).unwrap();
        let outcome = sync_points(&mut cache, 6, now()).unwrap();
        assert_eq!(outcome.implicit_confirmation, Some(now()));
        assert_eq!(cache.last_gm().unwrap(), Some(now()));
    }

    #[test]
    fn equal_or_lower_read_leaves_gm_time_alone() {
        let mut store = MemoryStore::new();
        let mut cache = WalletCache::new(&mut store, OWNER);
        sync_points(&mut cache, 5, now()).unwrap();
        assert_eq!(sync_points(&mut cache, 5, now()).unwrap().implicit_confirmation, None);

        let lower = sync_points(&mut cache, 3, now()).unwrap();
        assert!(lower.decreased());
        assert_eq!(lower.implicit_confirmation, None);
        assert_eq!(cache.points().unwrap(), Some(3));
        assert_eq!(cache.last_gm().unwrap(), None);
    }

    #[test]
    fn zero_baseline_then_first_gm() {
        let mut store = MemoryStore::new();
        let mut cache = WalletCache::new(&mut store, OWNER);
        sync_points(&mut cache, 0, now()).unwrap();
        assert!(sync_points(&mut cache, 1, now()).unwrap().increased());
    }
}
