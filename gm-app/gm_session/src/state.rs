//! Per-wallet cache partition.
//!
//! Every key is suffixed with the wallet address so that switching accounts
//! never leaks points or GM timestamps across wallets.

use chrono::{DateTime, SecondsFormat, Utc};
use shared_types::Address;

use crate::error::StoreError;
use crate::store::KeyValueStore;

const POINTS_KEY: &str = "gm-points";
const LAST_GM_KEY: &str = "gm-last-time";

/// View of the cache scoped to one wallet.
pub struct WalletCache<'a, S: ?Sized> {
    store: &'a mut S,
    owner: Address,
}

impl<'a, S: KeyValueStore + ?Sized> WalletCache<'a, S> {
    pub fn new(store: &'a mut S, owner: Address) -> Self {
        WalletCache { store, owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn key(&self, base: &str) -> String {
        format!("{base}-{}", self.owner)
    }

    /// Last mirrored on-chain points, `None` before the first read.
    pub fn points(&self) -> Result<Option<u64>, StoreError> {
        let key = self.key(POINTS_KEY);
        match self.store.get(&key)? {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Corrupt { key, value }),
        }
    }

    pub fn set_points(&mut self, points: u64) -> Result<(), StoreError> {
        let key = self.key(POINTS_KEY);
        self.store.set(&key, points.to_string())
    }

    /// Time of the most recent confirmed GM.
    pub fn last_gm(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = self.key(LAST_GM_KEY);
        match self.store.get(&key)? {
            None => Ok(None),
            Some(value) => DateTime::parse_from_rfc3339(&value)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| StoreError::Corrupt { key, value }),
        }
    }

    pub fn set_last_gm(&mut self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = self.key(LAST_GM_KEY);
        self.store
            .set(&key, at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn clear_last_gm(&mut self) -> Result<(), StoreError> {
        let key = self.key(LAST_GM_KEY);
        self.store.remove(&key)
    }

    /// Apply the lazy day rollover and return the surviving timestamp.
    pub fn rollover(&mut self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, StoreError> {
        let cached = self.last_gm()?;
        let kept = daily_gate::rollover(now, cached);
        if cached.is_some() && kept.is_none() {
            self.clear_last_gm()?;
        }
        Ok(kept)
    }

    /// Drop everything cached for this wallet.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        let points = self.key(POINTS_KEY);
        self.store.remove(&points)?;
        self.clear_last_gm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn wallet(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn partitions_do_not_leak() {
        let mut store = MemoryStore::new();
        WalletCache::new(&mut store, wallet(1)).set_points(9).unwrap();
        assert_eq!(WalletCache::new(&mut store, wallet(2)).points().unwrap(), None);
        assert_eq!(WalletCache::new(&mut store, wallet(1)).points().unwrap(), Some(9));
    }

    #[test]
    fn keys_use_the_checksummed_address() {
        let mut store = MemoryStore::new();
        let owner: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        WalletCache::new(&mut store, owner)
            .set_last_gm(at("2024-01-01T10:00:00Z"))
            .unwrap();
        let key = "gm-last-time-0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        assert_eq!(
            store.get(&key).unwrap().as_deref(),
            Some("2024-01-01T10:00:00.000Z")
        );
    }

    #[test]
    fn rollover_clears_stale_entry_once() {
        let mut store = MemoryStore::new();
        let mut cache = WalletCache::new(&mut store, wallet(3));
        cache.set_last_gm(at("2024-01-01T23:59:00Z")).unwrap();
        assert_eq!(cache.rollover(at("2024-01-02T00:00:01Z")).unwrap(), None);
        assert_eq!(cache.last_gm().unwrap(), None);
        assert_eq!(cache.rollover(at("2024-01-02T00:00:01Z")).unwrap(), None);
    }

    #[test]
    fn corrupt_values_are_reported() {
        let mut store = MemoryStore::new();
        let key = format!("gm-points-{}", wallet(4));
        store.set(&key, "lots".into()).unwrap();
        let cache = WalletCache::new(&mut store, wallet(4));
        assert!(matches!(cache.points(), Err(StoreError::Corrupt { .. })));
    }
}
