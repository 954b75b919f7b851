use tracing::{debug, error, warn};

use crate::models::{format_price, salvage_records, MetricRecord, DEFAULT_ELECTRICITY_PRICE};

use super::store::KeyValueStore;

/// Key holding the JSON array of records.
pub const RECORDS_KEY: &str = "ecoMetricsData";

/// Key holding the stringified current electricity price.
pub const PRICE_KEY: &str = "ecoMetricsElectricityPrice";

/// Key holding `"true"` once first-run seeding has completed.
pub const INITIALIZED_KEY: &str = "ecoMetricsInitialized";

const INITIALIZED_VALUE: &str = "true";

/// Raw values of the three cache keys, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageSnapshot {
    pub initialized: Option<String>,
    pub records: Option<String>,
    pub price: Option<String>,
}

impl StorageSnapshot {
    /// Number of entries in the stored collection, if it parses as an array.
    pub fn record_count(&self) -> Option<usize> {
        let raw = self.records.as_deref()?;
        serde_json::from_str::<Vec<serde_json::Value>>(raw)
            .ok()
            .map(|items| items.len())
    }
}

/// Local cache of the record collection, the current price, and the boot flag.
///
/// No operation here returns an error: storage failures are logged and
/// reported as `false` or as the default value.
pub struct LocalCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                error!(key, error = %e, "Failed to read from storage");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> bool {
        match self.store.set_item(key, value) {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "Failed to write to storage");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.read(INITIALIZED_KEY).as_deref() == Some(INITIALIZED_VALUE)
    }

    pub fn mark_initialized(&self) -> bool {
        self.write(INITIALIZED_KEY, INITIALIZED_VALUE)
    }

    /// Clear the boot flag so the next bootstrap re-seeds.
    pub fn reset_initialization(&self) {
        if let Err(e) = self.store.remove_item(INITIALIZED_KEY) {
            error!(error = %e, "Failed to clear initialization flag");
        }
    }

    /// True when the collection key is present and holds a JSON array.
    /// An empty array counts as present; invalid elements are dropped on load.
    pub fn has_valid_records(&self) -> bool {
        match self.read(RECORDS_KEY) {
            Some(raw) => salvage_records(&raw).is_ok(),
            None => false,
        }
    }

    /// Stored records, sorted by date. Elements that fail validation are
    /// skipped; an unreadable collection yields an empty one.
    pub fn load_records(&self) -> Vec<MetricRecord> {
        let Some(raw) = self.read(RECORDS_KEY) else {
            return Vec::new();
        };
        match salvage_records(&raw) {
            Ok((records, rejected)) => {
                for e in &rejected {
                    warn!(error = %e, "Dropping invalid stored record");
                }
                records
            }
            Err(e) => {
                warn!(error = %e, "Stored records are unreadable, using empty collection");
                Vec::new()
            }
        }
    }

    pub fn save_records(&self, records: &[MetricRecord]) -> bool {
        let json = match serde_json::to_string(records) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize records");
                return false;
            }
        };
        let saved = self.write(RECORDS_KEY, &json);
        if saved {
            debug!(count = records.len(), "Records persisted");
        }
        saved
    }

    pub fn get_price(&self) -> f64 {
        self.read(PRICE_KEY)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|price| price.is_finite() && *price > 0.0)
            .unwrap_or(DEFAULT_ELECTRICITY_PRICE)
    }

    pub fn set_price(&self, price: f64) -> bool {
        self.write(PRICE_KEY, &format_price(price))
    }

    /// Reset records and price to their defaults. The boot flag is kept.
    pub fn clear_all(&self) -> bool {
        let records = self.save_records(&[]);
        let price = self.set_price(DEFAULT_ELECTRICITY_PRICE);
        records && price
    }

    /// Remove all three keys.
    pub fn purge(&self) {
        for key in [RECORDS_KEY, PRICE_KEY, INITIALIZED_KEY] {
            if let Err(e) = self.store.remove_item(key) {
                error!(key, error = %e, "Failed to remove key");
            }
        }
    }

    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot {
            initialized: self.read(INITIALIZED_KEY),
            records: self.read(RECORDS_KEY),
            price: self.read(PRICE_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    fn record(date: &str, price: Option<f64>) -> MetricRecord {
        MetricRecord::new(date.parse().expect("valid test date"), 1.0, 2.0, 3.0, price)
    }

    #[test]
    fn test_initialization_flag() {
        let cache = LocalCache::new(MemoryStore::new());
        assert!(!cache.is_initialized());
        assert!(cache.mark_initialized());
        assert!(cache.is_initialized());
        cache.reset_initialization();
        assert!(!cache.is_initialized());
    }

    #[test]
    fn test_load_records_tolerates_garbage() {
        let cache = LocalCache::new(MemoryStore::new());
        assert!(cache.load_records().is_empty());

        cache.store().set_item(RECORDS_KEY, "{not json").expect("write");
        assert!(cache.load_records().is_empty());
        assert!(!cache.has_valid_records());
    }

    #[test]
    fn test_load_records_skips_invalid_elements() {
        let cache = LocalCache::new(MemoryStore::new());
        cache
            .store()
            .set_item(
                RECORDS_KEY,
                r#"[
                    {"date":"2024-01-01","powerConsumption":1,"drinkingWater":2,"irrigationWater":3},
                    {"date":"2024-01-02","powerConsumption":-1,"drinkingWater":2,"irrigationWater":3},
                    {"date":"2024-01-03","powerConsumption":1,"drinkingWater":2,"irrigationWater":3}
                ]"#,
            )
            .expect("write");

        assert!(cache.has_valid_records());
        let dates: Vec<String> = cache.load_records().iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-03"]);
    }

    #[test]
    fn test_save_and_load_records() {
        let cache = LocalCache::new(MemoryStore::new());
        let records = vec![record("2024-01-01", Some(20.0)), record("2024-01-02", None)];
        assert!(cache.save_records(&records));
        assert_eq!(cache.load_records(), records);
        assert!(cache.has_valid_records());

        assert!(cache.save_records(&[]));
        assert!(cache.has_valid_records());
    }

    #[test]
    fn test_save_records_reports_quota_failure() {
        let cache = LocalCache::new(MemoryStore::with_quota(32));
        let records: Vec<_> = (1..=9)
            .map(|d| record(&format!("2024-01-0{}", d), Some(20.0)))
            .collect();
        assert!(!cache.save_records(&records));
        assert!(cache.load_records().is_empty());
    }

    #[test]
    fn test_price_fallbacks() {
        let cache = LocalCache::new(MemoryStore::new());
        assert_eq!(cache.get_price(), DEFAULT_ELECTRICITY_PRICE);

        cache.store().set_item(PRICE_KEY, "abc").expect("write");
        assert_eq!(cache.get_price(), DEFAULT_ELECTRICITY_PRICE);

        assert!(cache.set_price(31.5));
        assert_eq!(cache.get_price(), 31.5);
        assert_eq!(cache.snapshot().price.as_deref(), Some("31.5"));
    }

    #[test]
    fn test_clear_all_keeps_boot_flag() {
        let cache = LocalCache::new(MemoryStore::new());
        cache.mark_initialized();
        cache.save_records(&[record("2024-01-01", Some(40.0))]);
        cache.set_price(40.0);

        assert!(cache.clear_all());
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.records.as_deref(), Some("[]"));
        assert_eq!(snapshot.price.as_deref(), Some("25.0"));
        assert!(cache.is_initialized());
    }

    #[test]
    fn test_purge_removes_everything() {
        let cache = LocalCache::new(MemoryStore::new());
        cache.mark_initialized();
        cache.clear_all();
        cache.purge();
        assert_eq!(cache.snapshot(), StorageSnapshot::default());
    }
}
