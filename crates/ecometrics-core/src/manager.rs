//! The offline-first data manager.
//!
//! `DataManager` keeps an in-memory mirror of the record collection and the
//! current electricity price, seeded from the local cache at startup. Every
//! mutation is written through to the cache before it returns, and the
//! mirror is kept sorted by date.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::bootstrap::{BootOutcome, Bootstrapper};
use crate::cache::{KeyValueStore, LocalCache};
use crate::error::DataError;
use crate::export::{self, ExportFile, ExportFormat};
use crate::models::{
    is_valid_price, latest_price, normalize, parse_records, sort_by_date, MetricRecord,
    DEFAULT_ELECTRICITY_PRICE,
};

/// Host capability for choosing a file to import.
///
/// `Ok(None)` means the user cancelled, which is not an error.
pub trait FilePicker {
    fn pick(&self) -> std::io::Result<Option<String>>;
}

/// Picks a fixed path. `None` behaves like a cancelled dialog.
pub struct PathPicker(pub Option<PathBuf>);

impl FilePicker for PathPicker {
    fn pick(&self) -> std::io::Result<Option<String>> {
        match self.0 {
            Some(ref path) => std::fs::read_to_string(path).map(Some),
            None => Ok(None),
        }
    }
}

/// Summary of an `initialize` run.
#[derive(Debug, Clone, PartialEq)]
pub struct InitReport {
    pub outcome: BootOutcome,
    /// The boot flag was set but the stored collection was missing or corrupt.
    pub repaired: bool,
    pub records: usize,
    pub price: f64,
}

pub struct DataManager<S: KeyValueStore> {
    cache: LocalCache<S>,
    bootstrap: Bootstrapper,
    records: Vec<MetricRecord>,
    price: f64,
}

impl<S: KeyValueStore> DataManager<S> {
    pub fn new(cache: LocalCache<S>, bootstrap: Bootstrapper) -> Self {
        Self {
            cache,
            bootstrap,
            records: Vec::new(),
            price: DEFAULT_ELECTRICITY_PRICE,
        }
    }

    pub fn cache(&self) -> &LocalCache<S> {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seed the cache if needed and load it into memory. Never fails.
    pub async fn initialize(&mut self) -> InitReport {
        let repaired = self.cache.is_initialized() && !self.cache.has_valid_records();
        if repaired {
            warn!("Boot flag set but stored records are missing or corrupt, re-seeding");
            self.cache.reset_initialization();
        }

        let outcome = self.bootstrap.run(&self.cache).await;

        self.records = self.cache.load_records();
        self.price = self.cache.get_price();
        info!(records = self.records.len(), price = self.price, "Data manager initialized");

        InitReport {
            outcome,
            repaired,
            records: self.records.len(),
            price: self.price,
        }
    }

    /// Drop the boot flag and run a full initialization again.
    pub async fn force_reinitialize(&mut self) -> InitReport {
        info!("Forcing re-initialization");
        self.cache.reset_initialization();
        self.initialize().await
    }

    /// A copy of the collection, sorted by date.
    pub fn get_data(&self) -> Vec<MetricRecord> {
        self.records.clone()
    }

    /// Insert or replace the record for `record.date`.
    pub fn save_entry(&mut self, record: MetricRecord) -> Result<bool, DataError> {
        record.validate().map_err(DataError::InvalidRecord)?;
        let price = record.electricity_price;

        match self.records.iter().position(|r| r.date == record.date) {
            Some(index) => {
                debug!(date = %record.date, "Replacing existing entry");
                self.records[index] = record;
            }
            None => {
                debug!(date = %record.date, "Adding new entry");
                self.records.push(record);
            }
        }
        sort_by_date(&mut self.records);

        let saved = self.cache.save_records(&self.records);
        if let Some(price) = price {
            self.price = price;
            self.cache.set_price(price);
        }
        Ok(saved)
    }

    /// Replace the record at `index`. Out of range leaves everything as is.
    pub fn update_entry(&mut self, index: usize, record: MetricRecord) -> Result<bool, DataError> {
        record.validate().map_err(DataError::InvalidRecord)?;
        if index >= self.records.len() {
            debug!(index, len = self.records.len(), "Update index out of range");
            return Ok(false);
        }

        let date = record.date;
        self.records[index] = record;
        // The new date may collide with another entry; keep the updated one
        let mut position = 0;
        self.records.retain(|r| {
            let keep = position == index || r.date != date;
            position += 1;
            keep
        });
        sort_by_date(&mut self.records);

        Ok(self.cache.save_records(&self.records))
    }

    pub fn delete_entry(&mut self, index: usize) -> bool {
        if index >= self.records.len() {
            debug!(index, len = self.records.len(), "Delete index out of range");
            return false;
        }
        let removed = self.records.remove(index);
        debug!(date = %removed.date, "Deleted entry");
        self.cache.save_records(&self.records)
    }

    /// Empty the collection and reset the price. Requires `confirm`.
    pub fn clear_all_data(&mut self, confirm: bool) -> Result<bool, DataError> {
        if !confirm {
            return Err(DataError::ConfirmationRequired);
        }
        info!(records = self.records.len(), "Clearing all data");
        self.records.clear();
        self.price = DEFAULT_ELECTRICITY_PRICE;
        Ok(self.cache.clear_all())
    }

    /// Replace the collection with the contents of a user-chosen file.
    ///
    /// Returns `Ok(false)` when the picker is cancelled and an error when the
    /// file is not a valid record array.
    pub fn import_from_file(&mut self, picker: &dyn FilePicker) -> Result<bool, DataError> {
        let Some(text) = picker.pick()? else {
            info!("Import cancelled");
            return Ok(false);
        };
        let records = parse_records(&text)?;
        info!(records = records.len(), "Importing records from file");
        Ok(self.replace_all(records))
    }

    /// Merge records into the collection. Dates already present are replaced
    /// only when `overwrite_existing` is set.
    pub fn import_records(
        &mut self,
        records: Vec<MetricRecord>,
        overwrite_existing: bool,
    ) -> Result<bool, DataError> {
        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|reason| DataError::InvalidRecord(format!("index {}: {}", index, reason)))?;
        }

        let mut merged = self.records.clone();
        for record in normalize(records) {
            match merged.iter().position(|r| r.date == record.date) {
                Some(index) if overwrite_existing => merged[index] = record,
                Some(_) => {}
                None => merged.push(record),
            }
        }
        Ok(self.replace_all(normalize(merged)))
    }

    fn replace_all(&mut self, records: Vec<MetricRecord>) -> bool {
        self.records = records;
        self.price = latest_price(&self.records);
        let saved = self.cache.save_records(&self.records);
        let price_saved = self.cache.set_price(self.price);
        saved && price_saved
    }

    pub fn export_data(
        &self,
        format: ExportFormat,
        filename: Option<&str>,
    ) -> Result<ExportFile, DataError> {
        let contents = export::render(format, &self.records)?;
        Ok(ExportFile::new(format, filename, contents))
    }

    pub fn get_electricity_price(&self) -> f64 {
        self.price
    }

    pub fn set_electricity_price(&mut self, price: f64) -> Result<bool, DataError> {
        if !is_valid_price(price) {
            return Err(DataError::InvalidPrice(price));
        }
        self.price = price;
        Ok(self.cache.set_price(price))
    }
}
