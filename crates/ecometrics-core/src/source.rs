//! One interface over the two ways of reaching the data.
//!
//! `MetricsSource::Local` runs against the on-disk cache through
//! [`DataManager`]; `MetricsSource::Remote` forwards every operation to the
//! backend through [`RemoteClient`]. The variant is chosen once, at
//! construction, from the configured mode.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiError, QueryParams, RemoteClient, SortOrder};
use crate::auth::Session;
use crate::bootstrap::Bootstrapper;
use crate::cache::{DirStore, KeyValueStore, LocalCache};
use crate::config::{Config, Mode};
use crate::error::DataError;
use crate::export::{ExportFile, ExportFormat};
use crate::manager::{DataManager, InitReport};
use crate::models::MetricRecord;

/// Identifies the record an update or delete applies to.
///
/// Local collections are addressed by position; the backend by record id.
/// An all-digit reference parses as `Index` and names a numeric id remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRef {
    Index(usize),
    Id(String),
}

impl EntryRef {
    /// The backend record id this reference names.
    pub fn remote_id(&self) -> String {
        match self {
            EntryRef::Index(index) => index.to_string(),
            EntryRef::Id(id) => id.clone(),
        }
    }
}

impl FromStr for EntryRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(index) => EntryRef::Index(index),
            Err(_) => EntryRef::Id(s.to_string()),
        })
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryRef::Index(index) => write!(f, "#{}", index),
            EntryRef::Id(id) => write!(f, "{}", id),
        }
    }
}

pub enum MetricsSource<S: KeyValueStore = DirStore> {
    Local(DataManager<S>),
    Remote(RemoteClient),
}

impl MetricsSource<DirStore> {
    /// Build the source selected by `config.mode`.
    ///
    /// The remote variant picks up the session token when one is valid.
    pub fn from_config(config: &Config, session: &Session) -> Result<Self> {
        match config.mode {
            Mode::Local => {
                let dir = config.data_dir()?;
                let store = DirStore::new(dir.clone())
                    .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
                let seed = config.seed_source()?;
                debug!(dir = %store.dir().display(), ?seed, "Using local data source");
                Ok(MetricsSource::Local(DataManager::new(
                    LocalCache::new(store),
                    Bootstrapper::new(seed),
                )))
            }
            Mode::Remote => {
                let mut client = RemoteClient::new(
                    config.api_base_url.clone(),
                    Duration::from_secs(config.request_timeout_secs),
                )
                .context("Failed to create API client")?;
                if let Some(token) = session.token() {
                    client.set_token(token.to_string());
                }
                debug!(base_url = %client.base_url(), authenticated = client.has_token(), "Using remote data source");
                Ok(MetricsSource::Remote(client))
            }
        }
    }
}

impl<S: KeyValueStore> MetricsSource<S> {
    pub fn backend_name(&self) -> &'static str {
        match self {
            MetricsSource::Local(_) => "local",
            MetricsSource::Remote(_) => "remote",
        }
    }

    fn unsupported(&self, operation: impl Into<String>) -> DataError {
        unsupported(self.backend_name(), operation)
    }

    /// Local: bootstrap and load the cache. Remote: nothing to prepare.
    pub async fn initialize(&mut self) -> Option<InitReport> {
        match self {
            MetricsSource::Local(manager) => Some(manager.initialize().await),
            MetricsSource::Remote(_) => {
                info!("Remote data source ready");
                None
            }
        }
    }

    /// Records matching `params`. The local variant honors limit and sort
    /// order on the date field; other filters apply only on the backend.
    pub async fn get_data(&self, params: &QueryParams) -> Result<Vec<MetricRecord>, DataError> {
        match self {
            MetricsSource::Local(manager) => {
                let mut records = manager.get_data();
                if params.sort_order == Some(SortOrder::Desc) {
                    records.reverse();
                }
                if let Some(limit) = params.limit {
                    records.truncate(limit);
                }
                Ok(records)
            }
            MetricsSource::Remote(client) => Ok(client.get_data(params).await?),
        }
    }

    pub async fn save_entry(&mut self, record: MetricRecord) -> Result<bool, DataError> {
        match self {
            MetricsSource::Local(manager) => manager.save_entry(record),
            MetricsSource::Remote(client) => {
                record.validate().map_err(DataError::InvalidRecord)?;
                Ok(client.save_entry(&record).await?)
            }
        }
    }

    pub async fn update_entry(
        &mut self,
        target: &EntryRef,
        record: MetricRecord,
    ) -> Result<bool, DataError> {
        let backend = self.backend_name();
        match (self, target) {
            (MetricsSource::Local(manager), EntryRef::Index(index)) => {
                manager.update_entry(*index, record)
            }
            (MetricsSource::Remote(client), target) => {
                record.validate().map_err(DataError::InvalidRecord)?;
                Ok(client.update_entry(&target.remote_id(), &record).await?)
            }
            (MetricsSource::Local(_), target) => {
                Err(unsupported(backend, format!("update by {:?}", target)))
            }
        }
    }

    pub async fn delete_entry(&mut self, target: &EntryRef) -> Result<bool, DataError> {
        let backend = self.backend_name();
        match (self, target) {
            (MetricsSource::Local(manager), EntryRef::Index(index)) => {
                Ok(manager.delete_entry(*index))
            }
            (MetricsSource::Remote(client), target) => {
                Ok(client.delete_entry(&target.remote_id()).await?)
            }
            (MetricsSource::Local(_), target) => {
                Err(unsupported(backend, format!("delete by {:?}", target)))
            }
        }
    }

    /// Both variants refuse to clear without `confirm`.
    pub async fn clear_all_data(&mut self, confirm: bool) -> Result<bool, DataError> {
        match self {
            MetricsSource::Local(manager) => manager.clear_all_data(confirm),
            MetricsSource::Remote(client) => match client.clear_all_data(confirm).await {
                Err(ApiError::ConfirmationRequired) => Err(DataError::ConfirmationRequired),
                other => Ok(other?),
            },
        }
    }

    pub async fn import_records(
        &mut self,
        records: Vec<MetricRecord>,
        overwrite_existing: bool,
    ) -> Result<bool, DataError> {
        match self {
            MetricsSource::Local(manager) => manager.import_records(records, overwrite_existing),
            MetricsSource::Remote(client) => {
                for (index, record) in records.iter().enumerate() {
                    record.validate().map_err(|reason| {
                        DataError::InvalidRecord(format!("index {}: {}", index, reason))
                    })?;
                }
                Ok(client.import_data(&records, overwrite_existing).await?)
            }
        }
    }

    pub async fn export_data(
        &self,
        format: ExportFormat,
        filename: Option<&str>,
        params: &QueryParams,
    ) -> Result<ExportFile, DataError> {
        match self {
            MetricsSource::Local(manager) => manager.export_data(format, filename),
            MetricsSource::Remote(client) => Ok(client.export_data(format, filename, params).await?),
        }
    }

    pub async fn get_electricity_price(&self) -> f64 {
        match self {
            MetricsSource::Local(manager) => manager.get_electricity_price(),
            MetricsSource::Remote(client) => client.get_electricity_price().await,
        }
    }

    pub fn set_electricity_price(&mut self, price: f64) -> Result<bool, DataError> {
        match self {
            MetricsSource::Local(manager) => manager.set_electricity_price(price),
            MetricsSource::Remote(_) => Err(self.unsupported("set electricity price")),
        }
    }

    pub async fn get_logs(&self, params: &QueryParams) -> Result<Value, DataError> {
        match self {
            MetricsSource::Local(_) => Err(self.unsupported("operation logs")),
            MetricsSource::Remote(client) => Ok(client.get_logs(params).await?),
        }
    }
}

fn unsupported(backend: &'static str, operation: impl Into<String>) -> DataError {
    DataError::Unsupported {
        backend,
        operation: operation.into(),
    }
}
