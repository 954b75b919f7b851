//! First-run seeding of the local cache.
//!
//! The seed is a static JSON array of records, fetched once per data
//! directory. Whatever happens during seeding, the cache ends up initialized
//! with a present (possibly empty) record collection.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{KeyValueStore, LocalCache};
use crate::models::{latest_price, parse_records, DEFAULT_ELECTRICITY_PRICE};

/// Seed fetch timeout. The seed is a small static file.
const SEED_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Seed request failed with status {0}")]
    Status(u16),

    #[error("Seed request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("No seed source configured")]
    Unavailable,
}

/// Where the first-run dataset comes from.
#[derive(Debug, Clone)]
pub enum SeedSource {
    Http { client: Client, url: String },
    File(PathBuf),
    None,
}

impl SeedSource {
    pub fn http(url: impl Into<String>) -> Result<Self, SeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEED_TIMEOUT_SECS))
            .build()?;
        Ok(SeedSource::Http {
            client,
            url: url.into(),
        })
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        SeedSource::File(path.into())
    }

    async fn fetch(&self) -> Result<String, SeedError> {
        match self {
            SeedSource::Http { client, url } => {
                debug!(url = %url, "Fetching seed resource");
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SeedError::Status(status.as_u16()));
                }
                Ok(response.text().await?)
            }
            SeedSource::File(path) => {
                debug!(path = %path.display(), "Reading seed file");
                Ok(tokio::fs::read_to_string(path).await?)
            }
            SeedSource::None => Err(SeedError::Unavailable),
        }
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, PartialEq)]
pub enum BootOutcome {
    AlreadyInitialized { records: usize },
    Seeded { records: usize, price: f64 },
    FellBack { reason: String },
}

pub struct Bootstrapper {
    seed: SeedSource,
}

impl Bootstrapper {
    pub fn new(seed: SeedSource) -> Self {
        Self { seed }
    }

    /// Seed the cache unless it is already initialized. Never fails.
    pub async fn run<S: KeyValueStore>(&self, cache: &LocalCache<S>) -> BootOutcome {
        if cache.is_initialized() {
            let records = cache.load_records().len();
            debug!(records, "Local cache already initialized, skipping seed");
            return BootOutcome::AlreadyInitialized { records };
        }

        info!("Seeding local cache");
        let body = match self.seed.fetch().await {
            Ok(body) => body,
            Err(e) => return Self::fall_back(cache, e.to_string()),
        };

        let records = match parse_records(&body) {
            Ok(records) => records,
            Err(e) => return Self::fall_back(cache, format!("Malformed seed payload: {}", e)),
        };

        if !cache.save_records(&records) {
            return Self::fall_back(cache, "Failed to persist seed records".to_string());
        }
        let price = latest_price(&records);
        cache.set_price(price);
        cache.mark_initialized();

        if let (Some(first), Some(last)) = (records.first(), records.last()) {
            info!(records = records.len(), price, from = %first.date, to = %last.date, "Seeded local cache");
        } else {
            info!(price, "Seeded local cache with an empty dataset");
        }
        BootOutcome::Seeded {
            records: records.len(),
            price,
        }
    }

    fn fall_back<S: KeyValueStore>(cache: &LocalCache<S>, reason: String) -> BootOutcome {
        warn!(reason = %reason, "Seeding failed, initializing with empty data");
        cache.save_records(&[]);
        cache.set_price(DEFAULT_ELECTRICITY_PRICE);
        cache.mark_initialized();
        BootOutcome::FellBack { reason }
    }
}
