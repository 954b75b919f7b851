//! EcoMetrics core - data synchronization and persistence for the metrics
//! tracker.
//!
//! The application constructs one [`MetricsSource`] at startup and passes it
//! by reference to whatever needs data:
//!
//! - [`MetricsSource::Local`] wraps a [`DataManager`]: an in-memory mirror of
//!   the [`LocalCache`], seeded once by the [`Bootstrapper`].
//! - [`MetricsSource::Remote`] wraps a [`RemoteClient`] talking to the
//!   backend with the bearer token from the [`Session`].

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod manager;
pub mod models;
pub mod source;

pub use api::{ApiError, QueryParams, RemoteClient, SortOrder};
pub use auth::{Session, SessionData};
pub use bootstrap::{BootOutcome, Bootstrapper, SeedSource};
pub use cache::{DirStore, KeyValueStore, LocalCache, MemoryStore};
pub use config::{Config, Mode};
pub use error::DataError;
pub use export::{ExportFile, ExportFormat};
pub use manager::{DataManager, FilePicker, InitReport, PathPicker};
pub use models::{MetricRecord, Role, User, DEFAULT_ELECTRICITY_PRICE};
pub use source::{EntryRef, MetricsSource};
