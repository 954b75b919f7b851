//! REST API client module for the EcoMetrics backend.
//!
//! `RemoteClient` mirrors the local data manager's operations, but every
//! call is an HTTP round trip to the authoritative store.
//!
//! The API uses JWT bearer token authentication obtained through
//! the `/auth/login` endpoint.

pub mod client;
pub mod error;

pub use client::{QueryParams, RemoteClient, SortOrder, DEFAULT_API_BASE_URL};
pub use error::ApiError;
