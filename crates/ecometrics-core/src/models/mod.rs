//! Data models for EcoMetrics entities.
//!
//! - `MetricRecord`: one day of power/water usage and the electricity price
//! - `User`, `Role`: the authenticated account as reported by the backend

pub mod record;
pub mod user;

pub use record::{
    decode_records, format_price, is_valid_price, latest_price, normalize, parse_records,
    records_from_value, salvage_records, sort_by_date, MetricRecord, PayloadError,
    DEFAULT_ELECTRICITY_PRICE,
};
pub use user::{Role, User};
