//! The date-keyed metric record and the validation applied to every
//! collection that crosses a parse boundary (seed file, local storage,
//! imported files, API responses).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Price used when no record carries one.
pub const DEFAULT_ELECTRICITY_PRICE: f64 = 25.0;

/// One day of power and water usage plus the electricity price in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    /// Backend-assigned identifier. Absent for locally cached records.
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    pub date: NaiveDate,
    /// kWh
    pub power_consumption: f64,
    /// Liters
    pub drinking_water: f64,
    /// Liters
    pub irrigation_water: f64,
    /// KZT per kWh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electricity_price: Option<f64>,
}

impl MetricRecord {
    pub fn new(
        date: NaiveDate,
        power_consumption: f64,
        drinking_water: f64,
        irrigation_water: f64,
        electricity_price: Option<f64>,
    ) -> Self {
        Self {
            id: None,
            date,
            power_consumption,
            drinking_water,
            irrigation_water,
            electricity_price,
        }
    }

    /// Check the numeric constraints of a record.
    pub fn validate(&self) -> Result<(), String> {
        let quantities = [
            ("powerConsumption", self.power_consumption),
            ("drinkingWater", self.drinking_water),
            ("irrigationWater", self.irrigation_water),
        ];
        for (field, value) in quantities {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", field, value));
            }
        }
        if let Some(price) = self.electricity_price {
            if !is_valid_price(price) {
                return Err(format!("electricityPrice must be positive, got {}", price));
            }
        }
        Ok(())
    }
}

/// Accept both string and numeric ids, normalizing to a string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid format: data should be an array of records")]
    NotASequence,

    #[error("Invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

/// Parse a JSON document into a validated, date-ordered collection.
pub fn parse_records(text: &str) -> Result<Vec<MetricRecord>, PayloadError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    records_from_value(value)
}

/// Validate an already-decoded JSON value as a record collection.
///
/// The result is sorted by date with duplicate dates collapsed
/// (the later occurrence wins).
pub fn records_from_value(value: serde_json::Value) -> Result<Vec<MetricRecord>, PayloadError> {
    Ok(normalize(decode_records(value)?))
}

/// Decode and validate every element of a JSON array, keeping its order.
pub fn decode_records(value: serde_json::Value) -> Result<Vec<MetricRecord>, PayloadError> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        _ => return Err(PayloadError::NotASequence),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let record: MetricRecord = serde_json::from_value(item)
            .map_err(|e| PayloadError::InvalidRecord { index, reason: e.to_string() })?;
        record
            .validate()
            .map_err(|reason| PayloadError::InvalidRecord { index, reason })?;
        records.push(record);
    }
    Ok(records)
}

/// Decode a stored collection, keeping every element that decodes and
/// validates. Fails only when the document is not a JSON array; rejected
/// elements are returned alongside the normalized records.
pub fn salvage_records(
    text: &str,
) -> Result<(Vec<MetricRecord>, Vec<PayloadError>), PayloadError> {
    let items = match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Array(items) => items,
        _ => return Err(PayloadError::NotASequence),
    };

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let record = serde_json::from_value::<MetricRecord>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| record.validate().map(|()| record));
        match record {
            Ok(record) => records.push(record),
            Err(reason) => rejected.push(PayloadError::InvalidRecord { index, reason }),
        }
    }
    Ok((normalize(records), rejected))
}

/// Sort ascending by date and keep one record per date.
pub fn normalize(mut records: Vec<MetricRecord>) -> Vec<MetricRecord> {
    // Stable sort keeps input order among equal dates, so the last one wins below
    sort_by_date(&mut records);
    let mut out: Vec<MetricRecord> = Vec::with_capacity(records.len());
    for record in records {
        match out.last_mut() {
            Some(last) if last.date == record.date => *last = record,
            _ => out.push(record),
        }
    }
    out
}

pub fn sort_by_date(records: &mut [MetricRecord]) {
    records.sort_by(|a, b| a.date.cmp(&b.date));
}

/// Price of the chronologically last record, or the default.
pub fn latest_price(records: &[MetricRecord]) -> f64 {
    records
        .last()
        .and_then(|r| r.electricity_price)
        .unwrap_or(DEFAULT_ELECTRICITY_PRICE)
}

pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Render a price the way it is persisted: always with a decimal point.
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{:.1}", price)
    } else {
        price.to_string()
    }
}
