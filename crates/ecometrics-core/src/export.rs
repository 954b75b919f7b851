//! Rendering record collections as downloadable JSON or CSV files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDate};

use crate::models::MetricRecord;

const CSV_HEADER: &str =
    "Date,Power Consumption (kWh),Drinking Water (L),Irrigation Water (L),Electricity Price (KZT/kWh)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("Unsupported export format: {}", other)),
        }
    }
}

/// A rendered export, ready to be written wherever the caller saves downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: &'static str,
    pub contents: String,
}

impl ExportFile {
    pub fn new(format: ExportFormat, filename: Option<&str>, contents: String) -> Self {
        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => default_filename(format, Local::now().date_naive()),
        };
        Self {
            filename,
            mime_type: format.mime_type(),
            contents,
        }
    }

    /// Write the file into `dir`, returning the full path.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

/// `ecoMetrics_<YYYY-MM-DD>.<ext>`
pub fn default_filename(format: ExportFormat, date: NaiveDate) -> String {
    format!("ecoMetrics_{}.{}", date.format("%Y-%m-%d"), format.extension())
}

pub fn render(format: ExportFormat, records: &[MetricRecord]) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(records),
        ExportFormat::Csv => Ok(to_csv(records)),
    }
}

/// CSV with a fixed header row. An empty collection renders as an empty string.
pub fn to_csv(records: &[MetricRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(CSV_HEADER.to_string());
    for r in records {
        let price = r.electricity_price.map(|p| p.to_string()).unwrap_or_default();
        rows.push(format!(
            "{},{},{},{},{}",
            r.date, r.power_consumption, r.drinking_water, r.irrigation_water, price
        ));
    }
    rows.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_records;

    fn sample() -> Vec<MetricRecord> {
        vec![
            MetricRecord::new("2024-01-01".parse().expect("date"), 10.0, 5.5, 2.0, Some(30.0)),
            MetricRecord::new("2024-01-02".parse().expect("date"), 12.25, 6.0, 0.0, None),
        ]
    }

    #[test]
    fn test_csv_layout() {
        let csv = to_csv(&sample());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "2024-01-01,10,5.5,2,30");
        assert_eq!(lines[2], "2024-01-02,12.25,6,0,");
        assert!(to_csv(&[]).is_empty());
    }

    #[test]
    fn test_json_export_reimports() {
        let records = sample();
        let json = render(ExportFormat::Json, &records).expect("serializable");
        assert!(json.contains("\n  {"), "pretty printed");
        assert_eq!(parse_records(&json).expect("reimport"), records);
    }

    #[test]
    fn test_filenames() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        assert_eq!(default_filename(ExportFormat::Csv, date), "ecoMetrics_2024-03-09.csv");

        let named = ExportFile::new(ExportFormat::Json, Some("mine.json"), String::new());
        assert_eq!(named.filename, "mine.json");
        assert_eq!(named.mime_type, "application/json");

        let unnamed = ExportFile::new(ExportFormat::Json, Some("  "), String::new());
        assert!(unnamed.filename.starts_with("ecoMetrics_"));
        assert!(unnamed.filename.ends_with(".json"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
