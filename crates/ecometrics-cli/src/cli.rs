use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use ecometrics_core::{Config, EntryRef, ExportFormat, MetricRecord, Mode};

#[derive(Debug, Parser)]
#[command(name = "ecometrics", version, about = "Track power, water and electricity price metrics")]
pub struct Cli {
    /// Talk to the backend instead of the local cache
    #[arg(long, global = true)]
    pub remote: bool,

    /// Backend base URL, e.g. http://localhost:3000/api
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Directory holding the local cache and session
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seed dataset (file path or URL) used on first run
    #[arg(long, global = true, value_name = "SOURCE")]
    pub seed: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Flags win over the config file and the environment.
    pub fn apply_to(&self, config: &mut Config) {
        if self.remote {
            config.mode = Mode::Remote;
        }
        if let Some(ref url) = self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(ref seed) = self.seed {
            config.seed = Some(seed.clone());
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Seed the local cache if needed and report what happened
    Init,
    /// List records, oldest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
        /// Newest first
        #[arg(long)]
        desc: bool,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a record, replacing any record with the same date
    Save(RecordArgs),
    /// Replace a record (local: list position, remote: record id)
    Update {
        target: EntryRef,
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Delete a record (local: list position, remote: record id)
    Delete { target: EntryRef },
    /// Delete every record
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Import records from a JSON file
    Import {
        path: PathBuf,
        /// Merge into existing data instead of replacing it (always on for remote)
        #[arg(long)]
        merge: bool,
        /// When merging, replace records whose date already exists
        #[arg(long)]
        overwrite: bool,
    },
    /// Export records as JSON or CSV
    Export {
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
        /// File name; defaults to ecoMetrics_<date>.<ext>
        #[arg(short = 'o', long)]
        filename: Option<String>,
        /// Directory to write into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Show the electricity price, or set it (local only)
    Price { value: Option<f64> },
    /// Show the backend operation log (admin only)
    Logs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Log in to the backend
    Login { username: Option<String> },
    /// Log out and forget the stored session
    Logout,
    /// Show configuration, session and raw cache state
    Status,
    /// Re-run first-time seeding, or wipe the local cache with --purge
    Reset {
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Record date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Power consumption in kWh
    #[arg(long)]
    pub power: f64,
    /// Drinking water in liters
    #[arg(long)]
    pub drinking: f64,
    /// Irrigation water in liters
    #[arg(long)]
    pub irrigation: f64,
    /// Electricity price in KZT/kWh
    #[arg(long)]
    pub price: Option<f64>,
}

impl RecordArgs {
    pub fn into_record(self) -> MetricRecord {
        MetricRecord::new(
            self.date.unwrap_or_else(|| Local::now().date_naive()),
            self.power,
            self.drinking,
            self.irrigation,
            self.price,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "ecometrics",
            "--remote",
            "--api-url",
            "https://metrics.test/api",
            "list",
            "--limit",
            "5",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(config.mode, Mode::Remote);
        assert_eq!(config.api_base_url, "https://metrics.test/api");
        assert!(matches!(cli.command, Command::List { limit: Some(5), desc: false, .. }));
    }

    #[test]
    fn test_update_parses_target_and_record() {
        let cli = Cli::parse_from([
            "ecometrics",
            "update",
            "2",
            "--date",
            "2024-01-02",
            "--power",
            "10",
            "--drinking",
            "5",
            "--irrigation",
            "2",
        ]);
        let Command::Update { target, record } = cli.command else {
            panic!("expected update");
        };
        assert_eq!(target, EntryRef::Index(2));
        let record = record.into_record();
        assert_eq!(record.date.to_string(), "2024-01-02");
        assert_eq!(record.electricity_price, None);
    }

    #[test]
    fn test_export_format_is_validated() {
        assert!(Cli::try_parse_from(["ecometrics", "export", "--format", "xml"]).is_err());
        let cli = Cli::try_parse_from(["ecometrics", "export", "-f", "csv"]).expect("valid");
        assert!(matches!(cli.command, Command::Export { format: ExportFormat::Csv, .. }));
    }
}
