use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use ecometrics_core::models::parse_records;
use ecometrics_core::{
    BootOutcome, Config, DataError, InitReport, MetricRecord, MetricsSource, PathPicker,
    QueryParams, RemoteClient, Session, SortOrder,
};
use tracing::{info, warn};

use crate::cli::Command;

/// Adds a login hint to authentication failures.
fn auth_hint(e: DataError) -> anyhow::Error {
    if e.is_auth_error() {
        anyhow::Error::new(e).context("Authentication required, run `ecometrics login`")
    } else {
        e.into()
    }
}

fn remote_client(config: &Config) -> Result<RemoteClient> {
    RemoteClient::new(
        config.api_base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create API client")
}

// ===== Session commands =====

pub async fn login(config: &Config, session: &mut Session, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt_username()?,
    };
    if username.is_empty() {
        anyhow::bail!("Username required");
    }
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;

    let mut client = remote_client(config)?;
    let data = client
        .login(&username, &password)
        .await
        .context("Login failed")?;
    let role = data.user.role;
    session.update(data);
    session.save().context("Failed to save session")?;

    // Persist only the username, not env or flag overrides
    let mut stored = Config::load()?;
    stored.last_username = Some(username.clone());
    if let Err(e) = stored.save() {
        warn!(error = %e, "Failed to save config");
    }

    info!(username = %username, "Logged in");
    println!("Logged in as {} ({:?})", username, role);
    Ok(())
}

pub async fn logout(config: &Config, session: &mut Session) -> Result<()> {
    if let Some(token) = session.token() {
        let mut client = remote_client(config)?.with_token(token.to_string());
        client.logout().await;
    }
    session.clear().context("Failed to remove session")?;
    println!("Logged out");
    Ok(())
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

// ===== Data commands =====

pub async fn run(
    command: Command,
    source: &mut MetricsSource,
    config: &Config,
    session: &Session,
) -> Result<()> {
    match command {
        Command::Status => return status(source, config, session),
        Command::Reset { purge } => return reset(source, purge).await,
        _ => {}
    }

    let report = source.initialize().await;

    match command {
        Command::Init => match report {
            Some(report) => print_init_report(&report),
            None => println!("Remote mode, nothing to initialize"),
        },
        Command::List { limit, desc, json } => {
            let mut params = QueryParams::new().sort_by("date");
            if desc {
                params = params.sort_order(SortOrder::Desc);
            }
            if let Some(limit) = limit {
                params = params.limit(limit);
            }
            let records = source.get_data(&params).await.map_err(auth_hint)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let total = local_len(source);
                print_records(&records, |i| match total {
                    Some(total) if desc => total - 1 - i,
                    _ => i,
                });
            }
        }
        Command::Save(args) => {
            let record = args.into_record();
            let date = record.date;
            let saved = source.save_entry(record).await.map_err(auth_hint)?;
            report_write(saved, &format!("Saved record for {}", date));
        }
        Command::Update { target, record } => {
            let updated = source
                .update_entry(&target, record.into_record())
                .await
                .map_err(auth_hint)?;
            report_write(updated, &format!("Updated record {}", target));
        }
        Command::Delete { target } => {
            let deleted = source.delete_entry(&target).await.map_err(auth_hint)?;
            report_write(deleted, &format!("Deleted record {}", target));
        }
        Command::Clear { yes } => {
            let cleared = source.clear_all_data(yes).await.map_err(|e| match e {
                DataError::ConfirmationRequired => {
                    anyhow::anyhow!("Refusing to delete all records without --yes")
                }
                other => auth_hint(other),
            })?;
            report_write(cleared, "All records deleted");
        }
        Command::Import {
            path,
            merge,
            overwrite,
        } => {
            let imported = match (merge, &mut *source) {
                (false, MetricsSource::Local(manager)) => manager
                    .import_from_file(&PathPicker(Some(path.clone())))
                    .with_context(|| format!("Failed to import {}", path.display()))?,
                _ => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let records = parse_records(&text)
                        .with_context(|| format!("Failed to import {}", path.display()))?;
                    source
                        .import_records(records, overwrite)
                        .await
                        .map_err(auth_hint)?
                }
            };
            report_write(imported, &format!("Imported {}", path.display()));
        }
        Command::Export {
            format,
            filename,
            dir,
        } => {
            let params = QueryParams::new().sort_by("date").sort_order(SortOrder::Asc);
            let file = source
                .export_data(format, filename.as_deref(), &params)
                .await
                .map_err(auth_hint)?;
            let written = file
                .write_to(&dir)
                .with_context(|| format!("Failed to write export to {}", dir.display()))?;
            println!("Exported to {}", written.display());
        }
        Command::Price { value: None } => {
            println!("{:.2} KZT/kWh", source.get_electricity_price().await);
        }
        Command::Price { value: Some(price) } => {
            let saved = source.set_electricity_price(price)?;
            report_write(saved, &format!("Electricity price set to {:.2} KZT/kWh", price));
        }
        Command::Logs { limit } => {
            let logs = source
                .get_logs(&QueryParams::new().limit(limit))
                .await
                .map_err(auth_hint)?;
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
        Command::Status | Command::Reset { .. } | Command::Login { .. } | Command::Logout => {}
    }
    Ok(())
}

fn status(source: &MetricsSource, config: &Config, session: &Session) -> Result<()> {
    println!("Mode:         {}", config.mode);
    println!("Data dir:     {}", config.data_dir()?.display());
    println!("API base URL: {}", config.api_base_url);

    match session.current_user() {
        Some(user) => {
            let expires = session
                .data
                .as_ref()
                .map(|d| d.expires_at().format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default();
            println!("Session:      {} ({:?}), expires {}", user.username, user.role, expires);
        }
        None => println!("Session:      not logged in"),
    }

    if let MetricsSource::Local(manager) = source {
        let snapshot = manager.cache().snapshot();
        println!(
            "Initialized:  {}",
            snapshot.initialized.as_deref().unwrap_or("(unset)")
        );
        match snapshot.record_count() {
            Some(count) => println!("Records:      {}", count),
            None if snapshot.records.is_some() => println!("Records:      (unreadable)"),
            None => println!("Records:      (unset)"),
        }
        println!("Price:        {}", snapshot.price.as_deref().unwrap_or("(unset)"));
    }
    Ok(())
}

async fn reset(source: &mut MetricsSource, purge: bool) -> Result<()> {
    let MetricsSource::Local(manager) = source else {
        anyhow::bail!("Reset applies to the local cache only");
    };
    if purge {
        manager.cache().purge();
        println!("Local cache purged; it will be re-seeded on next use");
    } else {
        let report = manager.force_reinitialize().await;
        print_init_report(&report);
    }
    Ok(())
}

// ===== Output =====

fn local_len(source: &MetricsSource) -> Option<usize> {
    match source {
        MetricsSource::Local(manager) => Some(manager.len()),
        MetricsSource::Remote(_) => None,
    }
}

fn print_init_report(report: &InitReport) {
    if report.repaired {
        println!("Stored records were unreadable and have been reset");
    }
    match &report.outcome {
        BootOutcome::AlreadyInitialized { records } => {
            println!("Already initialized with {} records", records)
        }
        BootOutcome::Seeded { records, price } => {
            println!("Seeded {} records, electricity price {:.2}", records, price)
        }
        BootOutcome::FellBack { reason } => {
            println!("Seed unavailable ({}), started with empty data", reason)
        }
    }
}

/// Records as a table. Local records are labeled with the position accepted
/// by update and delete; remote records with their id.
fn print_records(records: &[MetricRecord], position: impl Fn(usize) -> usize) {
    if records.is_empty() {
        println!("No records");
        return;
    }
    println!(
        "{:>8}  {:<10}  {:>12}  {:>12}  {:>12}  {:>8}",
        "#", "Date", "Power kWh", "Drinking L", "Irrigation L", "Price"
    );
    for (i, r) in records.iter().enumerate() {
        let label = r.id.clone().unwrap_or_else(|| position(i).to_string());
        let price = r
            .electricity_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>8}  {:<10}  {:>12.2}  {:>12.2}  {:>12.2}  {:>8}",
            label, r.date, r.power_consumption, r.drinking_water, r.irrigation_water, price
        );
    }
}

fn report_write(ok: bool, message: &str) {
    if ok {
        println!("{}", message);
    } else {
        eprintln!("Not applied: {}", message.to_lowercase());
    }
}
