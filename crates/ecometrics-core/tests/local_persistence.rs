use std::path::Path;

use ecometrics_core::cache::{DirStore, LocalCache, RECORDS_KEY};
use ecometrics_core::{
    BootOutcome, Bootstrapper, DataManager, ExportFormat, KeyValueStore, MetricRecord, PathPicker,
    SeedSource, DEFAULT_ELECTRICITY_PRICE,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manager_in(dir: &Path, seed: SeedSource) -> DataManager<DirStore> {
    let store = DirStore::new(dir.to_path_buf()).expect("store");
    DataManager::new(LocalCache::new(store), Bootstrapper::new(seed))
}

fn record(date: &str, price: Option<f64>) -> MetricRecord {
    MetricRecord::new(date.parse().expect("valid test date"), 10.0, 5.0, 2.0, price)
}

#[tokio::test]
async fn seed_not_found_initializes_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/ecoMetrics.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let seed = SeedSource::http(format!("{}/data/ecoMetrics.json", server.uri())).expect("seed");
    let mut manager = manager_in(dir.path(), seed);
    let report = manager.initialize().await;

    assert!(matches!(report.outcome, BootOutcome::FellBack { .. }));
    assert_eq!(report.records, 0);
    assert_eq!(report.price, DEFAULT_ELECTRICITY_PRICE);

    let snapshot = manager.cache().snapshot();
    assert_eq!(snapshot.records.as_deref(), Some("[]"));
    assert_eq!(snapshot.price.as_deref(), Some("25.0"));
    assert_eq!(snapshot.initialized.as_deref(), Some("true"));
}

#[tokio::test]
async fn seed_is_fetched_only_once_per_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/ecoMetrics.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"date": "2024-01-02", "powerConsumption": 12, "drinkingWater": 6, "irrigationWater": 3, "electricityPrice": 27.5},
            {"date": "2024-01-01", "powerConsumption": 10, "drinkingWater": 5, "irrigationWater": 2, "electricityPrice": 25}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("{}/data/ecoMetrics.json", server.uri());

    let mut first = manager_in(dir.path(), SeedSource::http(url.clone()).expect("seed"));
    let report = first.initialize().await;
    assert_eq!(report.outcome, BootOutcome::Seeded { records: 2, price: 27.5 });
    first.save_entry(record("2024-01-03", None)).expect("saved");

    // A fresh process over the same directory keeps user data and skips the seed
    let mut second = manager_in(dir.path(), SeedSource::http(url).expect("seed"));
    let report = second.initialize().await;
    assert_eq!(report.outcome, BootOutcome::AlreadyInitialized { records: 3 });
    assert_eq!(second.get_electricity_price(), 27.5);
    let dates: Vec<String> = second.get_data().iter().map(|r| r.date.to_string()).collect();
    assert_eq!(dates, ["2024-01-01", "2024-01-02", "2024-01-03"]);
}

#[tokio::test]
async fn corrupt_collection_is_repaired_on_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_in(dir.path(), SeedSource::None);
    manager.initialize().await;
    manager.save_entry(record("2024-01-01", Some(30.0))).expect("saved");

    manager
        .cache()
        .store()
        .set_item(RECORDS_KEY, "{not json")
        .expect("corrupt write");

    let mut restarted = manager_in(dir.path(), SeedSource::None);
    let report = restarted.initialize().await;
    assert!(report.repaired);
    assert!(matches!(report.outcome, BootOutcome::FellBack { .. }));
    assert!(restarted.is_empty());
    assert_eq!(restarted.cache().snapshot().records.as_deref(), Some("[]"));
}

#[tokio::test]
async fn cleared_collection_is_not_reseeded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let seed_path = dir.path().join("seed.json");
    std::fs::write(
        &seed_path,
        r#"[{"date":"2024-01-01","powerConsumption":1,"drinkingWater":1,"irrigationWater":1,"electricityPrice":20}]"#,
    )
    .expect("write seed");
    let data_dir = dir.path().join("data");

    let mut manager = manager_in(&data_dir, SeedSource::file(&seed_path));
    manager.initialize().await;
    assert_eq!(manager.len(), 1);
    assert!(manager.clear_all_data(true).expect("cleared"));

    let mut restarted = manager_in(&data_dir, SeedSource::file(&seed_path));
    let report = restarted.initialize().await;
    assert!(!report.repaired);
    assert_eq!(report.outcome, BootOutcome::AlreadyInitialized { records: 0 });
    assert!(restarted.is_empty());
    assert_eq!(restarted.get_electricity_price(), DEFAULT_ELECTRICITY_PRICE);
}

#[tokio::test]
async fn json_export_imports_into_a_fresh_directory() {
    let source_dir = tempfile::tempdir().expect("tempdir");
    let mut source = manager_in(source_dir.path(), SeedSource::None);
    source.initialize().await;
    source.save_entry(record("2024-01-02", Some(31.0))).expect("saved");
    source.save_entry(record("2024-01-01", Some(29.0))).expect("saved");

    let export_dir = tempfile::tempdir().expect("tempdir");
    let file = source
        .export_data(ExportFormat::Json, Some("backup.json"))
        .expect("export");
    let written = file.write_to(export_dir.path()).expect("write export");
    assert!(written.ends_with("backup.json"));

    let target_dir = tempfile::tempdir().expect("tempdir");
    let mut target = manager_in(target_dir.path(), SeedSource::None);
    target.initialize().await;
    assert!(target
        .import_from_file(&PathPicker(Some(written)))
        .expect("import"));

    assert_eq!(target.get_data(), source.get_data());
    // Price follows the latest-dated record, not the last one saved
    assert_eq!(target.get_electricity_price(), 31.0);

    let mut reopened = manager_in(target_dir.path(), SeedSource::None);
    reopened.initialize().await;
    assert_eq!(reopened.get_data(), source.get_data());
}

#[tokio::test]
async fn cancelled_and_invalid_imports_keep_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut manager = manager_in(dir.path(), SeedSource::None);
    manager.initialize().await;
    manager.save_entry(record("2024-01-01", Some(30.0))).expect("saved");

    assert!(!manager.import_from_file(&PathPicker(None)).expect("cancel"));

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, r#"{"records": []}"#).expect("write");
    assert!(manager.import_from_file(&PathPicker(Some(bad))).is_err());

    assert_eq!(manager.len(), 1);
    assert_eq!(manager.get_electricity_price(), 30.0);
}
