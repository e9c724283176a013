use std::fs;
use std::path::{Path, PathBuf};

use playmarket_core::CleanedAppRecord;
use playmarket_ingest::load_apps_csv;
use playmarket_pipeline::{prepare, PipelineSummary};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GoldenApp {
    row_index: usize,
    name: String,
    rating: f64,
    install_count: u64,
    price: f64,
    revenue_estimate: f64,
}

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sample")
}

fn read_snapshot() -> Vec<GoldenApp> {
    let text = fs::read_to_string(fixture_dir().join("snapshot.json")).expect("read snapshot");
    serde_json::from_str(&text).expect("parse snapshot")
}

fn assert_close(actual: f64, expected: f64, what: &str, app: &str) {
    assert!(
        (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0),
        "{app}: {what} {actual} != {expected}"
    );
}

fn assert_matches_golden(actual: &CleanedAppRecord, expected: &GoldenApp) {
    assert_eq!(actual.row_index, expected.row_index);
    assert_eq!(actual.name, expected.name);
    assert_eq!(actual.install_count, expected.install_count);
    assert_close(actual.rating, expected.rating, "rating", &actual.name);
    assert_close(actual.price, expected.price, "price", &actual.name);
    assert_close(actual.revenue_estimate, expected.revenue_estimate, "revenue", &actual.name);
}

#[test]
fn golden_json_snapshot_test_sample_fixture() {
    let raw = load_apps_csv(fixture_dir().join("apps.csv")).unwrap();
    let prepared = prepare(&raw).unwrap();
    let expected = read_snapshot();

    assert_eq!(prepared.table.len(), expected.len());
    for (actual, expected) in prepared.table.iter().zip(&expected) {
        assert_matches_golden(actual, expected);
    }
    assert_eq!(
        prepared.summary,
        PipelineSummary {
            raw_rows: 11,
            unrated_dropped: 2,
            duplicates_dropped: 1,
            outliers_dropped: 1,
            cleaned_rows: 7,
        }
    );
}

#[test]
fn sample_fixture_genres_survive_cleaning() {
    let raw = load_apps_csv(fixture_dir().join("apps.csv")).unwrap();
    let prepared = prepare(&raw).unwrap();
    let minecraft = prepared
        .table
        .iter()
        .find(|r| r.name == "Minecraft")
        .expect("minecraft kept");
    assert_eq!(
        minecraft.genre_tags().collect::<Vec<_>>(),
        vec!["Arcade", "Action & Adventure"]
    );
    assert!(minecraft.is_paid());
}
