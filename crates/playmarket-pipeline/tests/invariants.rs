use std::collections::{HashMap, HashSet};

use playmarket_core::{AppSize, AppType, RawAppRecord};
use playmarket_pipeline::{prepare, PRICE_CEILING};
use proptest::prelude::*;

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn install_text() -> impl Strategy<Value = String> {
    (0u64..5_000_000_000, 0u8..3).prop_map(|(n, style)| match style {
        0 => n.to_string(),
        1 => group_thousands(n),
        _ => format!("{}+", group_thousands(n)),
    })
}

fn price_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("0".to_string()),
        (0u32..50_000).prop_map(|cents| format!("${}.{:02}", cents / 100, cents % 100)),
    ]
}

fn raw_record() -> impl Strategy<Value = RawAppRecord> {
    (
        prop::sample::select(vec!["Instagram", "Minecraft", "Notes", "Tetris", "Maps", "Chess"]),
        prop::option::of(0.0f64..=5.0),
        0u64..100_000_000,
        install_text(),
        price_text(),
        prop::sample::select(vec!["Action", "Action;Adventure", "Puzzle;Brain Games;Casual"]),
    )
        .prop_map(|(name, rating, review_count, install_count, price, genres)| RawAppRecord {
            row_index: 0,
            name: name.to_string(),
            category: "GAME".to_string(),
            rating,
            review_count,
            size: Some(AppSize::Megabytes(10.0)),
            install_count,
            app_type: Some(if price == "0" { AppType::Free } else { AppType::Paid }),
            price,
            content_rating: "Everyone".to_string(),
            genres: genres.to_string(),
            last_updated: None,
            android_version: None,
        })
}

fn raw_dataset() -> impl Strategy<Value = Vec<RawAppRecord>> {
    prop::collection::vec(raw_record(), 0..40).prop_map(|mut records| {
        for (row_index, record) in records.iter_mut().enumerate() {
            record.row_index = row_index;
        }
        records
    })
}

proptest! {
    #[test]
    fn cleaned_records_respect_invariants(raw in raw_dataset()) {
        let prepared = prepare(&raw).unwrap();
        let table = &prepared.table;

        let mut names = HashSet::new();
        for record in table.iter() {
            prop_assert!((0.0..=5.0).contains(&record.rating));
            prop_assert!(names.insert(record.name.clone()), "duplicate name {}", record.name);
            prop_assert!(record.price < PRICE_CEILING);
            prop_assert!(record.revenue_estimate >= 0.0);
            prop_assert_eq!(record.revenue_estimate, record.price * record.install_count as f64);
            prop_assert!(record.genre_tags().count() >= 1);
        }

        let indices = table.iter().map(|r| r.row_index).collect::<Vec<_>>();
        prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(prepared.summary.cleaned_rows, table.len());
        prop_assert_eq!(
            prepared.summary.raw_rows,
            prepared.summary.unrated_dropped
                + prepared.summary.duplicates_dropped
                + prepared.summary.outliers_dropped
                + prepared.summary.cleaned_rows
        );
    }

    #[test]
    fn kept_record_is_the_first_rated_occurrence(raw in raw_dataset()) {
        let prepared = prepare(&raw).unwrap();
        let mut first_rated: HashMap<&str, usize> = HashMap::new();
        for record in raw.iter().filter(|r| r.rating.is_some()) {
            first_rated.entry(record.name.as_str()).or_insert(record.row_index);
        }
        for record in prepared.table.iter() {
            prop_assert_eq!(first_rated.get(record.name.as_str()), Some(&record.row_index));
        }
    }

    #[test]
    fn preparation_is_idempotent_and_pure(raw in raw_dataset()) {
        let before = raw.clone();
        let first = prepare(&raw).unwrap();
        let second = prepare(&raw).unwrap();
        prop_assert_eq!(&raw, &before);
        prop_assert_eq!(first.table.records(), second.table.records());
        prop_assert_eq!(first.summary, second.summary);
    }
}
