//! Core domain model for the Play Market app dataset.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Separator between genre tags in the `Genres` column.
pub const GENRE_DELIMITER: char = ';';

/// Sentinel the dataset uses in place of a size for multi-APK listings.
pub const VARIES_WITH_DEVICE: &str = "Varies with device";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppType {
    Free,
    Paid,
}

impl AppType {
    pub fn as_str(self) -> &'static str {
        match self {
            AppType::Free => "Free",
            AppType::Paid => "Paid",
        }
    }

    /// Case-insensitive match against `Free` / `Paid`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("free") {
            Some(AppType::Free)
        } else if text.eq_ignore_ascii_case("paid") {
            Some(AppType::Paid)
        } else {
            None
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download size of an app listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppSize {
    Megabytes(f64),
    VariesWithDevice,
}

impl AppSize {
    pub fn megabytes(self) -> Option<f64> {
        match self {
            AppSize::Megabytes(mb) => Some(mb),
            AppSize::VariesWithDevice => None,
        }
    }
}

impl fmt::Display for AppSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppSize::Megabytes(mb) => write!(f, "{mb:.1} MB"),
            AppSize::VariesWithDevice => f.write_str(VARIES_WITH_DEVICE),
        }
    }
}

/// One data row of the source table, typed once at load time.
///
/// `install_count` and `price` stay textual here; turning them into numbers
/// is the job of the preparation pipeline, which reports malformed values
/// instead of guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAppRecord {
    /// Zero-based position among the data rows of the source file.
    pub row_index: usize,
    pub name: String,
    pub category: String,
    pub rating: Option<f64>,
    pub review_count: u64,
    pub size: Option<AppSize>,
    pub install_count: String,
    pub app_type: Option<AppType>,
    pub price: String,
    pub content_rating: String,
    pub genres: String,
    pub last_updated: Option<String>,
    pub android_version: Option<String>,
}

/// A rated, deduplicated, fully numeric app listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedAppRecord {
    pub row_index: usize,
    pub name: String,
    pub category: String,
    pub rating: f64,
    pub review_count: u64,
    pub size: Option<AppSize>,
    pub install_count: u64,
    pub app_type: Option<AppType>,
    pub price: f64,
    pub content_rating: String,
    pub genres: String,
    /// `price * install_count`; only meaningful for paid apps.
    pub revenue_estimate: f64,
}

impl CleanedAppRecord {
    pub fn is_paid(&self) -> bool {
        self.app_type == Some(AppType::Paid)
    }

    pub fn size_mb(&self) -> Option<f64> {
        self.size.and_then(AppSize::megabytes)
    }

    pub fn genre_tags(&self) -> impl Iterator<Item = &str> {
        split_tags(&self.genres, GENRE_DELIMITER)
    }
}

/// Splits a delimited text field into trimmed, non-empty tags.
pub fn split_tags(text: &str, delimiter: char) -> impl Iterator<Item = &str> {
    text.split(delimiter).map(str::trim).filter(|tag| !tag.is_empty())
}

/// The cleaned dataset, shared read-only between report queries.
///
/// Cloning is cheap; every clone points at the same records.
#[derive(Debug, Clone, PartialEq)]
pub struct AppTable {
    records: Arc<[CleanedAppRecord]>,
}

impl AppTable {
    pub fn new(records: Vec<CleanedAppRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[CleanedAppRecord] {
        &self.records
    }
}

impl Deref for AppTable {
    type Target = [CleanedAppRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl FromIterator<CleanedAppRecord> for AppTable {
    fn from_iter<I: IntoIterator<Item = CleanedAppRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_record(name: &str, genres: &str) -> CleanedAppRecord {
        CleanedAppRecord {
            row_index: 0,
            name: name.to_string(),
            category: "GAME".to_string(),
            rating: 4.2,
            review_count: 10,
            size: Some(AppSize::VariesWithDevice),
            install_count: 1_000,
            app_type: Some(AppType::Paid),
            price: 1.5,
            content_rating: "Everyone".to_string(),
            genres: genres.to_string(),
            revenue_estimate: 1_500.0,
        }
    }

    #[test]
    fn app_type_parse_is_case_insensitive() {
        assert_eq!(AppType::parse("Free"), Some(AppType::Free));
        assert_eq!(AppType::parse(" PAID "), Some(AppType::Paid));
        assert_eq!(AppType::parse("0"), None);
        assert_eq!(AppType::parse(""), None);
    }

    #[test]
    fn genre_tags_skip_blank_fragments() {
        let record = mk_record("Alto", "Action; Adventure;;");
        assert_eq!(record.genre_tags().collect::<Vec<_>>(), vec!["Action", "Adventure"]);
    }

    #[test]
    fn varies_with_device_has_no_megabytes() {
        let record = mk_record("Alto", "Arcade");
        assert!(record.is_paid());
        assert_eq!(record.size_mb(), None);
        assert_eq!(AppSize::Megabytes(12.5).megabytes(), Some(12.5));
        assert_eq!(AppSize::VariesWithDevice.to_string(), VARIES_WITH_DEVICE);
    }

    #[test]
    fn table_clones_share_records() {
        let table: AppTable = vec![mk_record("Alto", "Arcade"), mk_record("Bento", "Puzzle")]
            .into_iter()
            .collect();
        let other = table.clone();
        assert_eq!(table.len(), 2);
        assert!(std::ptr::eq(table.records(), other.records()));
    }

    #[test]
    fn cleaned_record_serializes_size_sentinel() {
        let json = serde_json::to_value(mk_record("Alto", "Arcade")).unwrap();
        assert_eq!(json["size"], serde_json::json!("varies_with_device"));
        assert_eq!(json["app_type"], serde_json::json!("Paid"));
    }
}
