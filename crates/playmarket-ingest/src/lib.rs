//! CSV ingestion for the Play Market app dataset.
//!
//! The source schema is fixed: every required header must be present, the two
//! columns the analysis ignores (`Last_Updated`, `Android_Ver`) may be absent.
//! Typed columns are validated here, once, so the preparation pipeline only
//! deals with the textual `Installs` and `Price` columns.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use playmarket_core::{AppSize, AppType, RawAppRecord, GENRE_DELIMITER, VARIES_WITH_DEVICE};
use thiserror::Error;
use tracing::{debug, info, info_span};

pub const COL_APP: &str = "App";
pub const COL_CATEGORY: &str = "Category";
pub const COL_RATING: &str = "Rating";
pub const COL_REVIEWS: &str = "Reviews";
pub const COL_SIZE: &str = "Size_MBs";
pub const COL_INSTALLS: &str = "Installs";
pub const COL_TYPE: &str = "Type";
pub const COL_PRICE: &str = "Price";
pub const COL_CONTENT_RATING: &str = "Content_Rating";
pub const COL_GENRES: &str = "Genres";
pub const COL_LAST_UPDATED: &str = "Last_Updated";
pub const COL_ANDROID_VER: &str = "Android_Ver";

pub const REQUIRED_COLUMNS: [&str; 10] = [
    COL_APP,
    COL_CATEGORY,
    COL_RATING,
    COL_REVIEWS,
    COL_SIZE,
    COL_INSTALLS,
    COL_TYPE,
    COL_PRICE,
    COL_CONTENT_RATING,
    COL_GENRES,
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {origin}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },
    #[error("{origin} is missing required column `{column}`")]
    MissingColumn { origin: String, column: &'static str },
    #[error("{origin}: row {row_index} ({app}): column `{column}` has invalid value {value:?}: {reason}")]
    InvalidValue {
        origin: String,
        row_index: usize,
        app: String,
        column: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Header positions resolved once per file.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    app: usize,
    category: usize,
    rating: usize,
    reviews: usize,
    size: usize,
    installs: usize,
    app_type: usize,
    price: usize,
    content_rating: usize,
    genres: usize,
    last_updated: Option<usize>,
    android_ver: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, origin: &str) -> Result<Self, LoadError> {
        let position = |name: &str| headers.iter().position(|h| h == name);
        let required = |column: &'static str| {
            position(column).ok_or_else(|| LoadError::MissingColumn {
                origin: origin.to_string(),
                column,
            })
        };
        Ok(Self {
            app: required(COL_APP)?,
            category: required(COL_CATEGORY)?,
            rating: required(COL_RATING)?,
            reviews: required(COL_REVIEWS)?,
            size: required(COL_SIZE)?,
            installs: required(COL_INSTALLS)?,
            app_type: required(COL_TYPE)?,
            price: required(COL_PRICE)?,
            content_rating: required(COL_CONTENT_RATING)?,
            genres: required(COL_GENRES)?,
            last_updated: position(COL_LAST_UPDATED),
            android_ver: position(COL_ANDROID_VER),
        })
    }
}

/// Loads the dataset from a CSV file on disk.
pub fn load_apps_csv(path: impl AsRef<Path>) -> Result<Vec<RawAppRecord>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_apps_csv(BufReader::new(file), &path.display().to_string())
}

/// Reads the dataset from any CSV source; `origin` names it in errors.
pub fn read_apps_csv<R: Read>(reader: R, origin: &str) -> Result<Vec<RawAppRecord>, LoadError> {
    let _span = info_span!("load_apps_csv", origin).entered();
    let csv_error = |source| LoadError::Csv {
        origin: origin.to_string(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers().map_err(csv_error)?.clone();
    let columns = ColumnIndex::from_headers(&headers, origin)?;

    let mut records = Vec::new();
    for (row_index, result) in reader.records().enumerate() {
        let row = result.map_err(csv_error)?;
        records.push(RowParser { origin, row_index, row: &row, columns }.parse()?);
    }

    info!(rows = records.len(), "loaded app dataset");
    Ok(records)
}

struct RowParser<'a> {
    origin: &'a str,
    row_index: usize,
    row: &'a StringRecord,
    columns: ColumnIndex,
}

impl RowParser<'_> {
    fn cell(&self, index: usize) -> &str {
        self.row.get(index).unwrap_or_default()
    }

    fn invalid(&self, column: &'static str, value: &str, reason: &'static str) -> LoadError {
        LoadError::InvalidValue {
            origin: self.origin.to_string(),
            row_index: self.row_index,
            app: self.cell(self.columns.app).to_string(),
            column,
            value: value.to_string(),
            reason,
        }
    }

    fn parse(&self) -> Result<RawAppRecord, LoadError> {
        let c = self.columns;
        Ok(RawAppRecord {
            row_index: self.row_index,
            name: self.cell(c.app).to_string(),
            category: self.cell(c.category).to_string(),
            rating: self.rating()?,
            review_count: self.review_count()?,
            size: self.size()?,
            install_count: self.cell(c.installs).to_string(),
            app_type: self.app_type()?,
            price: self.cell(c.price).to_string(),
            content_rating: self.cell(c.content_rating).to_string(),
            genres: self.genres()?,
            last_updated: c.last_updated.and_then(|i| non_blank(self.cell(i))),
            android_version: c.android_ver.and_then(|i| non_blank(self.cell(i))),
        })
    }

    /// Blank, `NaN` and unparseable ratings count as unrated. A number
    /// outside 0–5 is a malformed value, not a missing one.
    fn rating(&self) -> Result<Option<f64>, LoadError> {
        let text = self.cell(self.columns.rating);
        if is_null(text) {
            return Ok(None);
        }
        match text.parse::<f64>() {
            Ok(rating) if (0.0..=5.0).contains(&rating) => Ok(Some(rating)),
            Ok(_) => Err(self.invalid(COL_RATING, text, "rating must be between 0 and 5")),
            Err(_) => {
                debug!(row_index = self.row_index, value = text, "treating unparseable rating as missing");
                Ok(None)
            }
        }
    }

    fn review_count(&self) -> Result<u64, LoadError> {
        let text = self.cell(self.columns.reviews);
        text.parse::<u64>()
            .map_err(|_| self.invalid(COL_REVIEWS, text, "expected a non-negative integer"))
    }

    fn size(&self) -> Result<Option<AppSize>, LoadError> {
        let text = self.cell(self.columns.size);
        if is_null(text) {
            return Ok(None);
        }
        if text.eq_ignore_ascii_case(VARIES_WITH_DEVICE) {
            return Ok(Some(AppSize::VariesWithDevice));
        }
        match text.parse::<f64>() {
            Ok(mb) if mb.is_finite() && mb >= 0.0 => Ok(Some(AppSize::Megabytes(mb))),
            _ => Err(self.invalid(
                COL_SIZE,
                text,
                "expected megabytes or \"Varies with device\"",
            )),
        }
    }

    fn app_type(&self) -> Result<Option<AppType>, LoadError> {
        let text = self.cell(self.columns.app_type);
        if is_null(text) {
            return Ok(None);
        }
        AppType::parse(text)
            .map(Some)
            .ok_or_else(|| self.invalid(COL_TYPE, text, "expected Free or Paid"))
    }

    fn genres(&self) -> Result<String, LoadError> {
        let text = self.cell(self.columns.genres);
        if text.split(GENRE_DELIMITER).any(|tag| tag.trim().is_empty()) {
            return Err(self.invalid(COL_GENRES, text, "every genre tag must be non-empty"));
        }
        Ok(text.to_string())
    }
}

fn is_null(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan")
}

fn non_blank(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
