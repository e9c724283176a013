//! Dataset preparation pipeline.
//!
//! Seven stages run in a fixed order, each consuming the previous stage's
//! output and producing a new collection:
//!
//! 1. column projection (drop `Last_Updated` / `Android_Ver`)
//! 2. drop unrated rows
//! 3. first-wins dedup by app name
//! 4. install-count normalization
//! 5. price normalization
//! 6. price outlier filtering
//! 7. revenue derivation
//!
//! The row type is parameterised over the three columns the stages change
//! (rating, installs, price) so a later stage cannot be handed rows an earlier
//! stage has not processed yet.

use std::collections::HashSet;
use std::fmt;

use playmarket_core::{AppSize, AppTable, AppType, CleanedAppRecord, RawAppRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span};

/// Listings priced at or above this are treated as corrupted and dropped.
pub const PRICE_CEILING: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Projection,
    NullFilter,
    Dedup,
    InstallNormalization,
    PriceNormalization,
    OutlierFilter,
    RevenueDerivation,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Projection,
        Stage::NullFilter,
        Stage::Dedup,
        Stage::InstallNormalization,
        Stage::PriceNormalization,
        Stage::OutlierFilter,
        Stage::RevenueDerivation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Projection => "column projection",
            Stage::NullFilter => "null filtering",
            Stage::Dedup => "deduplication",
            Stage::InstallNormalization => "install-count normalization",
            Stage::PriceNormalization => "price normalization",
            Stage::OutlierFilter => "outlier filtering",
            Stage::RevenueDerivation => "revenue derivation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalization stage met a value it cannot interpret. Aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed at row {row_index} ({app}): cannot parse {field} {value:?}: {reason}")]
pub struct ParseError {
    pub stage: Stage,
    pub row_index: usize,
    pub app: String,
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// Row counts observed while preparing the dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub raw_rows: usize,
    pub unrated_dropped: usize,
    pub duplicates_dropped: usize,
    pub outliers_dropped: usize,
    pub cleaned_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    pub table: AppTable,
    pub summary: PipelineSummary,
}

/// A row between stages. `R`, `I` and `P` are the rating, install-count and
/// price representations, which change as stages run.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedApp<R, I, P> {
    pub row_index: usize,
    pub name: String,
    pub category: String,
    pub rating: R,
    pub review_count: u64,
    pub size: Option<AppSize>,
    pub install_count: I,
    pub app_type: Option<AppType>,
    pub price: P,
    pub content_rating: String,
    pub genres: String,
}

/// Stage 1 output.
pub type ProjectedApp = StagedApp<Option<f64>, String, String>;
/// Stage 2 and 3 output.
pub type RatedApp = StagedApp<f64, String, String>;
/// Stage 4 output.
pub type CountedApp = StagedApp<f64, u64, String>;
/// Stage 5 and 6 output.
pub type PricedApp = StagedApp<f64, u64, f64>;

impl<R, I, P> StagedApp<R, I, P> {
    fn with_rating<R2>(self, rating: R2) -> StagedApp<R2, I, P> {
        StagedApp {
            row_index: self.row_index,
            name: self.name,
            category: self.category,
            rating,
            review_count: self.review_count,
            size: self.size,
            install_count: self.install_count,
            app_type: self.app_type,
            price: self.price,
            content_rating: self.content_rating,
            genres: self.genres,
        }
    }

    fn with_install_count<I2>(self, install_count: I2) -> StagedApp<R, I2, P> {
        StagedApp {
            row_index: self.row_index,
            name: self.name,
            category: self.category,
            rating: self.rating,
            review_count: self.review_count,
            size: self.size,
            install_count,
            app_type: self.app_type,
            price: self.price,
            content_rating: self.content_rating,
            genres: self.genres,
        }
    }

    fn with_price<P2>(self, price: P2) -> StagedApp<R, I, P2> {
        StagedApp {
            row_index: self.row_index,
            name: self.name,
            category: self.category,
            rating: self.rating,
            review_count: self.review_count,
            size: self.size,
            install_count: self.install_count,
            app_type: self.app_type,
            price,
            content_rating: self.content_rating,
            genres: self.genres,
        }
    }
}

/// Runs every stage over `raw` and returns the cleaned table.
///
/// `raw` is only read; the result shares nothing with it. Running twice on the
/// same input yields identical output.
pub fn prepare(raw: &[RawAppRecord]) -> Result<PreparedDataset, ParseError> {
    let _span = info_span!("prepare_dataset", raw_rows = raw.len()).entered();

    let projected = project_columns(raw);
    info!(stage = %Stage::Projection, rows = projected.len());

    let rated = drop_unrated(projected);
    let unrated_dropped = raw.len() - rated.len();
    info!(stage = %Stage::NullFilter, rows = rated.len(), dropped = unrated_dropped);

    let before_dedup = rated.len();
    let unique = dedup_first_by_name(rated);
    let duplicates_dropped = before_dedup - unique.len();
    info!(stage = %Stage::Dedup, rows = unique.len(), dropped = duplicates_dropped);

    let counted = normalize_install_counts(unique)?;
    info!(stage = %Stage::InstallNormalization, rows = counted.len());

    let priced = normalize_prices(counted)?;
    info!(stage = %Stage::PriceNormalization, rows = priced.len());

    let before_outliers = priced.len();
    let kept = drop_price_outliers(priced);
    let outliers_dropped = before_outliers - kept.len();
    info!(stage = %Stage::OutlierFilter, rows = kept.len(), dropped = outliers_dropped);

    let cleaned = derive_revenue(kept);
    info!(stage = %Stage::RevenueDerivation, rows = cleaned.len());

    let summary = PipelineSummary {
        raw_rows: raw.len(),
        unrated_dropped,
        duplicates_dropped,
        outliers_dropped,
        cleaned_rows: cleaned.len(),
    };
    Ok(PreparedDataset {
        table: AppTable::new(cleaned),
        summary,
    })
}

/// Stage 1. Copies every row without the two ignored columns, in row order.
pub fn project_columns(raw: &[RawAppRecord]) -> Vec<ProjectedApp> {
    let mut projected = raw
        .iter()
        .map(|record| StagedApp {
            row_index: record.row_index,
            name: record.name.clone(),
            category: record.category.clone(),
            rating: record.rating,
            review_count: record.review_count,
            size: record.size,
            install_count: record.install_count.clone(),
            app_type: record.app_type,
            price: record.price.clone(),
            content_rating: record.content_rating.clone(),
            genres: record.genres.clone(),
        })
        .collect::<Vec<_>>();
    projected.sort_by_key(|app| app.row_index);
    projected
}

/// Stage 2.
pub fn drop_unrated(apps: Vec<ProjectedApp>) -> Vec<RatedApp> {
    apps.into_iter()
        .filter_map(|app| match app.rating {
            Some(rating) => Some(app.with_rating(rating)),
            None => {
                debug!(row_index = app.row_index, app = %app.name, "dropping unrated app");
                None
            }
        })
        .collect()
}

/// Stage 3. Keeps the lowest-row-index record for each name, whatever its
/// other fields hold.
pub fn dedup_first_by_name(apps: Vec<RatedApp>) -> Vec<RatedApp> {
    let mut seen = HashSet::new();
    apps.into_iter()
        .filter(|app| {
            let first = seen.insert(app.name.clone());
            if !first {
                debug!(row_index = app.row_index, app = %app.name, "dropping duplicate app");
            }
            first
        })
        .collect()
}

/// Stage 4.
pub fn normalize_install_counts(apps: Vec<RatedApp>) -> Result<Vec<CountedApp>, ParseError> {
    apps.into_iter()
        .map(|app| match parse_install_count(&app.install_count) {
            Ok(installs) => Ok(app.with_install_count(installs)),
            Err(reason) => Err(ParseError {
                stage: Stage::InstallNormalization,
                row_index: app.row_index,
                field: "install count",
                value: app.install_count,
                app: app.name,
                reason,
            }),
        })
        .collect()
}

/// Stage 5.
pub fn normalize_prices(apps: Vec<CountedApp>) -> Result<Vec<PricedApp>, ParseError> {
    apps.into_iter()
        .map(|app| match parse_price(&app.price) {
            Ok(price) => Ok(app.with_price(price)),
            Err(reason) => Err(ParseError {
                stage: Stage::PriceNormalization,
                row_index: app.row_index,
                field: "price",
                value: app.price,
                app: app.name,
                reason,
            }),
        })
        .collect()
}

/// Stage 6.
pub fn drop_price_outliers(apps: Vec<PricedApp>) -> Vec<PricedApp> {
    apps.into_iter()
        .filter(|app| {
            let keep = app.price < PRICE_CEILING;
            if !keep {
                debug!(row_index = app.row_index, app = %app.name, price = app.price, "dropping price outlier");
            }
            keep
        })
        .collect()
}

/// Stage 7.
pub fn derive_revenue(apps: Vec<PricedApp>) -> Vec<CleanedAppRecord> {
    apps.into_iter()
        .map(|app| CleanedAppRecord {
            revenue_estimate: app.price * app.install_count as f64,
            row_index: app.row_index,
            name: app.name,
            category: app.category,
            rating: app.rating,
            review_count: app.review_count,
            size: app.size,
            install_count: app.install_count,
            app_type: app.app_type,
            price: app.price,
            content_rating: app.content_rating,
            genres: app.genres,
        })
        .collect()
}

/// Parses a human-formatted install count such as `1,000,000+`.
///
/// Only `,` separators, one trailing `+` and surrounding whitespace are
/// removed; anything else left over is an error rather than a zero.
pub fn parse_install_count(text: &str) -> Result<u64, &'static str> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('+').unwrap_or(trimmed);
    let digits = trimmed.chars().filter(|c| *c != ',').collect::<String>();
    if digits.is_empty() {
        return Err("no digits left after removing grouping characters");
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("not a non-negative integer");
    }
    digits.parse::<u64>().map_err(|_| "install count out of range")
}

/// Parses a listing price such as `$4.99`.
///
/// The bare `0` the dataset uses for free apps and a blank price both mean
/// 0.0. The currency symbol is optional.
pub fn parse_price(text: &str) -> Result<f64, &'static str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    let amount = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
    let price = amount
        .parse::<f64>()
        .map_err(|_| "not a decimal amount")?;
    if !price.is_finite() || price < 0.0 {
        return Err("not a finite non-negative amount");
    }
    // -0 parses as negative zero; report it as a plain zero.
    if price == 0.0 {
        return Ok(0.0);
    }
    Ok(price)
}
