//! Read-only report queries over the cleaned app table, and the markdown
//! brief built from them.
//!
//! Every query borrows the records and returns a fresh result; nothing here
//! can modify the table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use playmarket_core::{AppTable, AppType, CleanedAppRecord, GENRE_DELIMITER};
use playmarket_pipeline::PipelineSummary;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub top_n: usize,
    pub category_limit: usize,
    pub review_window: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            category_limit: 15,
            review_window: 50,
        }
    }
}

impl ReportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Missing, unparseable
    /// or zero values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };
        Self {
            top_n: read("PLAYMARKET_TOP_N", defaults.top_n),
            category_limit: read("PLAYMARKET_CATEGORY_LIMIT", defaults.category_limit),
            review_window: read("PLAYMARKET_REVIEW_WINDOW", defaults.review_window),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Numeric columns queries can sort, sum or summarise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Rating,
    ReviewCount,
    SizeMb,
    InstallCount,
    Price,
    RevenueEstimate,
}

impl NumericField {
    /// `None` only for sizes that vary with device or were never recorded.
    pub fn value(self, record: &CleanedAppRecord) -> Option<f64> {
        match self {
            NumericField::Rating => Some(record.rating),
            NumericField::ReviewCount => Some(record.review_count as f64),
            NumericField::SizeMb => record.size_mb(),
            NumericField::InstallCount => Some(record.install_count as f64),
            NumericField::Price => Some(record.price),
            NumericField::RevenueEstimate => Some(record.revenue_estimate),
        }
    }
}

/// Text columns queries can group or count by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Name,
    Category,
    AppType,
    ContentRating,
    Genres,
}

impl TextField {
    /// A record without an app type yields an empty string.
    pub fn value(self, record: &CleanedAppRecord) -> &str {
        match self {
            TextField::Name => &record.name,
            TextField::Category => &record.category,
            TextField::AppType => record.app_type.map(AppType::as_str).unwrap_or_default(),
            TextField::ContentRating => &record.content_rating,
            TextField::Genres => &record.genres,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub sum: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTypeCount {
    pub category: String,
    pub app_type: AppType,
    pub count: usize,
}

/// Five-number summary plus mean and sample standard deviation; the numbers
/// behind a box plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub summary: Summary,
}

fn compare_keys(a: Option<f64>, b: Option<f64>, order: Order) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match order {
            Order::Ascending => a.total_cmp(&b),
            Order::Descending => b.total_cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The first `n` records by `key`. Ties keep table order; records with no
/// value for `key` come last in either direction.
pub fn top_n(
    records: &[CleanedAppRecord],
    key: NumericField,
    n: usize,
    order: Order,
) -> Vec<&CleanedAppRecord> {
    let mut sorted = records.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| compare_keys(key.value(a), key.value(b), order));
    sorted.truncate(n);
    sorted
}

/// Sum of `sum` per distinct `group` value, largest first; equal sums are
/// ordered by key. Missing values add nothing but the record is still counted.
pub fn group_sum(records: &[CleanedAppRecord], group: TextField, sum: NumericField) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(group.value(record)).or_default();
        entry.0 += sum.value(record).unwrap_or(0.0);
        entry.1 += 1;
    }
    let mut totals = groups
        .into_iter()
        .map(|(key, (sum, count))| GroupTotal {
            key: key.to_string(),
            sum,
            count,
        })
        .collect::<Vec<_>>();
    totals.sort_by(|a, b| b.sum.total_cmp(&a.sum).then_with(|| a.key.cmp(&b.key)));
    totals
}

fn sorted_counts(counts: BTreeMap<&str, usize>) -> Vec<ValueCount> {
    let mut out = counts
        .into_iter()
        .map(|(value, count)| ValueCount {
            value: value.to_string(),
            count,
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    out
}

/// Occurrences of each distinct non-blank value, most frequent first.
pub fn value_counts(records: &[CleanedAppRecord], field: TextField) -> Vec<ValueCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in records.iter().map(|r| field.value(r)).filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    sorted_counts(counts)
}

/// Like [`value_counts`], but each record counts once towards every tag of
/// its `delimiter`-separated value.
pub fn exploded_value_counts(
    records: &[CleanedAppRecord],
    field: TextField,
    delimiter: char,
) -> Vec<ValueCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        for tag in playmarket_core::split_tags(field.value(record), delimiter) {
            *counts.entry(tag).or_default() += 1;
        }
    }
    sorted_counts(counts)
}

pub fn distinct_count(records: &[CleanedAppRecord], field: TextField) -> usize {
    records
        .iter()
        .map(|r| field.value(r))
        .filter(|v| !v.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

/// App counts per (category, type) pair, largest first. Records without a
/// type are left out.
pub fn category_type_counts(records: &[CleanedAppRecord]) -> Vec<CategoryTypeCount> {
    let mut counts: BTreeMap<(&str, AppType), usize> = BTreeMap::new();
    for record in records {
        if let Some(app_type) = record.app_type {
            *counts.entry((record.category.as_str(), app_type)).or_default() += 1;
        }
    }
    let mut out = counts
        .into_iter()
        .map(|((category, app_type), count)| CategoryTypeCount {
            category: category.to_string(),
            app_type,
            count,
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.app_type.cmp(&b.app_type))
    });
    out
}

/// Paid apps among the `window` most-reviewed apps, in review order.
pub fn paid_among_most_reviewed(records: &[CleanedAppRecord], window: usize) -> Vec<&CleanedAppRecord> {
    top_n(records, NumericField::ReviewCount, window, Order::Descending)
        .into_iter()
        .filter(|r| r.is_paid())
        .collect()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Returns `None` for an empty input. Quartiles interpolate linearly between
/// neighbouring values.
pub fn describe(values: impl IntoIterator<Item = f64>) -> Option<Summary> {
    let mut sorted = values.into_iter().filter(|v| !v.is_nan()).collect::<Vec<_>>();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });
    Some(Summary {
        count,
        mean,
        std,
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[count - 1],
    })
}

/// [`describe`] of `key` per `group`, over the records `filter` accepts.
/// Groups come back in key order; groups with no values are skipped.
pub fn describe_by_group(
    records: &[CleanedAppRecord],
    group: TextField,
    key: NumericField,
    filter: impl Fn(&CleanedAppRecord) -> bool,
) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records.iter().filter(|r| filter(*r)) {
        if let Some(value) = key.value(record) {
            groups.entry(group.value(record)).or_default().push(value);
        }
    }
    groups
        .into_iter()
        .filter_map(|(key, values)| {
            describe(values).map(|summary| GroupSummary {
                key: key.to_string(),
                summary,
            })
        })
        .collect()
}

fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_money(amount: f64) -> String {
    let cents = (amount * 100.0).round() as u64;
    format!("${}.{:02}", format_count(cents / 100), cents % 100)
}

fn section(title: &str, lines: Vec<String>) -> String {
    let body = if lines.is_empty() {
        "_none_".to_string()
    } else {
        lines.join("\n")
    };
    format!("## {title}\n{body}\n")
}

/// Markdown brief answering the standing questions about the market:
/// what is popular, what is crowded, what earns, and how paid apps price.
pub fn render_brief(table: &AppTable, summary: &PipelineSummary, config: &ReportConfig) -> String {
    let records = table.records();
    let n = config.top_n;
    let mut sections = Vec::new();

    sections.push(section(
        "Dataset",
        vec![
            format!("- Raw rows: {}", summary.raw_rows),
            format!("- Unrated rows dropped: {}", summary.unrated_dropped),
            format!("- Duplicate rows dropped: {}", summary.duplicates_dropped),
            format!("- Price outliers dropped: {}", summary.outliers_dropped),
            format!("- Cleaned apps: {}", summary.cleaned_rows),
            format!("- Categories: {}", distinct_count(records, TextField::Category)),
        ],
    ));

    sections.push(section(
        "Highest Rated",
        top_n(records, NumericField::Rating, n, Order::Descending)
            .into_iter()
            .map(|r| format!("- {}: {:.1} ({} reviews)", r.name, r.rating, format_count(r.review_count)))
            .collect(),
    ));

    sections.push(section(
        "Largest Apps",
        top_n(records, NumericField::SizeMb, n, Order::Descending)
            .into_iter()
            .filter_map(|r| r.size_mb().map(|mb| format!("- {}: {mb:.1} MB", r.name)))
            .collect(),
    ));

    let mut reviewed = top_n(records, NumericField::ReviewCount, n, Order::Descending)
        .into_iter()
        .map(|r| format!("- {}: {} reviews", r.name, format_count(r.review_count)))
        .collect::<Vec<_>>();
    let paid_reviewed = paid_among_most_reviewed(records, config.review_window);
    reviewed.push(format!(
        "- Paid apps among the {} most reviewed: {}",
        config.review_window,
        paid_reviewed.len()
    ));
    reviewed.extend(paid_reviewed.iter().map(|r| format!("  - {}", r.name)));
    sections.push(section("Most Reviewed", reviewed));

    let content_ratings = value_counts(records, TextField::ContentRating);
    let total = content_ratings.iter().map(|vc| vc.count).sum::<usize>().max(1) as f64;
    sections.push(section(
        "Content Ratings",
        content_ratings
            .into_iter()
            .map(|vc| format!("- {}: {} ({:.1}%)", vc.value, vc.count, vc.count as f64 * 100.0 / total))
            .collect(),
    ));

    sections.push(section(
        "Highest Grossing",
        top_n(records, NumericField::RevenueEstimate, n, Order::Descending)
            .into_iter()
            .filter(|r| r.revenue_estimate > 0.0)
            .map(|r| {
                format!(
                    "- {}: {} ({} x {} installs)",
                    r.name,
                    format_money(r.revenue_estimate),
                    format_money(r.price),
                    format_count(r.install_count)
                )
            })
            .collect(),
    ));

    sections.push(section(
        "Apps per Category",
        value_counts(records, TextField::Category)
            .into_iter()
            .take(n)
            .map(|vc| format!("- {}: {}", vc.value, vc.count))
            .collect(),
    ));

    let category_installs = group_sum(records, TextField::Category, NumericField::InstallCount);
    sections.push(section(
        "Installs per Category",
        category_installs
            .iter()
            .take(config.category_limit)
            .map(|g| format!("- {}: {}", g.key, format_count(g.sum as u64)))
            .collect(),
    ));

    let mut concentration = category_installs.clone();
    concentration.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    sections.push(section(
        "Category Concentration",
        concentration
            .iter()
            .map(|g| {
                format!(
                    "- {}: {} apps, {} installs, {} installs per app",
                    g.key,
                    g.count,
                    format_count(g.sum as u64),
                    format_count((g.sum / g.count as f64).round() as u64)
                )
            })
            .collect(),
    ));

    let genres = exploded_value_counts(records, TextField::Genres, GENRE_DELIMITER);
    debug!(distinct_genres = genres.len(), "counted genre tags");
    sections.push(section(
        "Genres",
        genres
            .into_iter()
            .take(n)
            .map(|vc| format!("- {}: {}", vc.value, vc.count))
            .collect(),
    ));

    let mut free_vs_paid = value_counts(records, TextField::AppType)
        .into_iter()
        .map(|vc| format!("- {}: {}", vc.value, vc.count))
        .collect::<Vec<_>>();
    free_vs_paid.extend(
        category_type_counts(records)
            .into_iter()
            .take(n.saturating_mul(2))
            .map(|c| format!("  - {} / {}: {}", c.category, c.app_type, c.count)),
    );
    sections.push(section("Free vs Paid", free_vs_paid));

    sections.push(section(
        "Installs by Type",
        describe_by_group(records, TextField::AppType, NumericField::InstallCount, |r| {
            r.app_type.is_some()
        })
        .into_iter()
        .map(|g| {
            format!(
                "- {}: median {} (n={}, min {}, max {})",
                g.key,
                format_count(g.summary.median.round() as u64),
                g.summary.count,
                format_count(g.summary.min as u64),
                format_count(g.summary.max as u64)
            )
        })
        .collect(),
    ));

    let mut revenue = describe_by_group(
        records,
        TextField::Category,
        NumericField::RevenueEstimate,
        CleanedAppRecord::is_paid,
    );
    revenue.sort_by(|a, b| a.summary.min.total_cmp(&b.summary.min).then_with(|| a.key.cmp(&b.key)));
    sections.push(section(
        "Paid App Revenue by Category",
        revenue
            .into_iter()
            .map(|g| {
                format!(
                    "- {}: median {} (n={}, min {}, max {})",
                    g.key,
                    format_money(g.summary.median),
                    g.summary.count,
                    format_money(g.summary.min),
                    format_money(g.summary.max)
                )
            })
            .collect(),
    ));

    let mut pricing = Vec::new();
    if let Some(s) = describe(records.iter().filter(|r| r.is_paid()).map(|r| r.price)) {
        pricing.push(format!(
            "- All paid apps: median {} (n={}, mean {}, min {}, max {})",
            format_money(s.median),
            s.count,
            format_money(s.mean),
            format_money(s.min),
            format_money(s.max)
        ));
    }
    let mut price_groups = describe_by_group(
        records,
        TextField::Category,
        NumericField::Price,
        CleanedAppRecord::is_paid,
    );
    price_groups.sort_by(|a, b| b.summary.max.total_cmp(&a.summary.max).then_with(|| a.key.cmp(&b.key)));
    pricing.extend(price_groups.into_iter().take(n).map(|g| {
        format!(
            "  - {}: median {}, max {}",
            g.key,
            format_money(g.summary.median),
            format_money(g.summary.max)
        )
    }));
    sections.push(section("Paid App Pricing", pricing));

    format!("# Play Market App Brief\n\n{}", sections.join("\n"))
}
