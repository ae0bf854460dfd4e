use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::TimeGranularity;
use crate::errors::PipelineError;
use crate::ingest::Transaction;

/// Grouping key for the sales matrix rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLevel {
    Postcode,
    Province,
}

impl GroupLevel {
    /// Name of the key column the matrix is joined on.
    pub fn key_field(&self) -> &'static str {
        match self {
            GroupLevel::Postcode => "zip",
            GroupLevel::Province => "province",
        }
    }
}

/// First day of a calendar aggregation bucket; the ordered aggregation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey(NaiveDate);

impl PeriodKey {
    pub fn from_date(date: NaiveDate, granularity: TimeGranularity) -> Self {
        PeriodKey(granularity.truncate(date))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Column label used in merged output, e.g. `Jan-2023`.
    pub fn label(&self) -> String {
        self.0.format("%b-%Y").to_string()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One matrix row: per-period sums aligned with the matrix's period axis,
/// plus the jurisdiction metadata observed on the transactions.
#[derive(Debug, Clone)]
pub struct SalesRow {
    pub province: Option<String>,
    pub country: Option<String>,
    pub amounts: Vec<Decimal>,
}

impl SalesRow {
    /// Row-wise sum over the period columns only.
    pub fn total(&self) -> Decimal {
        self.amounts.iter().copied().sum()
    }
}

/// Geographic key -> per-period sales sums. Absent cells are zero; column
/// order is chronological; row order is unspecified.
#[derive(Debug, Clone)]
pub struct SalesMatrix {
    group_level: GroupLevel,
    periods: Vec<PeriodKey>,
    rows: HashMap<String, SalesRow>,
}

impl SalesMatrix {
    pub fn group_level(&self) -> GroupLevel {
        self.group_level
    }

    pub fn key_field(&self) -> &'static str {
        self.group_level.key_field()
    }

    /// Period columns in chronological order.
    pub fn periods(&self) -> &[PeriodKey] {
        &self.periods
    }

    pub fn rows(&self) -> &HashMap<String, SalesRow> {
        &self.rows
    }

    pub fn row(&self, key: &str) -> Option<&SalesRow> {
        self.rows.get(key)
    }

    pub fn total_sales(&self, key: &str) -> Decimal {
        self.rows.get(key).map(|row| row.total()).unwrap_or(Decimal::ZERO)
    }

    /// Sum of a row's sales across the periods of one calendar year.
    /// Absent rows sum to zero.
    pub fn yearly_total(&self, key: &str, year: i32) -> Decimal {
        match self.rows.get(key) {
            Some(row) => self
                .periods
                .iter()
                .zip(&row.amounts)
                .filter(|(period, _)| period.year() == year)
                .map(|(_, amount)| *amount)
                .sum(),
            None => Decimal::ZERO,
        }
    }
}

/// Aggregate transactions into a period x geographic-unit sales matrix.
///
/// Filters to the inclusive `[start, end]` window, truncates timestamps to
/// their period, sums per (key, period), and pivots periods into columns.
/// Periods observed outside the window due to truncation are excluded from
/// the column axis. Refuses to emit an all-zero matrix: an empty window is
/// a caller mistake, not valid sparse data.
#[instrument(skip(transactions), fields(transactions = transactions.len(), %start, %end))]
pub fn aggregate(
    transactions: &[Transaction],
    start: NaiveDate,
    end: NaiveDate,
    group_level: GroupLevel,
    granularity: TimeGranularity,
) -> Result<SalesMatrix, PipelineError> {
    if start > end {
        return Err(PipelineError::InvalidRange { start, end });
    }

    let in_window: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| {
            let date = t.created_at.date_naive();
            date >= start && date <= end
        })
        .collect();
    if in_window.is_empty() {
        return Err(PipelineError::EmptyResult { start, end });
    }

    // Truncation can push a period start before the window; such periods are
    // dropped from the column axis, but their rows survive with zero cells.
    let mut observed_periods: BTreeSet<PeriodKey> = BTreeSet::new();
    let mut sums: HashMap<(String, PeriodKey), Decimal> = HashMap::new();
    let mut metadata: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();

    for transaction in &in_window {
        let key = match group_level {
            GroupLevel::Postcode => transaction.postcode.clone(),
            GroupLevel::Province => transaction
                .province
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
        };
        metadata
            .entry(key.clone())
            .or_insert_with(|| (transaction.province.clone(), transaction.country.clone()));

        let period = PeriodKey::from_date(transaction.created_at.date_naive(), granularity);
        if period.date() >= start && period.date() <= end {
            observed_periods.insert(period);
            *sums.entry((key, period)).or_insert(Decimal::ZERO) += transaction.amount;
        }
    }

    let periods: Vec<PeriodKey> = observed_periods.into_iter().collect();
    let mut rows = HashMap::with_capacity(metadata.len());
    for (key, (province, country)) in metadata {
        let amounts = periods
            .iter()
            .map(|period| {
                sums.get(&(key.clone(), *period))
                    .copied()
                    .unwrap_or(Decimal::ZERO)
            })
            .collect();
        rows.insert(
            key,
            SalesRow {
                province,
                country,
                amounts,
            },
        );
    }

    debug!(rows = rows.len(), periods = periods.len(), "sales matrix built");
    Ok(SalesMatrix {
        group_level,
        periods,
        rows,
    })
}
