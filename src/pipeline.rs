use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use eyre::{Result, WrapErr};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::aggregate::{GroupLevel, SalesMatrix, aggregate};
use crate::change::{DEFAULT_ALPHA, compute_change};
use crate::config::{CountryConfig, Resolution, TimeGranularity};
use crate::errors::PipelineError;
use crate::geography;
use crate::geometry::GeometryProvider;
use crate::ingest::Transaction;
use crate::merge::{MergedRecord, merge};

/// One complete pipeline request: a date range, a resolution, and a
/// jurisdiction set. Each run is independent and side-effect free.
#[derive(Debug, Clone)]
pub struct ChoroplethRequest {
    pub country: String,
    pub resolution: Resolution,
    pub included_jurisdictions: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: TimeGranularity,
    pub group_level: GroupLevel,
    /// Weight exponent for the change metrics.
    pub alpha: Decimal,
    /// When set, attach year-over-year change columns comparing these two
    /// calendar years (baseline, comparison).
    pub compare_years: Option<(i32, i32)>,
}

impl ChoroplethRequest {
    pub fn new(country: &str, resolution: Resolution, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            country: country.to_string(),
            resolution,
            included_jurisdictions: Vec::new(),
            start,
            end,
            granularity: TimeGranularity::Month,
            group_level: match resolution {
                Resolution::State => GroupLevel::Province,
                _ => GroupLevel::Postcode,
            },
            alpha: DEFAULT_ALPHA,
            compare_years: None,
        }
    }

    /// Check the request against the static configuration before running.
    pub fn validate(&self, config: &CountryConfig) -> Result<(), PipelineError> {
        if self.start > self.end {
            return Err(PipelineError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        let valid_jurisdictions: Vec<String> = config
            .postcode_ranges()
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();
        for jurisdiction in &self.included_jurisdictions {
            if !valid_jurisdictions.contains(jurisdiction) {
                return Err(PipelineError::UnknownJurisdiction {
                    jurisdiction: jurisdiction.clone(),
                    valid: valid_jurisdictions.clone(),
                });
            }
        }
        let requested = self.period_count();
        let max_periods = self.granularity.max_periods();
        if requested > max_periods {
            return Err(PipelineError::WindowTooLong {
                granularity: self.granularity.to_string(),
                max_periods,
                requested,
            });
        }
        config.resolution(self.resolution)?;
        Ok(())
    }

    fn period_count(&self) -> u32 {
        let start = self.granularity.truncate(self.start);
        let end = self.granularity.truncate(self.end);
        let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
        let per_period = match self.granularity {
            TimeGranularity::Month => 1,
            TimeGranularity::Quarter => 3,
            TimeGranularity::Year => 12,
        };
        (months / per_period + 1).max(0) as u32
    }
}

fn record_key(group_level: GroupLevel, record: &MergedRecord) -> String {
    match group_level {
        GroupLevel::Postcode => geography::normalize_postcode(&record.id),
        GroupLevel::Province => record.name.trim().to_string(),
    }
}

/// Run the full pipeline for one request: aggregate the transaction log,
/// load and filter geometry, left-join the two, and optionally attach
/// year-over-year change metrics. Errors from each stage are wrapped with
/// the stage name and re-raised, never swallowed.
#[instrument(skip(request, provider, transactions), fields(
    country = %request.country,
    resolution = %request.resolution,
    transactions = transactions.len()
))]
pub fn generate(
    request: &ChoroplethRequest,
    provider: &impl GeometryProvider,
    transactions: &[Transaction],
) -> Result<Vec<MergedRecord>> {
    let config = CountryConfig::for_country(&request.country)
        .wrap_err("resolving country configuration")?;
    request.validate(&config).wrap_err("validating request")?;

    let matrix = aggregate(
        transactions,
        request.start,
        request.end,
        request.group_level,
        request.granularity,
    )
    .wrap_err("aggregating sales")?;

    let units = provider
        .units(&request.country, request.resolution, &request.included_jurisdictions)
        .wrap_err("loading geometry")?;

    let mut records =
        merge(&units, &matrix, matrix.key_field()).wrap_err("merging sales onto geometry")?;

    if let Some((baseline_year, comparison_year)) = request.compare_years {
        attach_change_metrics(&mut records, &matrix, request, baseline_year, comparison_year);
    }

    info!(rows = records.len(), "pipeline run complete");
    Ok(records)
}

/// Split the matrix into two calendar-year aggregates over the merged key
/// set and attach the weighted change columns to every record. Keys with no
/// sales in either year are floored to zero, never skipped.
fn attach_change_metrics(
    records: &mut [MergedRecord],
    matrix: &SalesMatrix,
    request: &ChoroplethRequest,
    baseline_year: i32,
    comparison_year: i32,
) {
    let mut baseline: HashMap<String, Decimal> = HashMap::with_capacity(records.len());
    let mut comparison: HashMap<String, Decimal> = HashMap::with_capacity(records.len());
    for record in records.iter() {
        let key = record_key(request.group_level, record);
        let baseline_total = matrix.yearly_total(&key, baseline_year);
        let comparison_total = matrix.yearly_total(&key, comparison_year);
        baseline.insert(key.clone(), baseline_total);
        comparison.insert(key, comparison_total);
    }
    let mut metrics = compute_change(&baseline, &comparison, request.alpha);
    for record in records.iter_mut() {
        let key = record_key(request.group_level, record);
        record.change = metrics.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeographicUnit, Geometry, StaticGeometryProvider};
    use chrono::{TimeZone, Utc};
    use rust_decimal::dec;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn polygon() -> Geometry {
        Geometry(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        }))
    }

    fn postcode_unit(id: &str) -> GeographicUnit {
        GeographicUnit {
            id: id.to_string(),
            name: id.to_string(),
            state: None,
            geometry: Some(polygon()),
        }
    }

    fn tx(y: i32, m: u32, postcode: &str, amount: Decimal) -> Transaction {
        Transaction {
            created_at: Utc.with_ymd_and_hms(y, m, 10, 12, 0, 0).unwrap(),
            postcode: postcode.to_string(),
            province: Some("Victoria".to_string()),
            country: Some("Australia".to_string()),
            amount,
        }
    }

    fn victorian_provider() -> StaticGeometryProvider {
        StaticGeometryProvider::new(CountryConfig::australia()).with_layer(
            Resolution::Postcode,
            vec![postcode_unit("3000"), postcode_unit("3001"), postcode_unit("3002")],
        )
    }

    #[test]
    fn full_run_keeps_every_geometry_row() {
        let transactions = vec![
            tx(2023, 1, "3000", dec!(120)),
            tx(2023, 2, "3000", dec!(80)),
            tx(2023, 2, "3001", dec!(40)),
        ];
        let request = ChoroplethRequest {
            included_jurisdictions: vec!["Victoria".to_string()],
            ..ChoroplethRequest::new("Australia", Resolution::Postcode, day(2023, 1, 1), day(2023, 3, 31))
        };
        let records = generate(&request, &victorian_provider(), &transactions).unwrap();
        assert_eq!(records.len(), 3);
        let by_id: HashMap<&str, &MergedRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        assert_eq!(by_id["3000"].total_sales, dec!(200));
        assert_eq!(by_id["3001"].total_sales, dec!(40));
        assert_eq!(by_id["3002"].total_sales, Decimal::ZERO);
    }

    #[test]
    fn year_over_year_metrics_are_attached() {
        let transactions = vec![
            tx(2023, 1, "3000", dec!(100)),
            tx(2024, 1, "3000", dec!(150)),
            tx(2023, 1, "3001", dec!(50)),
        ];
        let request = ChoroplethRequest {
            included_jurisdictions: vec!["Victoria".to_string()],
            granularity: TimeGranularity::Year,
            compare_years: Some((2023, 2024)),
            ..ChoroplethRequest::new("Australia", Resolution::Postcode, day(2023, 1, 1), day(2024, 12, 31))
        };
        let records = generate(&request, &victorian_provider(), &transactions).unwrap();
        let record = records.iter().find(|r| r.id == "3000").unwrap();
        let change = record.change.as_ref().unwrap();
        assert_eq!(change.sales_avg, dec!(125));
        assert_eq!(change.pct_change, dec!(40));
        // Every geometry row gets metrics, including zero-sales ones.
        assert!(records.iter().all(|r| r.change.is_some()));
    }

    #[test]
    fn declining_sales_attach_negative_change_metrics() {
        let transactions = vec![
            tx(2023, 1, "3000", dec!(400)),
            tx(2024, 1, "3000", dec!(100)),
            tx(2024, 2, "3001", dec!(60)),
        ];
        let request = ChoroplethRequest {
            included_jurisdictions: vec!["Victoria".to_string()],
            granularity: TimeGranularity::Year,
            compare_years: Some((2023, 2024)),
            ..ChoroplethRequest::new("Australia", Resolution::Postcode, day(2023, 1, 1), day(2024, 12, 31))
        };
        let records = generate(&request, &victorian_provider(), &transactions).unwrap();
        let shrinking = records.iter().find(|r| r.id == "3000").unwrap();
        let change = shrinking.change.as_ref().unwrap();
        // (100 - 400) / 250 * 100
        assert_eq!(change.sales_avg, dec!(250));
        assert_eq!(change.pct_change, dec!(-120));
        assert!(change.normalized_weighted_pct_change < Decimal::ZERO);
        // Both yearly aggregates are built for every merged key.
        assert!(records.iter().all(|r| r.change.is_some()));
    }

    #[test]
    fn unknown_jurisdiction_is_rejected_before_running() {
        let request = ChoroplethRequest {
            included_jurisdictions: vec!["Western Austrlia".to_string()],
            ..ChoroplethRequest::new("Australia", Resolution::Postcode, day(2023, 1, 1), day(2023, 3, 31))
        };
        let err = request.validate(&CountryConfig::australia()).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownJurisdiction { .. }));
    }

    #[test]
    fn window_longer_than_granularity_cap_is_rejected() {
        let request = ChoroplethRequest::new(
            "Australia",
            Resolution::Postcode,
            day(2023, 1, 1),
            day(2023, 12, 31),
        );
        let err = request.validate(&CountryConfig::australia()).unwrap_err();
        match err {
            PipelineError::WindowTooLong {
                granularity,
                max_periods,
                requested,
            } => {
                assert_eq!(granularity, "Month");
                assert_eq!(max_periods, 6);
                assert_eq!(requested, 12);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stage_errors_carry_stage_context() {
        let transactions = vec![tx(2023, 1, "3000", dec!(100))];
        let request = ChoroplethRequest::new(
            "Australia",
            Resolution::Postcode,
            day(2025, 1, 1),
            day(2025, 3, 31),
        );
        let err = generate(&request, &victorian_provider(), &transactions).unwrap_err();
        assert!(format!("{err:#}").contains("aggregating sales"));
    }
}
