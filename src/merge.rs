use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::aggregate::{GroupLevel, PeriodKey, SalesMatrix};
use crate::change::ChangeMetrics;
use crate::errors::PipelineError;
use crate::geography;
use crate::geometry::{GeographicUnit, Geometry};

/// A geographic unit enriched with its sales columns. Field order of the
/// exported properties is deterministic: identifier, jurisdiction metadata,
/// geometry, `total_sales`, then period columns chronologically.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecord {
    pub id: String,
    pub name: String,
    pub state: Option<String>,
    pub country: Option<String>,
    pub geometry: Option<Geometry>,
    pub total_sales: Decimal,
    /// Chronological period columns.
    pub period_sales: Vec<(PeriodKey, Decimal)>,
    /// Year-over-year change columns, when the pipeline attaches them.
    pub change: Option<ChangeMetrics>,
}

// The unit-side field each grouping level joins against.
fn unit_join_value(unit: &GeographicUnit, group_level: GroupLevel) -> Option<&str> {
    match group_level {
        GroupLevel::Postcode => unit.field("id"),
        GroupLevel::Province => unit.field("name"),
    }
}

fn normalize_key(group_level: GroupLevel, raw: &str) -> String {
    match group_level {
        // Numeric vs string key mismatches are the most common integration
        // failure; both sides go through the same canonical form.
        GroupLevel::Postcode => geography::normalize_postcode(raw),
        GroupLevel::Province => raw.trim().to_string(),
    }
}

/// Left-join the geometry collection with the sales matrix.
///
/// Geometry is authoritative for row existence: every unit appears exactly
/// once, with zero-filled sales cells when the matrix has no row for it.
/// Keys are normalized to strings on both sides before matching.
#[instrument(skip(units, matrix), fields(units = units.len(), id_field))]
pub fn merge(
    units: &[GeographicUnit],
    matrix: &SalesMatrix,
    id_field: &str,
) -> Result<Vec<MergedRecord>, PipelineError> {
    if id_field != matrix.key_field() {
        return Err(PipelineError::JoinKeyMismatch {
            field: id_field.to_string(),
            side: "sales".to_string(),
        });
    }
    let group_level = matrix.group_level();
    if units.iter().any(|unit| unit_join_value(unit, group_level).is_none()) {
        return Err(PipelineError::JoinKeyMismatch {
            field: id_field.to_string(),
            side: "geometry".to_string(),
        });
    }
    let mut matched = 0usize;
    let records = units
        .iter()
        .map(|unit| {
            let key = normalize_key(
                group_level,
                unit_join_value(unit, group_level).unwrap_or_default(),
            );
            let row = matrix.row(&key);
            if row.is_some() {
                matched += 1;
            }
            let period_sales: Vec<(PeriodKey, Decimal)> = matrix
                .periods()
                .iter()
                .enumerate()
                .map(|(i, period)| {
                    let amount = row
                        .and_then(|r| r.amounts.get(i).copied())
                        .unwrap_or(Decimal::ZERO);
                    (*period, amount)
                })
                .collect();
            if unit.geometry.is_none() {
                // Should not happen with a well-formed provider, but a gap
                // on the geometry side must not drop the row.
                warn!(id = %unit.id, "geometry missing for unit, keeping row");
            }
            MergedRecord {
                id: unit.id.clone(),
                name: unit.name.clone(),
                state: unit.state.clone(),
                country: row.and_then(|r| r.country.clone()),
                geometry: unit.geometry.clone(),
                total_sales: row.map(|r| r.total()).unwrap_or(Decimal::ZERO),
                period_sales,
                change: None,
            }
        })
        .collect::<Vec<_>>();

    debug!(rows = records.len(), matched, "merge complete");
    Ok(records)
}

/// Export merged records as a GeoJSON FeatureCollection for the renderer.
pub fn feature_collection(records: &[MergedRecord]) -> serde_json::Value {
    let features: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            let mut properties = serde_json::Map::new();
            properties.insert("id".to_string(), json!(record.id));
            properties.insert("name".to_string(), json!(record.name));
            properties.insert("state".to_string(), json!(record.state));
            properties.insert("country".to_string(), json!(record.country));
            properties.insert(
                "total_sales".to_string(),
                json!(record.total_sales.to_f64().unwrap_or(0.0)),
            );
            for (period, amount) in &record.period_sales {
                properties.insert(period.label(), json!(amount.to_f64().unwrap_or(0.0)));
            }
            if let Some(change) = &record.change {
                properties.insert(
                    "sales_avg".to_string(),
                    json!(change.sales_avg.to_f64().unwrap_or(0.0)),
                );
                properties.insert(
                    "sales_pct_change".to_string(),
                    json!(change.pct_change.to_f64().unwrap_or(0.0)),
                );
                properties.insert(
                    "normalized_weighted_pct_change".to_string(),
                    json!(change.normalized_weighted_pct_change.to_f64().unwrap_or(0.0)),
                );
            }
            json!({
                "type": "Feature",
                "geometry": record.geometry.as_ref().map(|g| g.0.clone()),
                "properties": properties,
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::config::TimeGranularity;
    use crate::ingest::Transaction;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::dec;
    use serde_json::json;

    fn unit(id: &str, name: &str) -> GeographicUnit {
        GeographicUnit {
            id: id.to_string(),
            name: name.to_string(),
            state: None,
            geometry: Some(Geometry(json!({
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            }))),
        }
    }

    fn matrix_for(postcode: &str, amount: Decimal) -> SalesMatrix {
        let transactions = vec![Transaction {
            created_at: Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap(),
            postcode: postcode.to_string(),
            province: Some("Victoria".to_string()),
            country: Some("Australia".to_string()),
            amount,
        }];
        aggregate(
            &transactions,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
            GroupLevel::Postcode,
            TimeGranularity::Month,
        )
        .unwrap()
    }

    #[test]
    fn every_geometry_row_survives() {
        let units = vec![unit("3000", "3000"), unit("3001", "3001"), unit("3002", "3002")];
        let matrix = matrix_for("3000", dec!(50));
        let records = merge(&units, &matrix, "zip").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].total_sales, dec!(50));
        assert_eq!(records[1].total_sales, Decimal::ZERO);
        assert_eq!(records[2].total_sales, Decimal::ZERO);
        // Zero-filled rows still carry the full period axis.
        assert_eq!(records[1].period_sales.len(), matrix.periods().len());
    }

    #[test]
    fn numeric_and_padded_keys_join_after_normalization() {
        // Boundary data carries "0800" while the matrix was keyed by the
        // unpadded numeric form.
        let units = vec![unit("800", "0800")];
        let matrix = matrix_for("0800", dec!(75));
        let records = merge(&units, &matrix, "zip").unwrap();
        assert_eq!(records[0].total_sales, dec!(75));
    }

    #[test]
    fn province_matrix_joins_on_unit_name() {
        let transactions = vec![Transaction {
            created_at: Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap(),
            postcode: "3000".to_string(),
            province: Some("Victoria".to_string()),
            country: Some("Australia".to_string()),
            amount: dec!(90),
        }];
        let matrix = aggregate(
            &transactions,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
            GroupLevel::Province,
            TimeGranularity::Month,
        )
        .unwrap();
        // State units carry the jurisdiction in their name column; the
        // accessor follows the matrix's grouping level.
        let units = vec![unit("2", "Victoria"), unit("3", "Queensland")];
        let records = merge(&units, &matrix, "province").unwrap();
        assert_eq!(records.len(), 2);
        let by_name: std::collections::HashMap<&str, &MergedRecord> =
            records.iter().map(|r| (r.name.as_str(), r)).collect();
        assert_eq!(by_name["Victoria"].total_sales, dec!(90));
        assert_eq!(by_name["Queensland"].total_sales, Decimal::ZERO);
    }

    #[test]
    fn wrong_sales_key_is_a_mismatch() {
        let units = vec![unit("3000", "3000")];
        let matrix = matrix_for("3000", dec!(10));
        let err = merge(&units, &matrix, "province").unwrap_err();
        assert_eq!(
            err,
            PipelineError::JoinKeyMismatch {
                field: "province".to_string(),
                side: "sales".to_string(),
            }
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let units = vec![unit("3000", "3000")];
        let matrix = matrix_for("3000", dec!(10));
        let err = merge(&units, &matrix, "suburb").unwrap_err();
        assert!(matches!(err, PipelineError::JoinKeyMismatch { side, .. } if side == "sales"));
    }

    #[test]
    fn missing_geometry_keeps_row_with_null_geometry() {
        let mut gapped = unit("3000", "3000");
        gapped.geometry = None;
        let matrix = matrix_for("3000", dec!(10));
        let records = merge(&[gapped], &matrix, "zip").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].geometry.is_none());
    }

    #[test]
    fn feature_collection_exports_period_columns() {
        let units = vec![unit("3000", "3000")];
        let matrix = matrix_for("3000", dec!(50));
        let records = merge(&units, &matrix, "zip").unwrap();
        let collection = feature_collection(&records);
        assert_eq!(collection["type"], "FeatureCollection");
        let properties = &collection["features"][0]["properties"];
        assert_eq!(properties["total_sales"], json!(50.0));
        assert_eq!(properties["Jan-2023"], json!(50.0));
        assert!(properties["geometry"].is_null());
        assert!(!collection["features"][0]["geometry"].is_null());
    }
}
