pub mod generator;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CountryConfig;
use crate::errors::PipelineError;
use crate::geography;

/// One ingested transaction. Immutable once built; only the sales
/// aggregator consumes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub created_at: DateTime<Utc>,
    /// Canonical 4-digit postcode.
    pub postcode: String,
    /// Provided by the source, or derived from the postcode range table.
    pub province: Option<String>,
    pub country: Option<String>,
    /// Currency amount, 2-decimal precision.
    pub amount: Decimal,
}

/// Column aliases mapping the source's tabular headers onto transaction
/// fields. The near-duplicate aggregation variants in older exports differ
/// only in these names, so they collapse into configuration here.
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    pub date_field: String,
    pub id_field: String,
    pub amount_field: String,
    pub province_field: Option<String>,
    pub country_field: Option<String>,
}

impl Default for ColumnAliases {
    /// Matches the standard export headers:
    /// `created_at`, `zip`, `province`, `country`, `total_price`.
    fn default() -> Self {
        Self {
            date_field: "created_at".to_string(),
            id_field: "zip".to_string(),
            amount_field: "total_price".to_string(),
            province_field: Some("province".to_string()),
            country_field: Some("country".to_string()),
        }
    }
}

impl ColumnAliases {
    /// The legacy raw-log variant: `date`, `postcode`, `transaction value`,
    /// no province or country columns.
    pub fn legacy() -> Self {
        Self {
            date_field: "date".to_string(),
            id_field: "postcode".to_string(),
            amount_field: "transaction value".to_string(),
            province_field: None,
            country_field: None,
        }
    }

    fn required(&self) -> Vec<&str> {
        let mut required = vec![
            self.date_field.as_str(),
            self.id_field.as_str(),
            self.amount_field.as_str(),
        ];
        if let Some(province) = &self.province_field {
            required.push(province);
        }
        if let Some(country) = &self.country_field {
            required.push(country);
        }
        required
    }
}

/// Parse tabular rows (JSON objects, one per transaction) into transactions.
///
/// Fails with `SchemaError` naming every missing required column before any
/// row is converted. Postcodes are normalized to 4 digits; a missing
/// province is derived from the shared postcode range table.
#[instrument(skip(rows, config), fields(rows = rows.len()))]
pub fn parse_rows(
    rows: &[serde_json::Value],
    aliases: &ColumnAliases,
    config: &CountryConfig,
) -> Result<Vec<Transaction>, PipelineError> {
    let required = aliases.required();
    let present: Vec<&str> = rows
        .first()
        .and_then(|row| row.as_object())
        .map(|obj| obj.keys().map(|k| k.as_str()).collect())
        .unwrap_or_default();
    let missing: Vec<String> = required
        .iter()
        .filter(|column| !present.contains(*column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::SchemaError {
            missing,
            expected: required.iter().map(|c| c.to_string()).collect(),
        });
    }

    let mut transactions = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .ok_or_else(|| PipelineError::MalformedRow {
                row: index,
                column: String::new(),
                reason: "row is not an object".to_string(),
            })?;

        let created_at = parse_timestamp(index, &aliases.date_field, obj.get(&aliases.date_field))?;
        let postcode = geography::normalize_postcode(&string_value(
            index,
            &aliases.id_field,
            obj.get(&aliases.id_field),
        )?);
        let amount = parse_amount(index, &aliases.amount_field, obj.get(&aliases.amount_field))?;

        let province = match &aliases.province_field {
            Some(field) => Some(string_value(index, field, obj.get(field))?),
            None => geography::resolve_province(config, &postcode).map(|p| p.to_string()),
        };
        let country = match &aliases.country_field {
            Some(field) => Some(string_value(index, field, obj.get(field))?),
            None => None,
        };

        transactions.push(Transaction {
            created_at,
            postcode,
            province,
            country,
            amount,
        });
    }
    debug!(parsed = transactions.len(), "transaction log parsed");
    Ok(transactions)
}

fn string_value(
    row: usize,
    column: &str,
    value: Option<&serde_json::Value>,
) -> Result<String, PipelineError> {
    match value {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        other => Err(PipelineError::MalformedRow {
            row,
            column: column.to_string(),
            reason: format!("expected a string, got {other:?}"),
        }),
    }
}

// Timestamps arrive in mixed formats depending on the export tool.
fn parse_timestamp(
    row: usize,
    column: &str,
    value: Option<&serde_json::Value>,
) -> Result<DateTime<Utc>, PipelineError> {
    let raw = string_value(row, column, value)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(PipelineError::MalformedRow {
        row,
        column: column.to_string(),
        reason: format!("unrecognized timestamp '{raw}'"),
    })
}

fn parse_amount(
    row: usize,
    column: &str,
    value: Option<&serde_json::Value>,
) -> Result<Decimal, PipelineError> {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.to_string().parse::<Decimal>().ok(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    parsed
        .map(|amount| amount.round_dp(2))
        .ok_or_else(|| PipelineError::MalformedRow {
            row,
            column: column.to_string(),
            reason: format!("cannot parse amount {value:?}"),
        })
}
