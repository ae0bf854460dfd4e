use std::collections::{HashMap, HashSet};

use rust_decimal::{Decimal, MathematicalOps, dec};
use serde::Serialize;
use tracing::instrument;

/// Exponent controlling how strongly high-volume regions dominate the
/// blended ranking: 0 is unweighted, 1 is fully volume-proportional.
pub const DEFAULT_ALPHA: Decimal = dec!(0.5);

/// Derived year-over-year change columns for one geographic unit.
/// Recomputed on every request; nothing persists across calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeMetrics {
    /// Arithmetic mean of the two period aggregates being compared.
    pub sales_avg: Decimal,
    /// Relative change in percent; zero when the average is zero.
    pub pct_change: Decimal,
    /// `sales_avg ^ alpha`.
    pub weight: Decimal,
    /// Intermediate scaled score. The scale is non-standard (an extra x100
    /// on an already-percentage value after rounding) and is preserved for
    /// output compatibility; it is only comparable after normalization.
    pub weighted_pct_change: Decimal,
    /// `weighted_pct_change / sum(weight)`, rounded to 2 decimal places.
    /// The externally meaningful, cross-region comparable score.
    pub normalized_weighted_pct_change: Decimal,
}

/// Compute plain and sales-weighted percentage change per geographic key
/// from two period aggregates. Keys absent from one side are floored to
/// zero, never propagated as missing.
#[instrument(skip(baseline, comparison), fields(baseline_rows = baseline.len(), comparison_rows = comparison.len(), %alpha))]
pub fn compute_change(
    baseline: &HashMap<String, Decimal>,
    comparison: &HashMap<String, Decimal>,
    alpha: Decimal,
) -> HashMap<String, ChangeMetrics> {
    let keys: HashSet<&String> = baseline.keys().chain(comparison.keys()).collect();

    let mut metrics: HashMap<String, ChangeMetrics> = HashMap::with_capacity(keys.len());
    let mut total_weight = Decimal::ZERO;
    for key in keys {
        let b = baseline.get(key).copied().unwrap_or(Decimal::ZERO);
        let c = comparison.get(key).copied().unwrap_or(Decimal::ZERO);
        let sales_avg = (b + c) / dec!(2);
        // Floor-at-zero policy for empty regions, not an error.
        let pct_change = if sales_avg.is_zero() {
            Decimal::ZERO
        } else {
            (c - b) / sales_avg * dec!(100)
        };
        let weight = if alpha.is_zero() {
            Decimal::ONE
        } else if sales_avg.is_zero() {
            Decimal::ZERO
        } else {
            sales_avg.powd(alpha)
        };
        let weighted_pct_change = (pct_change * weight).round_dp(0) * dec!(100);
        total_weight += weight;
        metrics.insert(
            key.clone(),
            ChangeMetrics {
                sales_avg,
                pct_change,
                weight,
                weighted_pct_change,
                normalized_weighted_pct_change: Decimal::ZERO,
            },
        );
    }

    // Zero fallback when every row's average is zero.
    for row in metrics.values_mut() {
        row.normalized_weighted_pct_change = if total_weight.is_zero() {
            Decimal::ZERO
        } else {
            (row.weighted_pct_change / total_weight).round_dp(2)
        };
    }
    metrics
}
