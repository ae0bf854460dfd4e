//! Synthetic transaction-log generator for development and testing.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use rust_decimal::prelude::*;
use tracing::info;

use crate::config::CountryConfig;
use crate::geography;
use crate::ingest::Transaction;

/// Generate `count` random transactions uniformly spread over
/// `[start, end]`, with random 4-digit postcodes, provinces derived from
/// the shared range table, and amounts between $0.01 and $1000.
pub fn generate_transaction_log(
    config: &CountryConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<Transaction> {
    let window_seconds = (end - start).num_seconds().max(0);
    let seconds = Uniform::new_inclusive(0, window_seconds)
        .expect("transaction window must be non-negative");
    let amounts = Uniform::new(0.01f64, 1000.0).expect("amount bounds are fixed");

    let mut transactions: Vec<Transaction> = (0..count)
        .map(|_| {
            let created_at = start + Duration::seconds(seconds.sample(rng));
            let postcode = format!("{:04}", rng.random_range(1000..5000));
            let province = geography::resolve_province(config, &postcode).map(|p| p.to_string());
            let amount = Decimal::from_f64(amounts.sample(rng))
                .unwrap_or(Decimal::ZERO)
                .round_dp(2);
            Transaction {
                created_at,
                postcode,
                province,
                country: Some(config.country.to_string()),
                amount,
            }
        })
        .collect();
    transactions.sort_by_key(|t| t.created_at);
    info!(count = transactions.len(), "generated synthetic transaction log");
    transactions
}
