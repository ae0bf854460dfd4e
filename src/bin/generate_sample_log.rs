use std::env;
use std::fs;

use chrono::{TimeZone, Utc};
use dotenvy::dotenv;
use eyre::{Result, WrapErr};

use sales_choropleth::config::CountryConfig;
use sales_choropleth::ingest::generator::generate_transaction_log;
use sales_choropleth::logging;

/// Writes a synthetic transaction log as a JSON array of rows with the
/// standard export headers, for feeding into generate_map_data.
fn main() -> Result<()> {
    dotenv().ok();
    logging::init_logging();

    let count: usize = env::var("SAMPLE_LOG_TRANSACTIONS")
        .unwrap_or_else(|_| "1000".to_string())
        .parse()
        .wrap_err("SAMPLE_LOG_TRANSACTIONS must be an integer")?;
    let output = env::var("SAMPLE_LOG_PATH").unwrap_or_else(|_| "data/sales_log.json".to_string());

    let config = CountryConfig::australia();
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();

    let mut rng = rand::rng();
    let transactions = generate_transaction_log(&config, start, end, count, &mut rng);

    // Rows use the standard export headers so the default column aliases apply.
    let rows: Vec<serde_json::Value> = transactions
        .iter()
        .map(|t| {
            serde_json::json!({
                "created_at": t.created_at.to_rfc3339(),
                "zip": t.postcode,
                "province": t.province.clone().unwrap_or_else(|| "Unknown".to_string()),
                "country": t.country,
                "total_price": t.amount,
            })
        })
        .collect();

    if let Some(parent) = std::path::Path::new(&output).parent() {
        fs::create_dir_all(parent).wrap_err("creating output directory")?;
    }
    fs::write(&output, serde_json::to_string_pretty(&rows)?)
        .wrap_err_with(|| format!("writing {output}"))?;
    println!("Wrote {} transactions to {}", rows.len(), output);
    Ok(())
}
