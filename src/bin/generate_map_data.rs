use std::env;
use std::fs;

use chrono::NaiveDate;
use dotenvy::dotenv;
use eyre::{Result, WrapErr, eyre};

use sales_choropleth::colorscale::LinearColorScale;
use sales_choropleth::config::{CountryConfig, Resolution, TimeGranularity};
use sales_choropleth::geometry::{StaticGeometryProvider, units_from_feature_collection};
use sales_choropleth::ingest::{ColumnAliases, parse_rows};
use sales_choropleth::logging;
use sales_choropleth::merge::feature_collection;
use sales_choropleth::pipeline::{ChoroplethRequest, generate};

/// Runs the full aggregate -> merge -> change pipeline over a transaction
/// log and a boundary FeatureCollection, and writes the merged GeoJSON that
/// the map renderer consumes.
fn main() -> Result<()> {
    dotenv().ok();
    logging::init_logging();

    let log_path = env::var("SALES_LOG_PATH").unwrap_or_else(|_| "data/sales_log.json".to_string());
    let boundaries_path =
        env::var("BOUNDARIES_PATH").unwrap_or_else(|_| "data/boundaries.geojson".to_string());
    let output_path =
        env::var("MAP_DATA_PATH").unwrap_or_else(|_| "data/map_data.geojson".to_string());
    let resolution: Resolution = env::var("RESOLUTION")
        .unwrap_or_else(|_| "Postcode".to_string())
        .parse()?;

    let config = CountryConfig::australia();

    // Load and parse the transaction log
    let raw_log = fs::read_to_string(&log_path)
        .wrap_err_with(|| format!("reading transaction log {log_path}"))?;
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&raw_log).wrap_err("transaction log is not a JSON array of rows")?;
    let transactions = parse_rows(&rows, &ColumnAliases::default(), &config)?;
    println!("Parsed {} transactions", transactions.len());

    // Load the boundary layer
    let raw_boundaries = fs::read_to_string(&boundaries_path)
        .wrap_err_with(|| format!("reading boundaries {boundaries_path}"))?;
    let collection: serde_json::Value = serde_json::from_str(&raw_boundaries)?;
    let units = units_from_feature_collection(&collection, config.resolution(resolution)?);
    println!("Loaded {} boundary units", units.len());
    let provider = StaticGeometryProvider::new(config.clone()).with_layer(resolution, units);

    let request = ChoroplethRequest {
        included_jurisdictions: vec![
            "Queensland".to_string(),
            "Victoria".to_string(),
            "New South Wales".to_string(),
        ],
        granularity: TimeGranularity::Year,
        compare_years: Some((2023, 2024)),
        ..ChoroplethRequest::new(
            "Australia",
            resolution,
            NaiveDate::from_ymd_opt(2023, 1, 1).ok_or_else(|| eyre!("bad start date"))?,
            NaiveDate::from_ymd_opt(2024, 12, 31).ok_or_else(|| eyre!("bad end date"))?,
        )
    };

    let records = generate(&request, &provider, &transactions)?;
    println!("Merged {} regions", records.len());

    // Legend for the default coloring metric
    let totals: Vec<_> = records.iter().map(|r| r.total_sales).collect();
    let scale = LinearColorScale::fit("total_sales", &totals, false);
    println!("Color scale: {}", scale.caption);

    let geojson = feature_collection(&records);
    if let Some(parent) = std::path::Path::new(&output_path).parent() {
        fs::create_dir_all(parent).wrap_err("creating output directory")?;
    }
    fs::write(&output_path, serde_json::to_string(&geojson)?)
        .wrap_err_with(|| format!("writing {output_path}"))?;
    println!("Wrote merged map data to {output_path}");
    Ok(())
}
