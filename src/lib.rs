pub mod aggregate;
pub mod change;
pub mod colorscale;
pub mod config;
pub mod errors;
pub mod geography;
pub mod geometry;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod pipeline;
