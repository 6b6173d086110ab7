// incident_ingestor/src/lib.rs
// Public API for loading road-incident exports into a property graph.

pub mod cli;
pub mod discovery;
pub mod error;
pub mod ingestor;
pub mod keys;
pub mod memory;
pub mod neo4j;
pub mod normalizer;
pub mod plan;
pub mod retry;
pub mod schema;
pub mod store;
pub mod writer;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_REPORT_PATH: &str = "ingestion_report.json";
