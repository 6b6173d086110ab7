// incident_ingestor/src/error.rs
// Error types shared by the reader, planner, writer and stores.

use thiserror::Error;

#[derive(Debug, Error,)]
pub enum IngestorError {
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String,),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String,),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error,),
    #[error("Failed to read CSV data: {0}")]
    CsvError(#[from] csv::Error,),
    #[error("Row {row} has no value for required field '{field}'")]
    MissingField { field: &'static str, row: usize, },
    #[error("'{0}' is not an allowed label or relationship type")]
    InvalidIdentifier(String,),
    #[error("Database specific error: {0}")]
    DatabaseError(String,),
    #[error("Batch failed while loading {file} ({rows_committed} rows committed): {source}")]
    BatchFailed {
        file:           String,
        rows_committed: usize,
        #[source]
        source:         Box<IngestorError,>,
    },
    #[error("Other error: {0}")]
    Other(String,),
}

impl IngestorError {
    pub fn is_transient(&self,) -> bool {
        match self {
            IngestorError::ConnectionError(_,) => true,
            IngestorError::DatabaseError(msg,) => {
                let m = msg.to_lowercase();
                m.contains("timeout",)
                    || m.contains("connection",)
                    || m.contains("service unavailable",)
                    || m.contains("connection reset",)
                    || m.contains("broken pipe",)
            },
            _ => false,
        }
    }
}

pub type Result<T,> = std::result::Result<T, IngestorError,>;
