use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Required column '{0}' not found in input file")]
    MissingColumn(String),

    #[error("No data for the selected filters")]
    EmptySelection,

    #[error("No usable rows in input file")]
    NoData,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
