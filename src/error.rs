use thiserror::Error;

/// Errors raised while loading a dataset, building the dashboard or serving it.
///
/// Schema violations and an unavailable data source are fatal at startup.
/// An empty selection is never an error; it yields empty tables.
#[derive(Debug, Error)]
pub enum Error {
    /// The input table is missing a required column or holds a value of the
    /// wrong type for one.
    #[error("schema violation: {0}")]
    Schema(String),

    /// Both the primary and the fallback source failed.
    #[error("no data source available (primary: {primary}; fallback: {fallback})")]
    SourceUnavailable { primary: String, fallback: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("unknown input cell `{0}`")]
    UnknownInput(String),

    #[error("input cell `{cell}` expects a {expected} value")]
    InputType { cell: String, expected: &'static str },

    #[error("unknown output `{0}`")]
    UnknownOutput(String),

    #[error("invalid metric `{0}` (expected cases_per_million or deaths_per_million)")]
    InvalidMetric(String),

    /// Rule graph or runtime configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, Error>;
