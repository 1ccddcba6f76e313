use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    Credential(String),

    #[error("Warehouse query failed: {0}")]
    Query(String),

    #[error("Query returned zero rows; nothing to map")]
    EmptyResult,

    #[error("County {0} has a response count of 0; upstream contract breach")]
    ZeroCountInvariant(String),

    #[error("Boundary fetch failed after retry: {0}")]
    BoundaryFetch(String),

    #[error("Boundary document malformed: {0}")]
    BoundaryParse(String),

    #[error("Render failed: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;
