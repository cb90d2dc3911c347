use std::io;

use crate::encoder::Field;

/// Errors raised while running a model over a feature batch.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The ONNX session could not be created or loaded
    #[error("Failed to load model: {0}")]
    Load(String),
    /// The model failed while running a batch
    #[error("Failed to run model: {0}")]
    Run(String),
    /// The model returned a different number of outputs than input rows
    #[error("Model returned {actual} outputs for {expected} rows")]
    OutputMismatch { expected: usize, actual: usize },
    /// The classifier produced a label code outside of the product table
    #[error("Model produced invalid {field} code {code}")]
    InvalidCode { field: Field, code: i64 },
}

impl From<ort::Error> for ModelError {
    fn from(err: ort::Error) -> Self {
        ModelError::Run(err.to_string())
    }
}

/// Errors surfaced to callers of the prediction pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Unknown value '{value}' for {field}")]
    UnknownCategoricalValue { field: Field, value: String },
    #[error("No historical record for customer '{customer}', category '{category}'{}", product_suffix(.product))]
    NoMatchingRecord {
        customer: String,
        category: String,
        product: Option<String>,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn product_suffix(product: &Option<String>) -> String {
    match product {
        Some(product) => format!(", product '{}'", product),
        None => String::new(),
    }
}

/// Errors raised while loading the historical dataset or encoder tables.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported text encoding: {0}")]
    UnknownEncoding(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Encoder file error: {0}")]
    EncoderFile(#[from] serde_json::Error),
    #[error("Duplicate label '{label}' in {field} table")]
    DuplicateLabel { field: Field, label: String },
    #[error("Row {row}: unknown value '{value}' for {field}")]
    UnknownValue { row: usize, field: Field, value: String },
    #[error("Dataset contains no records")]
    Empty,
}

/// Errors raised while locating, fetching or verifying model artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("Invalid artifact path {0}: must be a plain path inside the artifacts directory")]
    InvalidPath(String),
    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}
