//! Product and quantity prediction service for ERP sales data.
//!
//! A [`PredictionPipeline`] resolves missing price/cost attributes from
//! historical records, encodes the categorical inputs, runs a product
//! classifier followed by a quantity regressor, and decodes the result.
//! The models sit behind the [`ProductModel`] and [`QuantityModel`] traits;
//! [`OnnxModel`] runs scikit-learn estimators exported to ONNX.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use salescast::{
//!     load_dataset, ArtifactManager, OnnxModel, PredictionPipeline, PredictionRequest, RuntimeConfig,
//! };
//!
//! let manager = ArtifactManager::new("models")?;
//! let (encoders, table) = load_dataset(
//!     "data/ERP_dataset_new.csv",
//!     "windows-1252",
//!     Some(manager.encoders_path().as_path()),
//! )?;
//! let config = RuntimeConfig::default();
//! let pipeline = PredictionPipeline::builder(encoders, table)
//!     .with_product_model(Arc::new(OnnxModel::load(manager.product_model_path(), &config)?))
//!     .with_quantity_model(Arc::new(OnnxModel::load(manager.quantity_model_path(), &config)?))
//!     .build()?;
//!
//! let prediction = pipeline.predict(&PredictionRequest {
//!     customer_name: "Béatrice Ben Salah".into(),
//!     category_name: "Café en grains entiers".into(),
//!     favorite_category: Some("Café moulu".into()),
//!     ..Default::default()
//! })?;
//! println!("{} x{}", prediction.predicted_product, prediction.predicted_quantity);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The pipeline is `Send + Sync`. Encoders, records and models are immutable
//! after construction; the prediction log is mutex-protected.

pub mod artifact_manager;
pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prediction_log;
pub mod resolver;
mod runtime;
pub mod server;

pub use artifact_manager::{ArtifactInfo, ArtifactManager, Manifest};
pub use config::{Args, ServerConfig};
pub use dataset::{load_dataset, HistoricalRecord, HistoricalTable, RawRecord};
pub use encoder::{Encoders, Field, LabelEncoder};
pub use error::{ArtifactError, DatasetError, ModelError, PredictionError};
pub use model::{OnnxModel, ProductModel, QuantityModel};
pub use pipeline::{
    CustomerPrediction, Prediction, PredictionPipeline, PredictionRequest, ProductPrediction,
    Quantity, QuantityPrediction, QuantityRequest, UNKNOWN_QUANTITY,
};
pub use prediction_log::{InMemoryPredictionLog, PredictionLog, PredictionLogEntry};
pub use resolver::{FeatureResolver, RowSelection};
pub use runtime::{create_session_builder, OptimizationLevel, RuntimeConfig};

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
