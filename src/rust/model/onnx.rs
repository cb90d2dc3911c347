use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;

use super::{ProductModel, QuantityModel};
use crate::error::ModelError;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// A scikit-learn estimator exported to ONNX, run through ONNX Runtime.
///
/// The model is expected to:
/// - Take one float input of shape `[batch_size, n_features]`
/// - Produce its prediction as the first output, one value per row
///   (`label` for classifiers, `variable` for regressors in skl2onnx exports)
///
/// The session is shared behind an `Arc`, so the model is `Send + Sync` and
/// can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct OnnxModel {
    pub model_path: String,
    session: Arc<Session>,
    input_name: String,
    n_features: Option<usize>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxModel>();
    }
};

impl OnnxModel {
    /// Loads an ONNX model file and validates its structure
    pub fn load<P: AsRef<Path>>(path: P, config: &RuntimeConfig) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::Load(format!("Model file not found: {}", path.display())));
        }

        let session = create_session_builder(config)?
            .commit_from_file(path)
            .map_err(|e| {
                error!("Failed to load model {:?}: {}", path, e);
                ModelError::Load(e.to_string())
            })?;

        Self::validate_model(&session)?;

        let input = &session.inputs[0];
        let input_name = input.name.clone();
        let n_features = input
            .input_type
            .tensor_dimensions()
            .and_then(|dims| dims.last().copied())
            .and_then(|dim| usize::try_from(dim).ok());
        info!(
            "Loaded model {:?} (input '{}', features: {:?})",
            path, input_name, n_features
        );

        Ok(Self {
            model_path: path.to_string_lossy().to_string(),
            session: Arc::new(session),
            input_name,
            n_features,
        })
    }

    fn validate_model(session: &Session) -> Result<(), ModelError> {
        if session.inputs.is_empty() {
            return Err(ModelError::Load("Model has no inputs".into()));
        }
        if session.outputs.is_empty() {
            return Err(ModelError::Load("Model has no outputs".into()));
        }
        Ok(())
    }

    /// Number of features per row declared by the model, when it has a fixed width
    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn check_width(&self, rows: &Array2<f32>) -> Result<(), ModelError> {
        match self.n_features {
            Some(expected) if expected != rows.ncols() => Err(ModelError::Run(format!(
                "Model {} expects {} features per row, got {}",
                self.model_path,
                expected,
                rows.ncols()
            ))),
            _ => Ok(()),
        }
    }

    fn input_tensor(rows: &Array2<f32>) -> Result<Tensor<f32>, ModelError> {
        let input_dyn = rows.clone().into_dyn();
        let input = input_dyn.as_standard_layout();
        Tensor::from_array(&input)
            .map_err(|e| ModelError::Run(format!("Failed to create input tensor: {}", e)))
    }

    fn check_len<T>(values: Vec<T>, expected: usize) -> Result<Vec<T>, ModelError> {
        if values.len() != expected {
            return Err(ModelError::OutputMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

impl ProductModel for OnnxModel {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<i64>, ModelError> {
        self.check_width(rows)?;
        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), Self::input_tensor(rows)?);

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ModelError::Run(format!("Failed to run model: {}", e)))?;

        // Integer labels are the norm; some exports emit float labels instead
        let labels: Vec<i64> = match outputs[0].try_extract_tensor::<i64>() {
            Ok(labels) => labels.iter().copied().collect(),
            Err(_) => outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::Run(format!("Failed to extract label tensor: {}", e)))?
                .iter()
                .map(|&label| label.round() as i64)
                .collect(),
        };
        debug!("Classified {} rows", labels.len());

        Self::check_len(labels, rows.nrows())
    }
}

impl QuantityModel for OnnxModel {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<f32>, ModelError> {
        self.check_width(rows)?;
        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), Self::input_tensor(rows)?);

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ModelError::Run(format!("Failed to run model: {}", e)))?;
        let values: Vec<f32> = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Run(format!("Failed to extract output tensor: {}", e)))?
            .iter()
            .copied()
            .collect();
        debug!("Regressed {} rows", values.len());

        Self::check_len(values, rows.nrows())
    }
}
