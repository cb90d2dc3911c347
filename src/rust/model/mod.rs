//! Model seam of the pipeline.
//!
//! The serving code only needs two black-box functions over small numeric
//! feature batches: a classifier that maps a row to a product code and a
//! regressor that maps a row to a quantity. [`OnnxModel`] implements both on
//! top of ONNX Runtime; tests plug in in-process implementations.

mod onnx;

use ndarray::{Array2, ArrayView1};

use crate::error::ModelError;

pub use onnx::OnnxModel;

/// Width of a product classifier row:
/// `[customer, category, price, cost, favorite_category]`
pub const PRODUCT_FEATURES: usize = 5;

/// Width of a quantity regressor row:
/// `[product, customer, category, price, cost, favorite_category]`
pub const QUANTITY_FEATURES: usize = 6;

/// Predicts a product code for each row of a `[n, PRODUCT_FEATURES]` batch.
pub trait ProductModel: Send + Sync {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<i64>, ModelError>;
}

/// Predicts a quantity for each row of a `[n, QUANTITY_FEATURES]` batch.
pub trait QuantityModel: Send + Sync {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<f32>, ModelError>;
}

/// Encoded inputs of the product classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductFeatures {
    pub customer: i64,
    pub category: i64,
    pub price: f32,
    pub cost: f32,
    pub favorite_category: i64,
}

impl ProductFeatures {
    pub fn to_row(&self) -> [f32; PRODUCT_FEATURES] {
        [
            self.customer as f32,
            self.category as f32,
            self.price,
            self.cost,
            self.favorite_category as f32,
        ]
    }

    /// Adds the product code in front, giving the regressor's feature order.
    pub fn with_product(&self, product: i64) -> QuantityFeatures {
        QuantityFeatures {
            product,
            customer: self.customer,
            category: self.category,
            price: self.price,
            cost: self.cost,
            favorite_category: self.favorite_category,
        }
    }
}

/// Encoded inputs of the quantity regressor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantityFeatures {
    pub product: i64,
    pub customer: i64,
    pub category: i64,
    pub price: f32,
    pub cost: f32,
    pub favorite_category: i64,
}

impl QuantityFeatures {
    pub fn to_row(&self) -> [f32; QUANTITY_FEATURES] {
        [
            self.product as f32,
            self.customer as f32,
            self.category as f32,
            self.price,
            self.cost,
            self.favorite_category as f32,
        ]
    }
}

/// Stacks fixed-width rows into a batch
pub fn batch<const N: usize>(rows: &[[f32; N]]) -> Array2<f32> {
    Array2::from_shape_fn((rows.len(), N), |(i, j)| rows[i][j])
}

/// Reads a categorical code back out of a float feature column.
pub fn feature_code(row: ArrayView1<'_, f32>, column: usize) -> i64 {
    row[column].round() as i64
}

/// Runs the classifier over a single row.
pub fn predict_product(model: &dyn ProductModel, features: &ProductFeatures) -> Result<i64, ModelError> {
    let outputs = model.predict(&batch(&[features.to_row()]))?;
    single(outputs)
}

/// Runs the regressor over a single row.
pub fn predict_quantity(model: &dyn QuantityModel, features: &QuantityFeatures) -> Result<f32, ModelError> {
    let outputs = model.predict(&batch(&[features.to_row()]))?;
    single(outputs)
}

fn single<T>(outputs: Vec<T>) -> Result<T, ModelError> {
    let actual = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), actual) {
        (Some(value), 1) => Ok(value),
        _ => Err(ModelError::OutputMismatch { expected: 1, actual }),
    }
}
