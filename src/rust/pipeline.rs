use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize, Serializer};

use crate::dataset::{HistoricalRecord, HistoricalTable};
use crate::encoder::{Encoders, Field};
use crate::error::{ModelError, PredictionError};
use crate::model::{self, ProductFeatures, ProductModel, QuantityModel};
use crate::prediction_log::{InMemoryPredictionLog, PredictionLog, PredictionLogEntry};
use crate::resolver::{FeatureResolver, RowSelection};

/// Sentinel reported by the bulk sweep when no quantity can be predicted.
pub const UNKNOWN_QUANTITY: &str = "Inconnu";

/// Body of `/predict` and `/predict_product`.
///
/// Price, cost and favorite category are looked up in the historical
/// records when omitted; supplied values always win.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PredictionRequest {
    pub customer_name: String,
    pub category_name: String,
    pub favorite_category: Option<String>,
    pub product_name: Option<String>,
    pub price: Option<f32>,
    pub cost: Option<f32>,
}

/// Body of `/predict_quantity`; the product is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuantityRequest {
    pub product_name: String,
    pub customer_name: String,
    pub category_name: String,
    pub favorite_category: Option<String>,
    pub price: Option<f32>,
    pub cost: Option<f32>,
}

impl From<QuantityRequest> for PredictionRequest {
    fn from(request: QuantityRequest) -> Self {
        Self {
            customer_name: request.customer_name,
            category_name: request.category_name,
            favorite_category: request.favorite_category,
            product_name: Some(request.product_name),
            price: request.price,
            cost: request.cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Prediction {
    pub predicted_product: String,
    pub predicted_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductPrediction {
    pub predicted_product: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuantityPrediction {
    pub predicted_quantity: i64,
}

/// A bulk-sweep quantity: a number, or the `"Inconnu"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Known(i64),
    Unknown,
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quantity::Known(quantity) => serializer.serialize_i64(*quantity),
            Quantity::Unknown => serializer.serialize_str(UNKNOWN_QUANTITY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerPrediction {
    pub customer_name: String,
    pub predicted_product: String,
    pub predicted_quantity: Quantity,
}

/// Converts a regressor output to a quantity: truncated toward zero, never negative.
pub fn to_quantity(value: f32) -> i64 {
    (value.trunc() as i64).max(0)
}

fn record_features(record: &HistoricalRecord) -> ProductFeatures {
    ProductFeatures {
        customer: record.customer,
        category: record.category,
        price: record.price,
        cost: record.cost,
        favorite_category: record.favorite_category,
    }
}

/// Most frequent code; ties go to the smallest code.
pub fn majority_vote(codes: &[i64]) -> Option<i64> {
    let mut counts = BTreeMap::new();
    for &code in codes {
        *counts.entry(code).or_insert(0usize) += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (code, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((code, count));
        }
    }
    best.map(|(code, _)| code)
}

/// The prediction façade: resolves missing attributes, encodes inputs, runs the
/// product classifier then the quantity regressor, and decodes the result.
///
/// All state except the prediction log is immutable, so one pipeline can be
/// shared across request handlers behind an `Arc`.
pub struct PredictionPipeline {
    encoders: Arc<Encoders>,
    resolver: FeatureResolver,
    product_model: Arc<dyn ProductModel>,
    quantity_model: Arc<dyn QuantityModel>,
    log: Arc<dyn PredictionLog>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<PredictionPipeline>();
    }
};

impl PredictionPipeline {
    pub fn builder(encoders: Encoders, table: HistoricalTable) -> PipelineBuilder {
        PipelineBuilder::new(encoders, table)
    }

    pub fn encoders(&self) -> &Encoders {
        &self.encoders
    }

    pub fn table(&self) -> &HistoricalTable {
        self.resolver.table()
    }

    pub fn prediction_log(&self) -> &Arc<dyn PredictionLog> {
        &self.log
    }

    /// Predicts product and quantity, and records the result in the prediction log.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError> {
        let features = self.features(request)?;
        let product = model::predict_product(self.product_model.as_ref(), &features)?;
        let predicted_product = self.decode(Field::Product, product)?.to_string();

        let quantity = model::predict_quantity(self.quantity_model.as_ref(), &features.with_product(product))?;
        let prediction = Prediction {
            predicted_product,
            predicted_quantity: to_quantity(quantity),
        };
        debug!(
            "Predicted {:?} x{} for {}",
            prediction.predicted_product, prediction.predicted_quantity, request.customer_name
        );

        self.log.append(PredictionLogEntry {
            customer_name: request.customer_name.clone(),
            predicted_product: prediction.predicted_product.clone(),
            predicted_quantity: prediction.predicted_quantity,
        });
        Ok(prediction)
    }

    pub fn predict_product(&self, request: &PredictionRequest) -> Result<ProductPrediction, PredictionError> {
        let features = self.features(request)?;
        let product = model::predict_product(self.product_model.as_ref(), &features)?;
        Ok(ProductPrediction {
            predicted_product: self.decode(Field::Product, product)?.to_string(),
        })
    }

    pub fn predict_quantity(&self, request: &QuantityRequest) -> Result<QuantityPrediction, PredictionError> {
        let features = self.features(&PredictionRequest::from(request.clone()))?;
        let product = self.encoders.encode(Field::Product, &request.product_name)?;
        let quantity = model::predict_quantity(self.quantity_model.as_ref(), &features.with_product(product))?;
        Ok(QuantityPrediction {
            predicted_quantity: to_quantity(quantity),
        })
    }

    /// Predicts the majority product and its quantity for every customer in
    /// the historical records, in order of first appearance.
    pub fn predict_all(&self) -> Result<Vec<CustomerPrediction>, PredictionError> {
        let table = self.table();
        let customers = table.customers();
        info!("Running bulk prediction for {} customers", customers.len());

        let mut results = Vec::with_capacity(customers.len());
        for customer in customers {
            let rows: Vec<_> = table
                .for_customer(customer)
                .map(|r| record_features(r).to_row())
                .collect();
            let products = self.product_model.predict(&model::batch(&rows))?;
            let mismatch = ModelError::OutputMismatch {
                expected: rows.len(),
                actual: products.len(),
            };
            if products.len() != rows.len() {
                return Err(mismatch.into());
            }
            let product = majority_vote(&products).ok_or(mismatch)?;

            let quantity = match table
                .for_customer(customer)
                .find(|r| r.product == product)
            {
                Some(r) => {
                    let features = record_features(r).with_product(r.product);
                    let value = model::predict_quantity(self.quantity_model.as_ref(), &features)?;
                    Quantity::Known(to_quantity(value))
                }
                None => Quantity::Unknown,
            };

            results.push(CustomerPrediction {
                customer_name: self.decode(Field::Customer, customer)?.to_string(),
                predicted_product: self.decode(Field::Product, product)?.to_string(),
                predicted_quantity: quantity,
            });
        }
        Ok(results)
    }

    pub fn predictions(&self) -> Vec<PredictionLogEntry> {
        self.log.entries()
    }

    /// Labels present in the historical records for one column, in code order
    pub fn distinct_labels(&self, field: Field) -> Vec<String> {
        self.table()
            .distinct_codes(field)
            .into_iter()
            .filter_map(|code| self.encoders.decode(field, code).map(str::to_string))
            .collect()
    }

    pub fn customers(&self) -> Vec<String> {
        self.distinct_labels(Field::Customer)
    }

    pub fn products(&self) -> Vec<String> {
        self.distinct_labels(Field::Product)
    }

    pub fn categories(&self) -> Vec<String> {
        self.distinct_labels(Field::Category)
    }

    fn decode(&self, field: Field, code: i64) -> Result<&str, ModelError> {
        self.encoders
            .decode(field, code)
            .ok_or(ModelError::InvalidCode { field, code })
    }

    /// Encodes the request and fills in missing attributes from the historical records.
    fn features(&self, request: &PredictionRequest) -> Result<ProductFeatures, PredictionError> {
        let customer = self.encoders.encode(Field::Customer, &request.customer_name)?;
        let category = self.encoders.encode(Field::Category, &request.category_name)?;
        let favorite = request
            .favorite_category
            .as_deref()
            .map(|favorite| self.encoders.encode(Field::FavoriteCategory, favorite))
            .transpose()?;
        let product = request
            .product_name
            .as_deref()
            .map(|product| self.encoders.encode(Field::Product, product))
            .transpose()?;

        let features = match (request.price, request.cost, favorite) {
            (Some(price), Some(cost), Some(favorite_category)) => ProductFeatures {
                customer,
                category,
                price,
                cost,
                favorite_category,
            },
            _ => {
                let resolved = self.resolver.resolve(customer, category, product).ok_or_else(|| {
                    warn!(
                        "No historical record for {} / {} / {:?}",
                        request.customer_name, request.category_name, request.product_name
                    );
                    PredictionError::NoMatchingRecord {
                        customer: request.customer_name.clone(),
                        category: request.category_name.clone(),
                        product: request.product_name.clone(),
                    }
                })?;
                ProductFeatures {
                    customer,
                    category,
                    price: request.price.unwrap_or(resolved.price),
                    cost: request.cost.unwrap_or(resolved.cost),
                    favorite_category: favorite.unwrap_or(resolved.favorite_category),
                }
            }
        };
        Ok(features)
    }
}

/// Fluent construction of a [`PredictionPipeline`].
pub struct PipelineBuilder {
    encoders: Encoders,
    table: HistoricalTable,
    product_model: Option<Arc<dyn ProductModel>>,
    quantity_model: Option<Arc<dyn QuantityModel>>,
    log: Option<Arc<dyn PredictionLog>>,
    row_selection: RowSelection,
}

impl PipelineBuilder {
    pub fn new(encoders: Encoders, table: HistoricalTable) -> Self {
        Self {
            encoders,
            table,
            product_model: None,
            quantity_model: None,
            log: None,
            row_selection: RowSelection::default(),
        }
    }

    pub fn with_product_model(mut self, model: Arc<dyn ProductModel>) -> Self {
        self.product_model = Some(model);
        self
    }

    pub fn with_quantity_model(mut self, model: Arc<dyn QuantityModel>) -> Self {
        self.quantity_model = Some(model);
        self
    }

    /// Replaces the default in-memory prediction log
    pub fn with_prediction_log(mut self, log: Arc<dyn PredictionLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_row_selection(mut self, selection: RowSelection) -> Self {
        self.row_selection = selection;
        self
    }

    /// Fails when either model is missing.
    pub fn build(self) -> Result<PredictionPipeline, ModelError> {
        let product_model = self
            .product_model
            .ok_or_else(|| ModelError::Load("Product model not set".into()))?;
        let quantity_model = self
            .quantity_model
            .ok_or_else(|| ModelError::Load("Quantity model not set".into()))?;

        info!(
            "Pipeline ready: {} records, {} customers, {} products, row selection {:?}",
            self.table.len(),
            self.encoders.table(Field::Customer).len(),
            self.encoders.table(Field::Product).len(),
            self.row_selection
        );

        Ok(PredictionPipeline {
            encoders: Arc::new(self.encoders),
            resolver: FeatureResolver::new(Arc::new(self.table), self.row_selection),
            product_model,
            quantity_model,
            log: self
                .log
                .unwrap_or_else(|| Arc::new(InMemoryPredictionLog::new())),
        })
    }
}
