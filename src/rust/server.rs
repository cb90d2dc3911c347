use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, warn};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PredictionError;
use crate::pipeline::{
    CustomerPrediction, Prediction, PredictionPipeline, PredictionRequest, ProductPrediction,
    QuantityPrediction, QuantityRequest,
};
use crate::prediction_log::PredictionLogEntry;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PredictionPipeline>,
}

/// JSON error body `{"detail": ...}` with the matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        let status = match &err {
            PredictionError::UnknownCategoricalValue { .. } => StatusCode::BAD_REQUEST,
            PredictionError::NoMatchingRecord { .. } => StatusCode::NOT_FOUND,
            PredictionError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Prediction failed: {}", err);
        } else {
            warn!("Rejected request: {}", err);
        }
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

/// Builds the HTTP router, with CORS open to every origin.
pub fn router(pipeline: Arc<PredictionPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict", post(predict))
        .route("/predict_product", post(predict_product))
        .route("/predict_quantity", post(predict_quantity))
        .route("/predict_all", get(predict_all))
        .route("/predictions", get(predictions))
        .route("/customers", get(customers))
        .route("/products", get(products))
        .route("/categories", get(categories))
        .route("/health", get(health))
        .layer(cors)
        .with_state(AppState { pipeline })
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(request) = payload?;
    debug!("POST /predict {:?}", request);
    Ok(Json(state.pipeline.predict(&request)?))
}

async fn predict_product(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<ProductPrediction>, ApiError> {
    let Json(request) = payload?;
    debug!("POST /predict_product {:?}", request);
    Ok(Json(state.pipeline.predict_product(&request)?))
}

async fn predict_quantity(
    State(state): State<AppState>,
    payload: Result<Json<QuantityRequest>, JsonRejection>,
) -> Result<Json<QuantityPrediction>, ApiError> {
    let Json(request) = payload?;
    debug!("POST /predict_quantity {:?}", request);
    Ok(Json(state.pipeline.predict_quantity(&request)?))
}

async fn predict_all(State(state): State<AppState>) -> Result<Json<Vec<CustomerPrediction>>, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    let results = tokio::task::spawn_blocking(move || pipeline.predict_all())
        .await
        .map_err(|e| {
            error!("Bulk prediction task failed: {}", e);
            ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: "Bulk prediction task failed".to_string(),
            }
        })??;
    Ok(Json(results))
}

async fn predictions(State(state): State<AppState>) -> Json<Vec<PredictionLogEntry>> {
    Json(state.pipeline.predictions())
}

async fn customers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.customers())
}

async fn products(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.products())
}

async fn categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.categories())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let table = state.pipeline.table();
    Json(json!({
        "status": "ok",
        "records": table.len(),
        "customers": table.customers().len(),
    }))
}
