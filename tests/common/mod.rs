#![allow(dead_code)]

use std::sync::Arc;

use ndarray::Array2;
use salescast::dataset::{fit_encoders, parse_raw_records};
use salescast::model::feature_code;
use salescast::{
    Encoders, HistoricalTable, ModelError, PredictionPipeline, PredictionRequest, ProductModel,
    QuantityModel, RowSelection,
};

// Fitted codes:
//   customers:  Amine=0, Béatrice Ben Salah=1, Zoé=2
//   products:   Dark Roast Java=0, Earl Grey=1, Light Roast Sumatra=2
//   categories: Café en grains entiers=0, Café moulu=1, Thé=2
//   favorites:  Café moulu=0, Thé=1
pub const RECORDS: &str = "\
OrderID,CustomerName,CategoryName,ProductName,Price,Cost,FavoriteCategory
1,Béatrice Ben Salah,Café en grains entiers,Light Roast Sumatra,16.49,8,Café moulu
2,Amine,Thé,Earl Grey,5.5,2.25,Thé
3,Béatrice Ben Salah,Café en grains entiers,Dark Roast Java,18.0,9.5,Café moulu
4,Amine,Café moulu,Light Roast Sumatra,14.0,7.0,Thé
5,Zoé,Thé,Dark Roast Java,6.0,3.0,Café moulu
";

/// Maps the category column to a product: coffee categories to Light Roast
/// Sumatra, tea to Earl Grey.
pub struct CategoryProductModel;

impl ProductModel for CategoryProductModel {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<i64>, ModelError> {
        Ok(rows
            .rows()
            .into_iter()
            .map(|row| match feature_code(row, 1) {
                2 => 1,
                _ => 2,
            })
            .collect())
    }
}

/// Predicts half of the price column.
pub struct HalfPriceQuantityModel;

impl QuantityModel for HalfPriceQuantityModel {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<f32>, ModelError> {
        Ok(rows.rows().into_iter().map(|row| row[3] / 2.0).collect())
    }
}

/// Always answers a code that no encoder knows.
pub struct BrokenProductModel;

impl ProductModel for BrokenProductModel {
    fn predict(&self, rows: &Array2<f32>) -> Result<Vec<i64>, ModelError> {
        Ok(vec![99; rows.nrows()])
    }
}

/// Answers a single code however many rows it is given.
pub struct SingleAnswerProductModel;

impl ProductModel for SingleAnswerProductModel {
    fn predict(&self, _rows: &Array2<f32>) -> Result<Vec<i64>, ModelError> {
        Ok(vec![2])
    }
}

pub fn fixture() -> (Encoders, HistoricalTable) {
    let raw = parse_raw_records(RECORDS).unwrap();
    let encoders = fit_encoders(&raw);
    let table = HistoricalTable::encode(&raw, &encoders).unwrap();
    (encoders, table)
}

pub fn pipeline() -> PredictionPipeline {
    let (encoders, table) = fixture();
    PredictionPipeline::builder(encoders, table)
        .with_product_model(Arc::new(CategoryProductModel))
        .with_quantity_model(Arc::new(HalfPriceQuantityModel))
        .with_row_selection(RowSelection::Latest)
        .build()
        .unwrap()
}

pub fn request(customer: &str, category: &str, favorite: &str) -> PredictionRequest {
    PredictionRequest {
        customer_name: customer.to_string(),
        category_name: category.to_string(),
        favorite_category: Some(favorite.to_string()),
        ..Default::default()
    }
}

pub fn beatrice() -> PredictionRequest {
    request("Béatrice Ben Salah", "Café en grains entiers", "Café moulu")
}
