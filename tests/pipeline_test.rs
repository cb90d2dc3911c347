mod common;

use std::sync::Arc;

use common::{
    beatrice, pipeline, request, BrokenProductModel, HalfPriceQuantityModel, SingleAnswerProductModel,
};
use salescast::{
    Field, InMemoryPredictionLog, ModelError, PredictionError, PredictionLog, PredictionPipeline,
    Quantity, QuantityRequest,
};

#[test]
fn test_predict_resolves_latest_record() -> Result<(), PredictionError> {
    let pipeline = pipeline();
    let prediction = pipeline.predict(&beatrice())?;

    assert_eq!(prediction.predicted_product, "Light Roast Sumatra");
    // Latest Béatrice/coffee row has price 18.0
    assert_eq!(prediction.predicted_quantity, 9);
    assert!(pipeline.products().contains(&prediction.predicted_product));
    Ok(())
}

#[test]
fn test_product_name_narrows_the_lookup() -> Result<(), PredictionError> {
    let mut request = beatrice();
    request.product_name = Some("Light Roast Sumatra".into());

    let prediction = pipeline().predict(&request)?;
    // 16.49 / 2 truncated
    assert_eq!(prediction.predicted_quantity, 8);
    Ok(())
}

#[test]
fn test_supplied_price_and_cost_skip_the_lookup() -> Result<(), PredictionError> {
    let pipeline = pipeline();

    let mut request = beatrice();
    request.price = Some(30.0);
    request.cost = Some(12.0);
    assert_eq!(pipeline.predict(&request)?.predicted_quantity, 15);

    // No Zoé/Café moulu record exists, but nothing needs resolving
    let mut request = request_for_zoe();
    request.price = Some(10.0);
    request.cost = Some(4.0);
    assert_eq!(pipeline.predict(&request)?.predicted_quantity, 5);
    Ok(())
}

fn request_for_zoe() -> salescast::PredictionRequest {
    request("Zoé", "Café moulu", "Café moulu")
}

#[test]
fn test_missing_favorite_comes_from_the_record() -> Result<(), PredictionError> {
    let mut request = request("Amine", "Thé", "unused");
    request.favorite_category = None;

    let prediction = pipeline().predict(&request)?;
    assert_eq!(prediction.predicted_product, "Earl Grey");
    assert_eq!(prediction.predicted_quantity, 2);
    Ok(())
}

#[test]
fn test_predict_product_matches_predict() -> Result<(), PredictionError> {
    let pipeline = pipeline();
    for request in [beatrice(), request("Amine", "Thé", "Thé"), request("Amine", "Café moulu", "Thé")] {
        let full = pipeline.predict(&request)?;
        let product_only = pipeline.predict_product(&request)?;
        assert_eq!(full.predicted_product, product_only.predicted_product);
    }
    Ok(())
}

#[test]
fn test_unknown_values_are_rejected() {
    let pipeline = pipeline();

    let err = pipeline.predict(&request("Nobody", "Thé", "Thé")).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::UnknownCategoricalValue { field: Field::Customer, ref value } if value == "Nobody"
    ));

    let err = pipeline.predict(&request("Amine", "Chocolat", "Thé")).unwrap_err();
    assert!(matches!(err, PredictionError::UnknownCategoricalValue { field: Field::Category, .. }));

    let err = pipeline.predict_product(&request("Amine", "Thé", "Tisane")).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::UnknownCategoricalValue { field: Field::FavoriteCategory, .. }
    ));

    let mut unknown_product = beatrice();
    unknown_product.product_name = Some("Matcha".into());
    let err = pipeline.predict(&unknown_product).unwrap_err();
    assert!(matches!(err, PredictionError::UnknownCategoricalValue { field: Field::Product, .. }));
}

#[test]
fn test_no_matching_record() {
    let err = pipeline().predict(&request_for_zoe()).unwrap_err();
    match err {
        PredictionError::NoMatchingRecord { customer, category, product } => {
            assert_eq!(customer, "Zoé");
            assert_eq!(category, "Café moulu");
            assert!(product.is_none());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_predict_quantity() -> Result<(), PredictionError> {
    let pipeline = pipeline();
    let request = QuantityRequest {
        product_name: "Earl Grey".into(),
        customer_name: "Amine".into(),
        category_name: "Thé".into(),
        favorite_category: Some("Thé".into()),
        price: None,
        cost: None,
    };
    assert_eq!(pipeline.predict_quantity(&request)?.predicted_quantity, 2);

    // Amine never bought Light Roast Sumatra as tea
    let request = QuantityRequest {
        product_name: "Light Roast Sumatra".into(),
        ..request
    };
    let err = pipeline.predict_quantity(&request).unwrap_err();
    assert!(matches!(err, PredictionError::NoMatchingRecord { product: Some(_), .. }));

    let request = QuantityRequest {
        product_name: "Matcha".into(),
        price: Some(1.0),
        cost: Some(1.0),
        ..request
    };
    let err = pipeline.predict_quantity(&request).unwrap_err();
    assert!(matches!(err, PredictionError::UnknownCategoricalValue { field: Field::Product, .. }));
    Ok(())
}

#[test]
fn test_negative_regression_is_clamped() -> Result<(), PredictionError> {
    let mut request = beatrice();
    request.price = Some(-10.0);
    request.cost = Some(1.0);
    assert_eq!(pipeline().predict(&request)?.predicted_quantity, 0);
    Ok(())
}

#[test]
fn test_prediction_log_records_predict_calls_in_order() -> Result<(), PredictionError> {
    let pipeline = pipeline();
    assert!(pipeline.predictions().is_empty());

    pipeline.predict(&beatrice())?;
    pipeline.predict(&request("Amine", "Thé", "Thé"))?;
    pipeline.predict_product(&beatrice())?;
    let _ = pipeline.predict(&request_for_zoe());
    pipeline.predict(&request("Amine", "Café moulu", "Thé"))?;

    let log = pipeline.predictions();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].customer_name, "Béatrice Ben Salah");
    assert_eq!(log[0].predicted_product, "Light Roast Sumatra");
    assert_eq!(log[0].predicted_quantity, 9);
    assert_eq!(log[1].customer_name, "Amine");
    assert_eq!(log[1].predicted_product, "Earl Grey");
    assert_eq!(log[2].predicted_quantity, 7);
    Ok(())
}

#[test]
fn test_injected_prediction_log() -> Result<(), PredictionError> {
    let log = Arc::new(InMemoryPredictionLog::new());
    let (encoders, table) = common::fixture();
    let pipeline = PredictionPipeline::builder(encoders, table)
        .with_product_model(Arc::new(common::CategoryProductModel))
        .with_quantity_model(Arc::new(HalfPriceQuantityModel))
        .with_prediction_log(log.clone())
        .build()?;

    pipeline.predict(&beatrice())?;
    assert_eq!(log.len(), 1);
    Ok(())
}

#[test]
fn test_predict_all() -> Result<(), PredictionError> {
    let results = pipeline().predict_all()?;
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].customer_name, "Béatrice Ben Salah");
    assert_eq!(results[0].predicted_product, "Light Roast Sumatra");
    assert_eq!(results[0].predicted_quantity, Quantity::Known(8));

    // One tea row and one coffee row: the tie goes to Earl Grey, the smaller code
    assert_eq!(results[1].customer_name, "Amine");
    assert_eq!(results[1].predicted_product, "Earl Grey");
    assert_eq!(results[1].predicted_quantity, Quantity::Known(2));

    // Zoé never bought Earl Grey
    assert_eq!(results[2].customer_name, "Zoé");
    assert_eq!(results[2].predicted_product, "Earl Grey");
    assert_eq!(results[2].predicted_quantity, Quantity::Unknown);
    Ok(())
}

#[test]
fn test_predict_all_one_entry_per_customer() -> Result<(), PredictionError> {
    let pipeline = pipeline();
    let results = pipeline.predict_all()?;
    let mut names: Vec<_> = results.into_iter().map(|r| r.customer_name).collect();
    names.sort();
    assert_eq!(names, pipeline.customers());
    Ok(())
}

#[test]
fn test_distinct_value_lists() {
    let pipeline = pipeline();
    assert_eq!(pipeline.customers(), vec!["Amine", "Béatrice Ben Salah", "Zoé"]);
    assert_eq!(
        pipeline.products(),
        vec!["Dark Roast Java", "Earl Grey", "Light Roast Sumatra"]
    );
    assert_eq!(
        pipeline.categories(),
        vec!["Café en grains entiers", "Café moulu", "Thé"]
    );
}

#[test]
fn test_encode_decode_identity() {
    let pipeline = pipeline();
    let encoders = pipeline.encoders();
    for field in Field::ALL {
        for label in encoders.table(field).classes() {
            let code = encoders.encode(field, label).unwrap();
            assert_eq!(encoders.decode(field, code), Some(label.as_str()));
        }
    }
}

#[test]
fn test_invalid_model_output() {
    let (encoders, table) = common::fixture();
    let pipeline = PredictionPipeline::builder(encoders, table)
        .with_product_model(Arc::new(BrokenProductModel))
        .with_quantity_model(Arc::new(HalfPriceQuantityModel))
        .build()
        .unwrap();

    let err = pipeline.predict(&beatrice()).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::Model(ModelError::InvalidCode { field: Field::Product, code: 99 })
    ));
    assert!(pipeline.predictions().is_empty());
    assert!(pipeline.predict_all().is_err());
}

#[test]
fn test_predict_all_checks_output_length() -> Result<(), PredictionError> {
    let (encoders, table) = common::fixture();
    let pipeline = PredictionPipeline::builder(encoders, table)
        .with_product_model(Arc::new(SingleAnswerProductModel))
        .with_quantity_model(Arc::new(HalfPriceQuantityModel))
        .build()?;

    // One row in, one code out is still fine
    assert_eq!(pipeline.predict_product(&beatrice())?.predicted_product, "Light Roast Sumatra");

    // Béatrice has two records but the model answers once
    let err = pipeline.predict_all().unwrap_err();
    assert!(matches!(
        err,
        PredictionError::Model(ModelError::OutputMismatch { expected: 2, actual: 1 })
    ));
    Ok(())
}

#[test]
fn test_builder_requires_both_models() {
    let (encoders, table) = common::fixture();
    let result = PredictionPipeline::builder(encoders, table)
        .with_quantity_model(Arc::new(HalfPriceQuantityModel))
        .build();
    assert!(matches!(result, Err(ModelError::Load(_))));
}
