use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::info;
use salescast::{
    init_logger, load_dataset, server, Args, ArtifactManager, OnnxModel, PredictionPipeline, ServerConfig,
};

async fn prepare_artifacts(config: &ServerConfig) -> anyhow::Result<ArtifactManager> {
    let manager = match &config.artifacts_dir {
        Some(dir) => ArtifactManager::new(dir),
        None => ArtifactManager::new_default(),
    }
    .context("Failed to open artifacts directory")?;
    info!("Artifacts directory: {:?}", manager.artifacts_dir());

    if config.fetch {
        info!("Fetching missing artifacts...");
        manager.ensure_artifacts().await?;
    } else {
        manager.verify_artifacts()?;
    }

    Ok(manager)
}

fn build_pipeline(config: &ServerConfig, manager: &ArtifactManager) -> anyhow::Result<PredictionPipeline> {
    let encoders_path = manager.encoders_path();
    let (encoders, table) = load_dataset(&config.dataset, &config.dataset_encoding, Some(encoders_path.as_path()))
        .with_context(|| format!("Failed to load dataset {:?}", config.dataset))?;

    let product_model = OnnxModel::load(manager.product_model_path(), &config.runtime)
        .context("Failed to load product model")?;
    let quantity_model = OnnxModel::load(manager.quantity_model_path(), &config.runtime)
        .context("Failed to load quantity model")?;

    let pipeline = PredictionPipeline::builder(encoders, table)
        .with_product_model(Arc::new(product_model))
        .with_quantity_model(Arc::new(quantity_model))
        .with_row_selection(config.row_selection)
        .build()?;
    Ok(pipeline)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();
    let config = ServerConfig::try_from(Args::parse())?;

    info!("=== Starting salescast ===");
    let start_time = Instant::now();

    let manager = prepare_artifacts(&config).await?;
    let pipeline = build_pipeline(&config, &manager)?;
    info!("Pipeline built in {:.2?}", start_time.elapsed());

    let app = server::router(Arc::new(pipeline));
    let addr = config.resolve_addr().await?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{} ({})", addr, config.host);
    axum::serve(listener, app).await?;

    Ok(())
}
