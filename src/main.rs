use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

use fishcast::{
    clock::{Clock, SystemClock},
    config::ServiceConfig,
    features::FEATURE_COLUMNS,
    model::{ModelMeta, ModelService, PlaceholderModel},
    pipeline::ForecastPipeline,
    rate_limit::InMemoryRateLimiter,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServiceConfig::from_env()?;

    let scaler = match &cfg.meta_path {
        Some(path) => {
            let meta = ModelMeta::load(path, cfg.window_size)
                .with_context(|| format!("invalid model meta {}", path))?;
            tracing::info!("loaded meta; feat_list[{}]: {:?}", meta.feat_list.len(), &meta.feat_list);
            meta.scaler
        }
        None => {
            tracing::info!("no META_PATH; features are passed unscaled");
            None
        }
    };

    let model = load_model(&cfg)?;
    let info = model.info();
    tracing::info!(model_type = %info.model_type, trained = info.is_trained, "model ready");

    let clock = Arc::new(SystemClock);
    let pipeline = ForecastPipeline::new(&cfg, scaler, model);

    // Warmup so the first request does not pay for lazy initialisation.
    pipeline.warm_up(clock.today()).context("model warmup failed")?;
    tracing::info!(
        "warmup forward ok; input ({}, {}) columns {:?}",
        cfg.window_size,
        FEATURE_COLUMNS.len(),
        FEATURE_COLUMNS
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        limiter: Arc::new(InMemoryRateLimiter::new(&cfg.rate_limit)),
        clock,
        model_timeout: cfg.model_timeout(),
        rate_window_secs: cfg.rate_limit.window_secs,
    };
    let app = server::router(state);

    let addr = cfg.socket_addr()?;
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "torch")]
fn load_model(cfg: &ServiceConfig) -> Result<Arc<dyn ModelService>> {
    match &cfg.model_path {
        Some(path) => {
            let model = fishcast::model::TorchGrowthModel::load(path, cfg.window_size)?;
            Ok(Arc::new(model))
        }
        None => Ok(Arc::new(PlaceholderModel::new(cfg.placeholder.clone()))),
    }
}

#[cfg(not(feature = "torch"))]
fn load_model(cfg: &ServiceConfig) -> Result<Arc<dyn ModelService>> {
    if let Some(path) = &cfg.model_path {
        tracing::warn!(
            "MODEL_PATH={} ignored: built without the `torch` feature; using placeholder model",
            path
        );
    }
    Ok(Arc::new(PlaceholderModel::new(cfg.placeholder.clone())))
}
