use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApiError;
use crate::pipeline::{ForecastOutput, ForecastPipeline, PipelineError};
use crate::rate_limit::{Decision, RateLimitStore};

const REQUEST_ID_HEADER: &str = "x-request-id";
const REAL_IP_HEADER: &str = "x-real-ip";

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ForecastPipeline>,
    pub limiter: Arc<dyn RateLimitStore>,
    pub clock: Arc<dyn Clock>,
    pub model_timeout: Duration,
    pub rate_window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/forecast", post(forecast))
        .route("/forecast/batch", post(batch_forecast))
        .route("/sequence/generate", post(generate_sequence))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(middleware::from_fn(request_correlation_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------- Middleware ----------

async fn request_correlation_id(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(v) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    response
}

/// Rate-limit key: the proxy-supplied address, else the peer address.
fn client_id(request: &Request) -> String {
    request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = client_id(&request);
    match state.limiter.check(&client, state.clock.now()) {
        Decision::Allow { remaining } => {
            debug!(client = %client, remaining, "rate limit ok");
            next.run(request).await
        }
        Decision::Deny { retry_after, limit } => {
            warn!(client = %client, limit, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            ApiError::RateLimitExceeded {
                limit,
                window_secs: state.rate_window_secs,
                retry_after,
            }
            .into_response()
        }
    }
}

// ---------- Handlers ----------

fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match payload {
        Ok(Json(v)) => Ok(v),
        Err(JsonRejection::MissingJsonContentType(_)) => Err(ApiError::InvalidBody(
            "Content-Type must be application/json".to_string(),
        )),
        Err(e) => Err(ApiError::InvalidBody(format!("Invalid JSON data: {}", e.body_text()))),
    }
}

/// Runs a pipeline call on the blocking pool under the model timeout.
async fn run_blocking<T, F>(state: &AppState, correlation_id: &str, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ForecastPipeline) -> Result<T, PipelineError> + Send + 'static,
{
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || f(&pipeline));
    match tokio::time::timeout(state.model_timeout, task).await {
        Ok(Ok(result)) => result.map_err(|e| ApiError::from_pipeline(e, correlation_id)),
        Ok(Err(join_err)) => {
            error!(correlation_id = %correlation_id, "pipeline task failed: {}", join_err);
            Err(ApiError::Internal {
                correlation_id: correlation_id.to_string(),
            })
        }
        Err(_) => {
            error!(
                correlation_id = %correlation_id,
                "model call timed out after {}ms",
                state.model_timeout.as_millis()
            );
            Err(ApiError::ServiceUnavailable {
                correlation_id: correlation_id.to_string(),
            })
        }
    }
}

fn output_data(output: &ForecastOutput, generated_at: &str) -> Value {
    match output {
        ForecastOutput::Growth {
            request,
            shape,
            forecast,
        } => json!({
            "predictions": forecast.predictions,
            "summary": forecast.summary,
            "metadata": {
                "model_type": "Fish Growth Forecast",
                "generated_at": generated_at,
                "input_data": {
                    "target_weight": request.target_weight,
                    "sequence_length": request.sequence.len(),
                    "sequences_shape": [1, shape.0, shape.1],
                    "feature_columns": crate::features::FEATURE_COLUMNS,
                },
                "model_info": forecast.model_info,
            }
        }),
        ForecastOutput::Series { request, forecast } => json!({
            "forecast": forecast.points,
            "confidence_level": forecast.confidence_level,
            "metadata": {
                "model_type": "Time Series Forecast",
                "generated_at": generated_at,
                "input_data": request,
                "model_info": forecast.model_info,
            }
        }),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let info = state.pipeline.model_info();
    let (status, code) = if info.is_trained {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };
    let body = json!({
        "status": status,
        "model_status": if info.is_trained { "trained" } else { "not_trained" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": state.clock.now().to_rfc3339(),
    });
    (code, Json(body)).into_response()
}

async fn model_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": state.pipeline.info(),
        "timestamp": state.clock.now().to_rfc3339(),
    }))
}

async fn forecast(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(payload)?;
    let today = state.clock.today();

    let output = run_blocking(&state, &correlation_id, move |p| p.forecast(&body, today)).await?;

    let generated_at = state.clock.now().to_rfc3339();
    info!(correlation_id = %correlation_id, "forecast served");
    Ok(Json(json!({
        "success": true,
        "data": output_data(&output, &generated_at),
    })))
}

async fn batch_forecast(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(payload)?;
    let entries = state
        .pipeline
        .batch_entries(&body)
        .map_err(|e| ApiError::from_pipeline(e, &correlation_id))?
        .to_vec();
    let total = entries.len();
    let today = state.clock.today();

    let runs = entries.into_iter().enumerate().map(|(i, entry)| {
        let state = state.clone();
        let entry_id = format!("{}/{}", correlation_id, i);
        async move {
            let result = run_blocking(&state, &entry_id, move |p| p.forecast(&entry, today)).await;
            (i, result)
        }
    });
    let outcomes = join_all(runs).await;

    let generated_at = state.clock.now().to_rfc3339();
    let mut successful = 0;
    let results: Vec<Value> = outcomes
        .into_iter()
        .map(|(i, result)| match result {
            Ok(output) => {
                successful += 1;
                json!({
                    "request_id": i,
                    "success": true,
                    "data": output_data(&output, &generated_at),
                })
            }
            Err(e) => {
                let mut entry = e.body();
                entry["request_id"] = json!(i);
                entry
            }
        })
        .collect();

    info!(correlation_id = %correlation_id, total, successful, "batch forecast served");
    Ok(Json(json!({
        "success": true,
        "data": {
            "results": results,
            "total_requests": total,
            "successful_requests": successful,
            "generated_at": generated_at,
        }
    })))
}

async fn generate_sequence(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(payload)?;
    let generated = state
        .pipeline
        .generate(&body)
        .map_err(|e| ApiError::from_pipeline(e, &correlation_id))?;
    Ok(Json(json!({ "success": true, "data": generated })))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found", "status": 404 })),
    )
        .into_response()
}
