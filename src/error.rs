use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::error;

use crate::model::ModelError;
use crate::pipeline::PipelineError;
use crate::validation::Violation;

/// Every failure the HTTP surface can return. Client-caused kinds map to 4xx,
/// server-caused kinds to 5xx; 5xx bodies only carry a stable message and the
/// correlation id of the log entry holding the detail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidBody(String),

    #[error("validation failed")]
    Validation(Vec<Violation>),

    #[error("maximum {limit} requests per {window_secs}s exceeded")]
    RateLimitExceeded {
        limit: u32,
        window_secs: u64,
        retry_after: Duration,
    },

    #[error("batch of {actual} requests exceeds the maximum of {max}")]
    TooManyRequests { max: usize, actual: usize },

    #[error("model service unavailable")]
    ServiceUnavailable { correlation_id: String },

    #[error("internal server error")]
    Internal { correlation_id: String },
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) => "InvalidBody",
            ApiError::Validation(v) => v.first().map(Violation::kind).unwrap_or("ValidationFailed"),
            ApiError::RateLimitExceeded { .. } => "RateLimitExceeded",
            ApiError::TooManyRequests { .. } => "TooManyRequests",
            ApiError::ServiceUnavailable { .. } => "ServiceUnavailable",
            ApiError::Internal { .. } => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::TooManyRequests { .. } => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the internal detail under `correlation_id` and keeps it out of the response.
    pub fn from_pipeline(err: PipelineError, correlation_id: &str) -> Self {
        let correlation_id = correlation_id.to_string();
        match err {
            PipelineError::Invalid(violations) => ApiError::Validation(violations),
            PipelineError::TooManyRequests { max, actual } => ApiError::TooManyRequests { max, actual },
            PipelineError::Shape(e) => {
                error!(correlation_id = %correlation_id, "sequence assembly failed: {}", e);
                ApiError::Internal { correlation_id }
            }
            PipelineError::Model(e @ ModelError::InputShape { .. }) => {
                error!(correlation_id = %correlation_id, "model rejected input: {}", e);
                ApiError::Internal { correlation_id }
            }
            PipelineError::Model(e) => {
                error!(correlation_id = %correlation_id, "model service failed: {}", e);
                ApiError::ServiceUnavailable { correlation_id }
            }
        }
    }

    /// `{success:false, error, message, ...}` without the HTTP envelope.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("success".into(), json!(false));
        body.insert("error".into(), json!(self.kind()));
        match self {
            ApiError::Validation(violations) => {
                let details: Vec<Value> = violations.iter().map(violation_json).collect();
                if let Some(Value::Object(first)) = details.first() {
                    for (k, v) in first {
                        if k != "kind" {
                            body.insert(k.clone(), v.clone());
                        }
                    }
                }
                body.insert("details".into(), Value::Array(details));
            }
            ApiError::RateLimitExceeded { limit, retry_after, .. } => {
                body.insert("message".into(), json!(self.to_string()));
                body.insert("limit".into(), json!(limit));
                body.insert("retry_after_secs".into(), json!(retry_after_secs(*retry_after)));
            }
            ApiError::TooManyRequests { max, actual } => {
                body.insert("message".into(), json!(self.to_string()));
                body.insert("max".into(), json!(max));
                body.insert("actual".into(), json!(actual));
            }
            ApiError::ServiceUnavailable { correlation_id } | ApiError::Internal { correlation_id } => {
                body.insert("message".into(), json!(self.to_string()));
                body.insert("correlation_id".into(), json!(correlation_id));
            }
            ApiError::InvalidBody(_) => {
                body.insert("message".into(), json!(self.to_string()));
            }
        }
        Value::Object(body)
    }
}

fn violation_json(v: &Violation) -> Value {
    let mut value = serde_json::to_value(v).unwrap_or_else(|_| json!({ "kind": v.kind() }));
    if let Value::Object(map) = &mut value {
        map.insert("message".into(), json!(v.to_string()));
    }
    value
}

/// Whole seconds, rounded up.
fn retry_after_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.body())).into_response();
        if let ApiError::RateLimitExceeded { retry_after, .. } = &self {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs(*retry_after).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_body_flattens_first_violation() {
        let err = ApiError::Validation(vec![
            Violation::InvalidSequenceLength {
                expected: 7,
                actual: 6,
            },
            Violation::MissingField {
                field: "target_weight".into(),
                index: None,
            },
        ]);
        let body = err.body();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("InvalidSequenceLength"));
        assert_eq!(body["expected"], json!(7));
        assert_eq!(body["actual"], json!(6));
        assert_eq!(body["message"], json!("sequence must contain exactly 7 data points, got 6"));
        assert_eq!(body["details"].as_array().unwrap().len(), 2);
        assert_eq!(body["details"][1]["kind"], json!("MissingField"));
        assert_eq!(body["details"][1]["message"], json!("target_weight is required"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_rounds_retry_after_up() {
        let err = ApiError::RateLimitExceeded {
            limit: 100,
            window_secs: 3600,
            retry_after: Duration::from_millis(1500),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_model_failure_does_not_leak_detail() {
        let err = ApiError::from_pipeline(
            PipelineError::Model(ModelError::Inference("/srv/models/x.pt: bad tensor".into())),
            "abc-123",
        );
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let text = err.body().to_string();
        assert!(!text.contains("/srv/models"));
        assert!(text.contains("abc-123"));
    }

    #[test]
    fn test_shape_mismatch_is_internal() {
        let err = ApiError::from_pipeline(
            PipelineError::Shape(crate::sequence::ShapeMismatch::Rows { expected: 7, actual: 6 }),
            "id",
        );
        assert_eq!(err.kind(), "InternalError");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
