//! Request orchestration: validate, encode, assemble, then call the model.
//!
//! Everything here is synchronous. The server runs it on the blocking pool.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::features::{FeatureEncoder, FEATURE_ARITY, FEATURE_COLUMNS};
use crate::interpolation::{generate_sequence, GeneratedSequence};
use crate::model::{
    GrowthForecast, GrowthQuery, ModelError, ModelInfo, ModelService, Observation, SeriesForecast,
    SeriesQuery,
};
use crate::sequence::{Scaler, SequenceBuilder, SequenceTensor, ShapeMismatch};
use crate::types::{FishType, ForecastRequest, GrowthRequest, PoolType, SeriesRequest};
use crate::validation::{self, ValidationRules, Violation};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed with {} violation(s)", .0.len())]
    Invalid(Vec<Violation>),
    #[error("batch of {actual} requests exceeds the maximum of {max}")]
    TooManyRequests { max: usize, actual: usize },
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<Vec<Violation>> for PipelineError {
    fn from(v: Vec<Violation>) -> Self {
        PipelineError::Invalid(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutput {
    Growth {
        request: GrowthRequest,
        shape: (usize, usize),
        forecast: GrowthForecast,
    },
    Series {
        request: SeriesRequest,
        forecast: SeriesForecast,
    },
}

/// Static description of what the pipeline feeds the model.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    #[serde(flatten)]
    pub model: ModelInfo,
    pub window_size: usize,
    pub feature_arity: usize,
    pub feature_columns: Vec<&'static str>,
    pub input_shape: String,
    pub fish_types: Vec<&'static str>,
    pub pool_types: Vec<&'static str>,
    pub normalized: bool,
}

pub struct ForecastPipeline {
    rules: ValidationRules,
    encoder: FeatureEncoder,
    builder: SequenceBuilder,
    batch_limit: usize,
    log_features: bool,
    normalized: bool,
    model: Arc<dyn ModelService>,
}

impl ForecastPipeline {
    pub fn new(cfg: &ServiceConfig, scaler: Option<Scaler>, model: Arc<dyn ModelService>) -> Self {
        Self {
            rules: ValidationRules {
                window_size: cfg.window_size,
            },
            encoder: FeatureEncoder::new(cfg.day_to_horizon_days),
            normalized: scaler.is_some(),
            builder: SequenceBuilder::new(cfg.window_size, scaler),
            batch_limit: cfg.batch_limit,
            log_features: cfg.log_features,
            model,
        }
    }

    pub fn window_size(&self) -> usize {
        self.rules.window_size
    }

    pub fn model_info(&self) -> ModelInfo {
        self.model.info()
    }

    pub fn info(&self) -> PipelineInfo {
        let (rows, cols) = self.builder.shape();
        PipelineInfo {
            model: self.model.info(),
            window_size: rows,
            feature_arity: cols,
            feature_columns: FEATURE_COLUMNS.to_vec(),
            input_shape: format!("(batch_size, {}, {})", rows, cols),
            fish_types: FishType::labels(),
            pool_types: PoolType::labels(),
            normalized: self.normalized,
        }
    }

    pub fn validate(&self, body: &Value, today: NaiveDate) -> Result<ForecastRequest, Vec<Violation>> {
        validation::validate_forecast(body, &self.rules, today)
    }

    pub fn forecast(&self, body: &Value, today: NaiveDate) -> Result<ForecastOutput, PipelineError> {
        let request = self.validate(body, today)?;
        self.run(request)
    }

    pub fn run(&self, request: ForecastRequest) -> Result<ForecastOutput, PipelineError> {
        match request {
            ForecastRequest::Growth(request) => {
                let tensor = self.assemble(&request)?;
                let query = GrowthQuery {
                    target_weight: request.target_weight,
                    history: request
                        .sequence
                        .iter()
                        .map(|p| Observation {
                            date: p.date,
                            weight: p.weight,
                        })
                        .collect(),
                };
                let forecast = self.model.predict(&tensor, &query)?;
                debug!(
                    days = ?forecast.summary.days_to_reach_target,
                    reached = forecast.summary.target_reached,
                    "growth forecast complete"
                );
                Ok(ForecastOutput::Growth {
                    request,
                    shape: tensor.shape(),
                    forecast,
                })
            }
            ForecastRequest::Series(request) => {
                let forecast = self.model.forecast_series(&SeriesQuery {
                    start_date: request.start_date,
                    periods: request.periods,
                    confidence_level: request.confidence_level,
                })?;
                Ok(ForecastOutput::Series { request, forecast })
            }
        }
    }

    pub fn assemble(&self, request: &GrowthRequest) -> Result<SequenceTensor, ShapeMismatch> {
        let vectors = self.encoder.encode_request(request);
        let tensor = self.builder.build(&vectors)?;
        if self.log_features {
            info!(target_weight = request.target_weight, "assembled {}", tensor.describe());
        }
        Ok(tensor)
    }

    /// Enforces the batch cap before any entry is looked at.
    pub fn batch_entries<'a>(&self, body: &'a Value) -> Result<&'a [Value], PipelineError> {
        let obj = validation::as_object(body)?;
        let entries = match obj.get("requests") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(PipelineError::Invalid(vec![Violation::InvalidValue {
                    field: "requests".to_string(),
                    index: None,
                    reason: "must be an array".to_string(),
                }]))
            }
            None => {
                return Err(PipelineError::Invalid(vec![Violation::MissingField {
                    field: "requests".to_string(),
                    index: None,
                }]))
            }
        };
        if entries.len() > self.batch_limit {
            return Err(PipelineError::TooManyRequests {
                max: self.batch_limit,
                actual: entries.len(),
            });
        }
        Ok(entries)
    }

    pub fn generate(&self, body: &Value) -> Result<GeneratedSequence, PipelineError> {
        let request = validation::validate_generate(body)?;
        generate_sequence(&request, self.window_size()).map_err(|e| {
            PipelineError::Invalid(vec![Violation::InvalidValue {
                field: "target_weight".to_string(),
                index: None,
                reason: e.to_string(),
            }])
        })
    }

    /// Runs one forward pass on an all-zero window.
    pub fn warm_up(&self, today: NaiveDate) -> Result<(), ModelError> {
        let tensor = SequenceTensor::zeros(self.window_size(), FEATURE_ARITY);
        let query = GrowthQuery {
            target_weight: 0.0,
            history: vec![Observation {
                date: today,
                weight: 0.0,
            }],
        };
        self.model.predict(&tensor, &query).map(|_| ())
    }
}
