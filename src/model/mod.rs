use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::sequence::SequenceTensor;

pub mod meta;
pub mod placeholder;
#[cfg(feature = "torch")]
pub mod torch;

pub use meta::{MetaError, ModelMeta};
pub use placeholder::PlaceholderModel;
#[cfg(feature = "torch")]
pub use torch::TorchGrowthModel;

/// Growth projections stop after this many daily steps.
pub const MAX_PROJECTION_DAYS: u32 = 365;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("input shape {actual:?} does not match model input {expected:?}")]
    InputShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("{0} is not supported by this model")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub is_trained: bool,
    pub output_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub weight: f64,
}

/// Raw context handed to the model next to the (possibly normalised) tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthQuery {
    pub target_weight: f64,
    pub history: Vec<Observation>,
}

impl GrowthQuery {
    pub fn current_weight(&self) -> f64 {
        self.history.last().map(|o| o.weight).unwrap_or(0.0)
    }

    /// Projections start the day after this date.
    pub fn as_of(&self) -> Option<NaiveDate> {
        self.history.last().map(|o| o.date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPrediction {
    pub day: u32,
    pub predicted_weight: f64,
    pub date: NaiveDate,
    pub days_to_target: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthSummary {
    pub days_to_reach_target: Option<u32>,
    pub target_weight: f64,
    pub current_weight: f64,
    pub final_predicted_weight: f64,
    pub target_reached: bool,
    pub total_predictions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelNote {
    pub model_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthForecast {
    pub predictions: Vec<DailyPrediction>,
    pub summary: GrowthSummary,
    pub model_info: ModelNote,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesQuery {
    pub start_date: NaiveDate,
    pub periods: u32,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesForecast {
    pub points: Vec<SeriesPoint>,
    pub confidence_level: f64,
    pub model_info: ModelNote,
}

/// Swappable prediction backend. Calls are synchronous and may block.
pub trait ModelService: Send + Sync {
    fn info(&self) -> ModelInfo;

    fn predict(&self, tensor: &SequenceTensor, query: &GrowthQuery) -> Result<GrowthForecast, ModelError>;

    fn forecast_series(&self, query: &SeriesQuery) -> Result<SeriesForecast, ModelError>;
}

/// Steps a constant daily gain from the current weight until the target is
/// reached or `MAX_PROJECTION_DAYS` have been predicted.
pub fn project_growth(
    query: &GrowthQuery,
    daily_gain: f64,
) -> Result<(Vec<DailyPrediction>, GrowthSummary), ModelError> {
    let as_of = query
        .as_of()
        .ok_or_else(|| ModelError::Inference("empty history".to_string()))?;
    let current = query.current_weight();
    let target = query.target_weight;

    let mut predictions = Vec::new();
    let mut weight = current;
    let mut day = 1;
    while weight < target && day <= MAX_PROJECTION_DAYS {
        weight += daily_gain.max(0.0);
        let reached = weight >= target;
        predictions.push(DailyPrediction {
            day,
            predicted_weight: round_to(weight, 4),
            date: as_of + Duration::days(day as i64),
            days_to_target: reached.then_some(day),
        });
        day += 1;
    }

    let target_reached = current >= target || weight >= target;
    let summary = GrowthSummary {
        days_to_reach_target: if current >= target {
            Some(0)
        } else {
            predictions.last().and_then(|p| p.days_to_target)
        },
        target_weight: target,
        current_weight: current,
        final_predicted_weight: predictions.last().map(|p| p.predicted_weight).unwrap_or(current),
        target_reached,
        total_predictions: predictions.len(),
    };
    Ok((predictions, summary))
}

pub fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(current: f64, target: f64) -> GrowthQuery {
        GrowthQuery {
            target_weight: target,
            history: vec![Observation {
                date: NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(),
                weight: current,
            }],
        }
    }

    #[test]
    fn test_projection_stops_at_target() {
        let (preds, summary) = project_growth(&query(0.8, 0.9), 0.02).unwrap();
        assert_eq!(preds.len(), 5);
        assert_eq!(preds[0].date, NaiveDate::from_ymd_opt(2024, 1, 26).unwrap());
        assert!(preds[..4].iter().all(|p| p.days_to_target.is_none()));
        assert_eq!(preds[4].days_to_target, Some(5));
        assert_eq!(summary.days_to_reach_target, Some(5));
        assert!(summary.target_reached);
        assert_eq!(summary.final_predicted_weight, 0.9);
    }

    #[test]
    fn test_projection_is_capped() {
        let (preds, summary) = project_growth(&query(1.0, 500.0), 0.02).unwrap();
        assert_eq!(preds.len(), MAX_PROJECTION_DAYS as usize);
        assert!(!summary.target_reached);
        assert_eq!(summary.days_to_reach_target, None);
    }

    #[test]
    fn test_already_at_target() {
        let (preds, summary) = project_growth(&query(2.0, 1.5), 0.02).unwrap();
        assert!(preds.is_empty());
        assert!(summary.target_reached);
        assert_eq!(summary.days_to_reach_target, Some(0));
        assert_eq!(summary.final_predicted_weight, 2.0);
    }

    #[test]
    fn test_empty_history_is_an_error() {
        let q = GrowthQuery {
            target_weight: 1.0,
            history: vec![],
        };
        assert!(matches!(project_growth(&q, 0.1), Err(ModelError::Inference(_))));
    }
}
