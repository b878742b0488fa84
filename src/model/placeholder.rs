use chrono::Duration;
use statrs::distribution::{ContinuousCDF, Normal};

use super::{
    project_growth, round_to, GrowthForecast, GrowthQuery, ModelError, ModelInfo, ModelNote,
    ModelService, SeriesForecast, SeriesPoint, SeriesQuery,
};
use crate::config::PlaceholderConfig;
use crate::sequence::SequenceTensor;

const MODEL_TYPE: &str = "Placeholder Fish Growth Model";

/// Deterministic stand-in until a trained model is configured.
///
/// Growth follows the mean daily gain observed across the input window. Series
/// forecasts are a linear trend with a band that widens with the horizon.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderModel {
    cfg: PlaceholderConfig,
}

impl PlaceholderModel {
    pub fn new(cfg: PlaceholderConfig) -> Self {
        Self { cfg }
    }

    /// Weight change per calendar day between the first and last observation.
    fn daily_gain(&self, query: &GrowthQuery) -> f64 {
        let observed = match (query.history.first(), query.history.last()) {
            (Some(first), Some(last)) => {
                let span = (last.date - first.date).num_days();
                (span > 0).then(|| (last.weight - first.weight) / span as f64)
            }
            _ => None,
        };
        observed
            .filter(|g| *g > 0.0)
            .unwrap_or(self.cfg.fallback_daily_gain)
    }

    fn note(&self) -> ModelNote {
        ModelNote {
            model_type: MODEL_TYPE.to_string(),
            note: Some("Replace this with your actual trained model".to_string()),
        }
    }
}

impl ModelService for PlaceholderModel {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_type: "Fish Growth Forecasting Model (Placeholder)".to_string(),
            is_trained: true,
            output_type: "Sequential weight predictions until target".to_string(),
            model_path: None,
            note: Some("This is a placeholder implementation. Replace with your actual trained model.".to_string()),
        }
    }

    fn predict(&self, _tensor: &SequenceTensor, query: &GrowthQuery) -> Result<GrowthForecast, ModelError> {
        let (predictions, summary) = project_growth(query, self.daily_gain(query))?;
        Ok(GrowthForecast {
            predictions,
            summary,
            model_info: self.note(),
        })
    }

    fn forecast_series(&self, query: &SeriesQuery) -> Result<SeriesForecast, ModelError> {
        let z = two_sided_z(query.confidence_level)?;
        let points = (0..query.periods)
            .map(|t| {
                let value = self.cfg.series_base + self.cfg.series_trend * t as f64;
                let half = z * self.cfg.series_volatility * ((t + 1) as f64).sqrt();
                SeriesPoint {
                    date: query.start_date + Duration::days(t as i64),
                    value: round_to(value, 4),
                    lower: round_to(value - half, 4),
                    upper: round_to(value + half, 4),
                }
            })
            .collect();
        Ok(SeriesForecast {
            points,
            confidence_level: query.confidence_level,
            model_info: self.note(),
        })
    }
}

/// Standard-normal quantile for a central interval of the given coverage.
fn two_sided_z(confidence: f64) -> Result<f64, ModelError> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| ModelError::Inference(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - (1.0 - confidence) / 2.0))
}
