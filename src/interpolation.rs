//! Synthesises a daily observation window from a start and end weight.

use chrono::Duration;
use serde::Serialize;

use crate::model::round_to;
use crate::types::{GenerateRequest, SequencePoint};

const MIN_WEIGHT: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("start and end weight must both be below the capacity {capacity} for logistic interpolation")]
    AboveCapacity { capacity: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Linear,
    Exponential,
    Logistic,
}

impl Method {
    /// Small relative changes are linear, moderate ones exponential, large ones logistic.
    pub fn for_ratio(ratio: f64) -> Self {
        if ratio > 1.0 {
            if ratio <= 1.1 {
                Method::Linear
            } else if ratio <= 1.3 {
                Method::Exponential
            } else {
                Method::Logistic
            }
        } else if ratio >= 0.9 {
            Method::Linear
        } else if ratio >= 0.7 {
            Method::Exponential
        } else {
            Method::Logistic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedSequence {
    pub method: Method,
    pub sequence: Vec<SequencePoint>,
}

pub fn linear(w0: f64, w1: f64, days: usize) -> Vec<f64> {
    if days == 0 {
        return vec![round_to(w0, 2)];
    }
    (0..=days)
        .map(|i| round_to(w0 + (w1 - w0) * i as f64 / days as f64, 2))
        .collect()
}

pub fn exponential(w0: f64, w1: f64, days: usize) -> Vec<f64> {
    let w0 = w0.max(MIN_WEIGHT);
    let w1 = w1.max(MIN_WEIGHT);
    if days == 0 {
        return vec![round_to(w0, 2)];
    }
    let m = (w1 / w0).powf(1.0 / days as f64);
    (0..=days).map(|i| round_to(w0 * m.powi(i as i32), 2)).collect()
}

/// Logistic curve with carrying capacity `k` through both endpoints.
pub fn logistic(y0: f64, y1: f64, k: f64, days: usize) -> Result<Vec<f64>, InterpolationError> {
    let y0 = y0.max(MIN_WEIGHT);
    let y1 = y1.max(MIN_WEIGHT);
    if y0 >= k || y1 >= k {
        return Err(InterpolationError::AboveCapacity { capacity: k });
    }
    if days == 0 {
        return Ok(vec![round_to(y0, 6)]);
    }
    let a = (k / y0 - 1.0).ln();
    let b = (k / y1 - 1.0).ln();
    let mut r = (a - b) / days as f64;
    if r.abs() < 1e-12 {
        r = 1e-6;
    }
    let t0 = a / r;
    Ok((0..=days)
        .map(|i| round_to(k / (1.0 + (-r * (i as f64 - t0)).exp()), 6))
        .collect())
}

pub fn generate_sequence(req: &GenerateRequest, window_size: usize) -> Result<GeneratedSequence, InterpolationError> {
    let days = window_size.saturating_sub(1);
    let ratio = round_to(req.end_weight / req.start_weight, 2);
    let method = Method::for_ratio(ratio);
    let weights = match method {
        Method::Linear => linear(req.start_weight, req.end_weight, days),
        Method::Exponential => exponential(req.start_weight, req.end_weight, days),
        Method::Logistic => logistic(req.start_weight, req.end_weight, req.target_weight, days)?,
    };

    let sequence = weights
        .into_iter()
        .take_while(|w| *w <= req.target_weight)
        .enumerate()
        .map(|(i, weight)| SequencePoint {
            fish_type: req.fish_type,
            pool_type: req.pool_type,
            weight,
            date: req.start_date + Duration::days(i as i64),
        })
        .collect();
    Ok(GeneratedSequence { method, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FishType, PoolType};
    use chrono::NaiveDate;

    fn request(start: f64, end: f64, target: f64) -> GenerateRequest {
        GenerateRequest {
            fish_type: FishType::Nila,
            pool_type: PoolType::A2,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
            start_weight: start,
            end_weight: end,
            target_weight: target,
        }
    }

    #[test]
    fn test_linear_endpoints() {
        assert_eq!(linear(0.2, 0.26, 6), vec![0.2, 0.21, 0.22, 0.23, 0.24, 0.25, 0.26]);
    }

    #[test]
    fn test_exponential_endpoints() {
        let w = exponential(12.0, 15.0, 6);
        assert_eq!(w.len(), 7);
        assert_eq!(w[0], 12.0);
        assert_eq!(w[6], 15.0);
        assert!(w.windows(2).all(|p| p[1] >= p[0]));
    }

    #[test]
    fn test_logistic_hits_endpoints() {
        let w = logistic(0.2, 0.5, 1.0, 6).unwrap();
        assert!((w[0] - 0.2).abs() < 1e-6);
        assert!((w[6] - 0.5).abs() < 1e-6);
        assert!(w.iter().all(|x| *x < 1.0));
    }

    #[test]
    fn test_logistic_rejects_capacity_breach() {
        assert_eq!(
            logistic(0.2, 1.2, 1.0, 6),
            Err(InterpolationError::AboveCapacity { capacity: 1.0 })
        );
    }

    #[test]
    fn test_method_selection() {
        assert_eq!(Method::for_ratio(1.05), Method::Linear);
        assert_eq!(Method::for_ratio(1.2), Method::Exponential);
        assert_eq!(Method::for_ratio(2.0), Method::Logistic);
        assert_eq!(Method::for_ratio(0.95), Method::Linear);
        assert_eq!(Method::for_ratio(0.8), Method::Exponential);
        assert_eq!(Method::for_ratio(0.5), Method::Logistic);
    }

    #[test]
    fn test_generated_window_is_daily() {
        let g = generate_sequence(&request(0.22, 0.25, 1.0), 7).unwrap();
        assert_eq!(g.method, Method::Exponential);
        assert_eq!(g.sequence.len(), 7);
        assert_eq!(g.sequence[6].date, NaiveDate::from_ymd_opt(2024, 1, 25).unwrap());
        assert_eq!(g.sequence[6].weight, 0.25);
    }

    #[test]
    fn test_generation_stops_past_target() {
        let g = generate_sequence(&request(1.0, 1.06, 1.03), 7).unwrap();
        assert_eq!(g.method, Method::Linear);
        assert_eq!(g.sequence.len(), 4);
    }
}
