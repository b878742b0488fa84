//! Per-point feature encoding.
//!
//! Column order is a contract with the trained model and must not change without
//! retraining. It is checked against `meta.json` when a model is loaded.

use chrono::{Datelike, NaiveDate, TimeDelta};

use crate::types::{FishType, GrowthRequest, PoolType, SequencePoint};

pub const FEATURE_ARITY: usize = 19;

pub const FEATURE_COLUMNS: [&str; FEATURE_ARITY] = [
    "day",
    "month",
    "week",
    "day_to",
    "fish_Nila",
    "fish_Lele",
    "fish_Patin",
    "pool_A1",
    "pool_A2",
    "pool_A3",
    "pool_A4",
    "pool_A5",
    "pool_B1",
    "pool_B2",
    "pool_B3",
    "pool_B4",
    "pool_B5",
    "weight",
    "target_weight",
];

const DATE_COLUMNS: usize = 4;
const FISH_OFFSET: usize = DATE_COLUMNS;
const POOL_OFFSET: usize = FISH_OFFSET + 3;
const WEIGHT_COLUMN: usize = POOL_OFFSET + 10;
const TARGET_WEIGHT_COLUMN: usize = WEIGHT_COLUMN + 1;

/// Numeric encoding of one sequence point, in `FEATURE_COLUMNS` order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(pub Vec<f32>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn column(&self, name: &str) -> Option<f32> {
        let idx = FEATURE_COLUMNS.iter().position(|c| *c == name)?;
        self.0.get(idx).copied()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder {
    /// Days past the last observation used as target date when the request has none.
    pub day_to_horizon_days: i64,
}

impl FeatureEncoder {
    pub fn new(day_to_horizon_days: i64) -> Self {
        Self { day_to_horizon_days }
    }

    /// `None` when the horizon pushes the date out of the calendar range.
    pub fn target_date(&self, req: &GrowthRequest) -> Option<NaiveDate> {
        req.target_date.or_else(|| {
            let horizon = TimeDelta::try_days(self.day_to_horizon_days.max(0))?;
            req.last_point()?.date.checked_add_signed(horizon)
        })
    }

    pub fn encode_request(&self, req: &GrowthRequest) -> Vec<FeatureVector> {
        let Some(target_date) = self.target_date(req) else {
            return Vec::new();
        };
        req.sequence
            .iter()
            .map(|p| encode_point(p, req.target_weight, target_date))
            .collect()
    }
}

/// Categories are assumed valid; the validator has already rejected unknown values.
pub fn encode_point(point: &SequencePoint, target_weight: f64, target_date: NaiveDate) -> FeatureVector {
    let mut v = vec![0.0f32; FEATURE_ARITY];
    v[0] = point.date.day() as f32;
    v[1] = point.date.month() as f32;
    v[2] = point.date.iso_week().week() as f32;
    v[3] = (target_date - point.date).num_days() as f32;
    v[FISH_OFFSET + point.fish_type.position()] = 1.0;
    v[POOL_OFFSET + point.pool_type.position()] = 1.0;
    v[WEIGHT_COLUMN] = point.weight as f32;
    v[TARGET_WEIGHT_COLUMN] = target_weight as f32;
    FeatureVector(v)
}

/// Column names of the one-of-N groups, used by model info.
pub fn category_columns() -> (Vec<String>, Vec<String>) {
    let fish = FishType::ALL.iter().map(|f| format!("fish_{}", f.label())).collect();
    let pool = PoolType::ALL.iter().map(|p| format!("pool_{}", p.label())).collect();
    (fish, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(fish_type: FishType, pool_type: PoolType, date: NaiveDate) -> SequencePoint {
        SequencePoint {
            fish_type,
            pool_type,
            weight: 0.25,
            date,
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_column_constants_line_up() {
        let (fish, pool) = category_columns();
        assert_eq!(&FEATURE_COLUMNS[FISH_OFFSET..POOL_OFFSET], fish.as_slice());
        assert_eq!(&FEATURE_COLUMNS[POOL_OFFSET..WEIGHT_COLUMN], pool.as_slice());
        assert_eq!(FEATURE_COLUMNS[WEIGHT_COLUMN], "weight");
        assert_eq!(FEATURE_COLUMNS[TARGET_WEIGHT_COLUMN], "target_weight");
    }

    #[test]
    fn test_arity_and_one_hot_for_every_category() {
        let date = ymd(2024, 1, 19);
        for fish in FishType::ALL {
            for pool in PoolType::ALL {
                let v = encode_point(&point(*fish, *pool, date), 500.0, date);
                assert_eq!(v.len(), FEATURE_ARITY);
                let fish_sum: f32 = v.0[FISH_OFFSET..POOL_OFFSET].iter().sum();
                let pool_sum: f32 = v.0[POOL_OFFSET..WEIGHT_COLUMN].iter().sum();
                assert_eq!(fish_sum, 1.0);
                assert_eq!(pool_sum, 1.0);
                assert_eq!(v.column(&format!("fish_{}", fish.label())), Some(1.0));
                assert_eq!(v.column(&format!("pool_{}", pool.label())), Some(1.0));
            }
        }
    }

    #[test]
    fn test_date_decomposition() {
        // 2021-01-03 is a Sunday that belongs to ISO week 53 of 2020.
        let v = encode_point(&point(FishType::Lele, PoolType::B5, ymd(2021, 1, 3)), 1.5, ymd(2021, 1, 10));
        assert_eq!(v.column("day"), Some(3.0));
        assert_eq!(v.column("month"), Some(1.0));
        assert_eq!(v.column("week"), Some(53.0));
        assert_eq!(v.column("day_to"), Some(7.0));
        assert_eq!(v.column("weight"), Some(0.25));
        assert_eq!(v.column("target_weight"), Some(1.5));
    }

    #[test]
    fn test_day_to_defaults_to_last_point_plus_horizon() {
        let sequence: Vec<SequencePoint> = (0..7)
            .map(|i| point(FishType::Nila, PoolType::A1, ymd(2024, 1, 19 + i)))
            .collect();
        let req = GrowthRequest {
            target_weight: 500.0,
            sequence,
            target_date: None,
        };

        let day_to: Vec<f32> = FeatureEncoder::new(0)
            .encode_request(&req)
            .iter()
            .filter_map(|v| v.column("day_to"))
            .collect();
        assert_eq!(day_to, vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0]);

        let explicit = GrowthRequest {
            target_date: Some(ymd(2024, 2, 4)),
            ..req.clone()
        };
        let last = FeatureEncoder::new(3).encode_request(&explicit);
        assert_eq!(last[6].column("day_to"), Some(10.0));

        let horizon = FeatureEncoder::new(3).encode_request(&req);
        assert_eq!(horizon[6].column("day_to"), Some(3.0));
    }

    #[test]
    fn test_out_of_range_horizon_does_not_panic() {
        let sequence: Vec<SequencePoint> = (0..7)
            .map(|i| point(FishType::Nila, PoolType::A1, ymd(2024, 1, 19 + i)))
            .collect();
        let req = GrowthRequest {
            target_weight: 500.0,
            sequence,
            target_date: None,
        };

        let huge = FeatureEncoder::new(i64::MAX / 2);
        assert_eq!(huge.target_date(&req), None);
        assert!(huge.encode_request(&req).is_empty());

        let negative = FeatureEncoder::new(-30).encode_request(&req);
        assert_eq!(negative[6].column("day_to"), Some(0.0));
    }

    #[test]
    fn test_target_weight_broadcast() {
        let sequence: Vec<SequencePoint> = (0..3)
            .map(|i| point(FishType::Patin, PoolType::A4, ymd(2024, 5, 1 + i)))
            .collect();
        let req = GrowthRequest {
            target_weight: 2.0,
            sequence,
            target_date: None,
        };
        for v in FeatureEncoder::default().encode_request(&req) {
            assert_eq!(v.column("target_weight"), Some(2.0));
        }
    }
}
