//! Schema checks that turn an untyped JSON body into a validated request.
//!
//! Every rule is evaluated and every violation is reported, so a client can fix
//! a request in one round trip. Nothing here has side effects.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{
    FishType, ForecastRequest, GenerateRequest, GrowthRequest, PoolType, SequencePoint,
    SeriesRequest, DATE_FORMAT,
};

const GROWTH_KEYS: [&str; 3] = ["target_weight", "sequence", "target_date"];
const SERIES_KEYS: [&str; 3] = ["start_date", "periods", "confidence_level"];

pub const DEFAULT_PERIODS: u32 = 30;
pub const PERIODS_RANGE: (u32, u32) = (1, 365);
pub const DEFAULT_CONFIDENCE: f64 = 0.95;
pub const CONFIDENCE_RANGE: (f64, f64) = (0.5, 0.99);

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum Violation {
    #[error("{} is required", path(.field, .index))]
    MissingField {
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },

    #[error("sequence must contain exactly {expected} data points, got {actual}")]
    InvalidSequenceLength { expected: usize, actual: usize },

    #[error("{} has unknown value {value:?}", path(.field, .index))]
    UnknownCategory {
        field: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },

    #[error("{} must be a valid YYYY-MM-DD date, got {value:?}", path(.field, .index))]
    InvalidDate {
        field: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },

    #[error("{} {reason}", path(.field, .index))]
    InvalidValue {
        field: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        reason: String,
    },
}

impl Violation {
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::MissingField { .. } => "MissingField",
            Violation::InvalidSequenceLength { .. } => "InvalidSequenceLength",
            Violation::UnknownCategory { .. } => "UnknownCategory",
            Violation::InvalidDate { .. } => "InvalidDate",
            Violation::InvalidValue { .. } => "InvalidValue",
        }
    }

    fn missing(field: &str, index: Option<usize>) -> Self {
        Violation::MissingField {
            field: field.to_string(),
            index,
        }
    }

    fn invalid(field: &str, index: Option<usize>, reason: impl Into<String>) -> Self {
        Violation::InvalidValue {
            field: field.to_string(),
            index,
            reason: reason.into(),
        }
    }
}

fn path(field: &str, index: &Option<usize>) -> String {
    match index {
        // The item itself rather than one of its fields.
        Some(i) if field == "sequence" => format!("sequence[{}]", i),
        Some(i) => format!("sequence[{}].{}", i, field),
        None => field.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub window_size: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self { window_size: 7 }
    }
}

/// Which request shape a body is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Growth,
    Series,
}

/// Growth keys win; a body with neither set is treated as growth so the client
/// hears about the growth fields it is missing.
pub fn classify(obj: &Map<String, Value>) -> Variant {
    let has = |keys: &[&str]| keys.iter().any(|k| obj.contains_key(*k));
    if !has(&GROWTH_KEYS) && has(&SERIES_KEYS) {
        Variant::Series
    } else {
        Variant::Growth
    }
}

pub fn validate_forecast(
    body: &Value,
    rules: &ValidationRules,
    today: NaiveDate,
) -> Result<ForecastRequest, Vec<Violation>> {
    let obj = as_object(body)?;
    match classify(obj) {
        Variant::Growth => validate_growth(obj, rules).map(ForecastRequest::Growth),
        Variant::Series => validate_series(obj, today).map(ForecastRequest::Series),
    }
}

pub fn validate_growth(
    obj: &Map<String, Value>,
    rules: &ValidationRules,
) -> Result<GrowthRequest, Vec<Violation>> {
    let mut errors = Vec::new();

    let target_weight = number(obj, "target_weight", None, &mut errors);
    if let Some(t) = target_weight {
        if t <= 0.0 {
            errors.push(Violation::invalid("target_weight", None, "must be greater than 0"));
        }
    }

    let mut points = Vec::new();
    match present(obj, "sequence") {
        None => errors.push(Violation::missing("sequence", None)),
        Some(Value::Array(items)) => {
            if items.len() != rules.window_size {
                errors.push(Violation::InvalidSequenceLength {
                    expected: rules.window_size,
                    actual: items.len(),
                });
            }
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Object(point) => {
                        if let Some(p) = sequence_point(point, i, &mut errors) {
                            points.push(p);
                        }
                    }
                    _ => errors.push(Violation::invalid("sequence", Some(i), "must be an object")),
                }
            }
        }
        Some(_) => errors.push(Violation::invalid("sequence", None, "must be an array")),
    }

    let target_date = optional_date(obj, "target_date", &mut errors);
    if let (Some(td), Some(last)) = (target_date, points.last()) {
        if td < last.date {
            errors.push(Violation::invalid(
                "target_date",
                None,
                "must not precede the last sequence date",
            ));
        }
    }

    match (errors.is_empty(), target_weight) {
        (true, Some(target_weight)) => Ok(GrowthRequest {
            target_weight,
            sequence: points,
            target_date,
        }),
        _ => Err(errors),
    }
}

fn sequence_point(
    obj: &Map<String, Value>,
    i: usize,
    errors: &mut Vec<Violation>,
) -> Option<SequencePoint> {
    let fish_type = category(obj, "fish_type", Some(i), FishType::parse, errors);
    let pool_type = category(obj, "pool_type", Some(i), PoolType::parse, errors);
    let weight = number(obj, "weight", Some(i), errors);
    if let Some(w) = weight {
        if w < 0.0 {
            errors.push(Violation::invalid("weight", Some(i), "must be non-negative"));
        }
    }
    let date = date(obj, "date", Some(i), errors);

    Some(SequencePoint {
        fish_type: fish_type?,
        pool_type: pool_type?,
        weight: weight.filter(|w| *w >= 0.0)?,
        date: date?,
    })
}

/// Out-of-range `periods` and `confidence_level` are clamped, not rejected.
pub fn validate_series(
    obj: &Map<String, Value>,
    today: NaiveDate,
) -> Result<SeriesRequest, Vec<Violation>> {
    let mut errors = Vec::new();

    let start_date = optional_date(obj, "start_date", &mut errors).unwrap_or(today);
    let periods = optional_number(obj, "periods", &mut errors)
        .map(|p| (p.trunc().max(0.0) as u32).clamp(PERIODS_RANGE.0, PERIODS_RANGE.1))
        .unwrap_or(DEFAULT_PERIODS);
    let confidence_level = optional_number(obj, "confidence_level", &mut errors)
        .map(|c| c.clamp(CONFIDENCE_RANGE.0, CONFIDENCE_RANGE.1))
        .unwrap_or(DEFAULT_CONFIDENCE);

    if errors.is_empty() {
        Ok(SeriesRequest {
            start_date,
            periods,
            confidence_level,
        })
    } else {
        Err(errors)
    }
}

pub fn validate_generate(body: &Value) -> Result<GenerateRequest, Vec<Violation>> {
    let obj = as_object(body)?;
    let mut errors = Vec::new();

    let fish_type = category(obj, "fish_type", None, FishType::parse, &mut errors);
    let pool_type = category(obj, "pool_type", None, PoolType::parse, &mut errors);
    let start_date = date(obj, "start_date", None, &mut errors);
    let start_weight = number(obj, "start_weight", None, &mut errors);
    let end_weight = number(obj, "end_weight", None, &mut errors);
    let target_weight = number(obj, "target_weight", None, &mut errors);

    for (field, value) in [("start_weight", start_weight), ("target_weight", target_weight)] {
        if matches!(value, Some(v) if v <= 0.0) {
            errors.push(Violation::invalid(field, None, "must be greater than 0"));
        }
    }
    if matches!(end_weight, Some(v) if v < 0.0) {
        errors.push(Violation::invalid("end_weight", None, "must be non-negative"));
    }

    match (fish_type, pool_type, start_date, start_weight, end_weight, target_weight) {
        (Some(fish_type), Some(pool_type), Some(start_date), Some(start_weight), Some(end_weight), Some(target_weight))
            if errors.is_empty() =>
        {
            Ok(GenerateRequest {
                fish_type,
                pool_type,
                start_date,
                start_weight,
                end_weight,
                target_weight,
            })
        }
        _ => Err(errors),
    }
}

pub fn as_object(body: &Value) -> Result<&Map<String, Value>, Vec<Violation>> {
    body.as_object()
        .ok_or_else(|| vec![Violation::invalid("body", None, "must be a JSON object")])
}

/// A JSON `null` counts as absent.
fn present<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn number(
    obj: &Map<String, Value>,
    field: &str,
    index: Option<usize>,
    errors: &mut Vec<Violation>,
) -> Option<f64> {
    match present(obj, field) {
        None => {
            errors.push(Violation::missing(field, index));
            None
        }
        Some(v) => as_number(v, field, index, errors),
    }
}

fn optional_number(obj: &Map<String, Value>, field: &str, errors: &mut Vec<Violation>) -> Option<f64> {
    present(obj, field).and_then(|v| as_number(v, field, None, errors))
}

fn as_number(v: &Value, field: &str, index: Option<usize>, errors: &mut Vec<Violation>) -> Option<f64> {
    let n = v.as_f64();
    if n.is_none() {
        errors.push(Violation::invalid(field, index, "must be a number"));
    }
    n
}

fn category<T>(
    obj: &Map<String, Value>,
    field: &str,
    index: Option<usize>,
    parse: fn(&str) -> Option<T>,
    errors: &mut Vec<Violation>,
) -> Option<T> {
    let v = match present(obj, field) {
        None => {
            errors.push(Violation::missing(field, index));
            return None;
        }
        Some(v) => v,
    };
    let parsed = v.as_str().and_then(parse);
    if parsed.is_none() {
        errors.push(Violation::UnknownCategory {
            field: field.to_string(),
            value: text(v),
            index,
        });
    }
    parsed
}

fn date(
    obj: &Map<String, Value>,
    field: &str,
    index: Option<usize>,
    errors: &mut Vec<Violation>,
) -> Option<NaiveDate> {
    match present(obj, field) {
        None => {
            errors.push(Violation::missing(field, index));
            None
        }
        Some(v) => as_date(v, field, index, errors),
    }
}

fn optional_date(obj: &Map<String, Value>, field: &str, errors: &mut Vec<Violation>) -> Option<NaiveDate> {
    present(obj, field).and_then(|v| as_date(v, field, None, errors))
}

fn as_date(v: &Value, field: &str, index: Option<usize>, errors: &mut Vec<Violation>) -> Option<NaiveDate> {
    let parsed = v.as_str().and_then(parse_date);
    if parsed.is_none() {
        errors.push(Violation::InvalidDate {
            field: field.to_string(),
            value: text(v),
            index,
        });
    }
    parsed
}

/// Strict `YYYY-MM-DD`; chrono alone would also accept unpadded fields.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    let shaped = b.len() == 10
        && b.iter()
            .enumerate()
            .all(|(i, c)| if i == 4 || i == 7 { *c == b'-' } else { c.is_ascii_digit() });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
