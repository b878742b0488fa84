use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar format accepted for every date field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Closed, ordered category sets. The declaration order is the one-of-N slot order.
macro_rules! closed_set {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|c| c.label() == s)
            }

            /// Slot of this value in the one-of-N encoding.
            pub fn position(self) -> usize {
                self as usize
            }

            pub fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|c| c.label()).collect()
            }
        }
    };
}

closed_set! {
    FishType {
        Nila => "Nila",
        Lele => "Lele",
        Patin => "Patin",
    }
}

closed_set! {
    PoolType {
        A1 => "A1",
        A2 => "A2",
        A3 => "A3",
        A4 => "A4",
        A5 => "A5",
        B1 => "B1",
        B2 => "B2",
        B3 => "B3",
        B4 => "B4",
        B5 => "B5",
    }
}

/// One historical observation, already validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencePoint {
    pub fish_type: FishType,
    pub pool_type: PoolType,
    pub weight: f64,
    pub date: NaiveDate,
}

/// Fish-growth variant of a forecast request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRequest {
    pub target_weight: f64,
    pub sequence: Vec<SequencePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl GrowthRequest {
    /// Most recent observation; the validator guarantees a non-empty sequence.
    pub fn last_point(&self) -> Option<&SequencePoint> {
        self.sequence.last()
    }
}

/// Generic time-series variant of a forecast request, after defaults and clamping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRequest {
    pub start_date: NaiveDate,
    pub periods: u32,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ForecastRequest {
    Growth(GrowthRequest),
    Series(SeriesRequest),
}

/// Body of `POST /api/sequence/generate`, after validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub fish_type: FishType,
    pub pool_type: PoolType,
    pub start_date: NaiveDate,
    pub start_weight: f64,
    pub end_weight: f64,
    pub target_weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_sets_have_reference_sizes() {
        assert_eq!(FishType::ALL.len(), 3);
        assert_eq!(PoolType::ALL.len(), 10);
    }

    #[test]
    fn test_positions_follow_declaration_order() {
        for (i, p) in PoolType::ALL.iter().enumerate() {
            assert_eq!(p.position(), i);
        }
        assert_eq!(FishType::Patin.position(), 2);
    }

    #[test]
    fn test_parse_is_exact_match() {
        assert_eq!(FishType::parse("Nila"), Some(FishType::Nila));
        assert_eq!(FishType::parse("nila"), None);
        assert_eq!(PoolType::parse("B5"), Some(PoolType::B5));
        assert_eq!(PoolType::parse("C1"), None);
    }

    #[test]
    fn test_categories_serialize_as_labels() {
        let v = serde_json::to_value(PoolType::A3).unwrap();
        assert_eq!(v, serde_json::json!("A3"));
    }
}
