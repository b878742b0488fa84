use serde::Deserialize;
use std::{fs, path::Path};

use crate::features::{FEATURE_ARITY, FEATURE_COLUMNS};
use crate::sequence::Scaler;

#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("failed to read meta at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse meta.json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("feat_list column {position} is {found:?}, expected {expected:?}")]
    ColumnOrder {
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("meta declares {found} {what}, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Sidecar persisted next to a trained model: column contract and scaler.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ModelMeta {
    pub feat_list: Vec<String>,
    pub in_dim: Option<usize>,
    pub window_size: Option<usize>,
    pub scaler: Option<Scaler>,
}

impl ModelMeta {
    pub fn load(path: impl AsRef<Path>, window_size: usize) -> Result<Self, MetaError> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path).map_err(|source| MetaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&txt, window_size)
    }

    pub fn parse(txt: &str, window_size: usize) -> Result<Self, MetaError> {
        let meta: ModelMeta = serde_json::from_str(txt)?;
        meta.check(window_size)?;
        Ok(meta)
    }

    fn check(&self, window_size: usize) -> Result<(), MetaError> {
        if self.feat_list.len() != FEATURE_ARITY {
            return Err(MetaError::Dimension {
                what: "feat_list entries",
                expected: FEATURE_ARITY,
                found: self.feat_list.len(),
            });
        }
        for (position, (found, expected)) in self.feat_list.iter().zip(FEATURE_COLUMNS).enumerate() {
            if found != expected {
                return Err(MetaError::ColumnOrder {
                    position,
                    expected,
                    found: found.clone(),
                });
            }
        }
        let in_dim = self.in_dim.unwrap_or(self.feat_list.len());
        if in_dim != FEATURE_ARITY {
            return Err(MetaError::Dimension {
                what: "in_dim",
                expected: FEATURE_ARITY,
                found: in_dim,
            });
        }
        if let Some(w) = self.window_size {
            if w != window_size {
                return Err(MetaError::Dimension {
                    what: "window_size",
                    expected: window_size,
                    found: w,
                });
            }
        }
        if let Some(s) = &self.scaler {
            for (what, len) in [("scaler.mean entries", s.arity()), ("scaler.scale entries", s.scale.len())] {
                if len != FEATURE_ARITY {
                    return Err(MetaError::Dimension {
                        what,
                        expected: FEATURE_ARITY,
                        found: len,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta_json(cols: Vec<&str>) -> serde_json::Value {
        json!({
            "feat_list": cols,
            "window_size": 7,
            "scaler": { "mean": vec![0.0; 19], "scale": vec![1.0; 19] },
        })
    }

    #[test]
    fn test_accepts_contract_columns() {
        let txt = meta_json(FEATURE_COLUMNS.to_vec()).to_string();
        let meta = ModelMeta::parse(&txt, 7).unwrap();
        assert_eq!(meta.scaler.unwrap().arity(), 19);
    }

    #[test]
    fn test_rejects_reordered_columns() {
        let mut cols = FEATURE_COLUMNS.to_vec();
        cols.swap(0, 1);
        let err = ModelMeta::parse(&meta_json(cols).to_string(), 7).unwrap_err();
        assert!(matches!(err, MetaError::ColumnOrder { position: 0, expected: "day", .. }));
    }

    #[test]
    fn test_rejects_window_mismatch() {
        let txt = meta_json(FEATURE_COLUMNS.to_vec()).to_string();
        let err = ModelMeta::parse(&txt, 14).unwrap_err();
        assert!(matches!(err, MetaError::Dimension { what: "window_size", .. }));
    }

    #[test]
    fn test_rejects_short_scaler() {
        let mut v = meta_json(FEATURE_COLUMNS.to_vec());
        v["scaler"]["scale"] = json!([1.0, 2.0]);
        let err = ModelMeta::parse(&v.to_string(), 7).unwrap_err();
        assert!(matches!(err, MetaError::Dimension { found: 2, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ModelMeta::load("does/not/exist/meta.json", 7).unwrap_err();
        assert!(err.to_string().starts_with("failed to read meta at does/not/exist/meta.json"));
    }
}
