use serde::{Deserialize, Serialize};

use crate::features::{FeatureVector, FEATURE_ARITY, FEATURE_COLUMNS};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeMismatch {
    #[error("feature vector {row} has {actual} columns, expected {expected}")]
    Arity {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("sequence has {actual} rows, expected {expected}")]
    Rows { expected: usize, actual: usize },
}

/// Per-column standardisation persisted next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    pub fn arity(&self) -> usize {
        self.mean.len()
    }

    fn apply(&self, row: &mut [f32]) {
        for ((x, m), s) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
            *x -= m;
            if *s != 0.0 {
                *x /= s;
            }
        }
    }
}

/// Row-major `(window_size, feature_arity)` model input.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SequenceTensor {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        (i < self.rows).then(|| &self.data[i * self.cols..(i + 1) * self.cols])
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// One-line summary for feature debugging: size, non-zero count, mean, std,
    /// and the first named columns of the most recent row.
    pub fn describe(&self) -> String {
        let v = &self.data;
        let nz = v.iter().filter(|x| **x != 0.0).count();
        let mean = if v.is_empty() { 0.0 } else { v.iter().sum::<f32>() / (v.len() as f32) };
        let std = if v.len() < 2 {
            0.0
        } else {
            (v.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / (v.len() as f32)).sqrt()
        };
        let mut sample = vec![];
        if let Some(last) = self.rows.checked_sub(1).and_then(|i| self.row(i)) {
            for (name, x) in FEATURE_COLUMNS.iter().zip(last).take(6) {
                sample.push(format!("{}={:.3}", name, x));
            }
        }
        format!(
            "size={} nonzero={} mean={:.3} std={:.3} last=[{}]",
            v.len(),
            nz,
            mean,
            std,
            sample.join(", ")
        )
    }
}

#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    window_size: usize,
    scaler: Option<Scaler>,
}

impl SequenceBuilder {
    pub fn new(window_size: usize, scaler: Option<Scaler>) -> Self {
        Self { window_size, scaler }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.window_size, FEATURE_ARITY)
    }

    pub fn build(&self, vectors: &[FeatureVector]) -> Result<SequenceTensor, ShapeMismatch> {
        if vectors.len() != self.window_size {
            return Err(ShapeMismatch::Rows {
                expected: self.window_size,
                actual: vectors.len(),
            });
        }
        let mut data = Vec::with_capacity(self.window_size * FEATURE_ARITY);
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != FEATURE_ARITY {
                return Err(ShapeMismatch::Arity {
                    row,
                    expected: FEATURE_ARITY,
                    actual: v.len(),
                });
            }
            let start = data.len();
            data.extend_from_slice(v.as_slice());
            if let Some(scaler) = &self.scaler {
                scaler.apply(&mut data[start..]);
            }
        }
        Ok(SequenceTensor {
            rows: self.window_size,
            cols: FEATURE_ARITY,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(n: usize) -> Vec<FeatureVector> {
        (0..n)
            .map(|i| FeatureVector((0..FEATURE_ARITY).map(|c| (i * 100 + c) as f32).collect()))
            .collect()
    }

    #[test]
    fn test_shape_is_window_by_arity() {
        let t = SequenceBuilder::new(7, None).build(&vectors(7)).unwrap();
        assert_eq!(t.shape(), (7, 19));
        assert_eq!(t.as_slice().len(), 7 * 19);
        assert_eq!(t.row(1).unwrap()[0], 100.0);
        assert!(t.row(7).is_none());
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let mut vs = vectors(7);
        vs[3].0.pop();
        let err = SequenceBuilder::new(7, None).build(&vs).unwrap_err();
        assert_eq!(
            err,
            ShapeMismatch::Arity {
                row: 3,
                expected: 19,
                actual: 18
            }
        );
    }

    #[test]
    fn test_rejects_wrong_row_count() {
        let err = SequenceBuilder::new(7, None).build(&vectors(6)).unwrap_err();
        assert_eq!(err, ShapeMismatch::Rows { expected: 7, actual: 6 });
    }

    #[test]
    fn test_scaler_applies_to_every_row() {
        let mut scale = vec![2.0; FEATURE_ARITY];
        scale[1] = 0.0;
        let scaler = Scaler {
            mean: vec![1.0; FEATURE_ARITY],
            scale,
        };
        let t = SequenceBuilder::new(2, Some(scaler)).build(&vectors(2)).unwrap();
        assert_eq!(t.row(0).unwrap()[0], -0.5);
        assert_eq!(t.row(0).unwrap()[1], 0.0);
        assert_eq!(t.row(1).unwrap()[2], (102.0 - 1.0) / 2.0);
    }

    #[test]
    fn test_describe_names_columns() {
        let t = SequenceBuilder::new(1, None).build(&vectors(1)).unwrap();
        let s = t.describe();
        assert!(s.starts_with("size=19 nonzero=18"));
        assert!(s.contains("day=0.000"));
        assert!(s.contains("fish_Lele=5.000"));
        assert!(!s.contains("fish_Patin"));
    }
}
