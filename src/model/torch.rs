use anyhow::{bail, Context, Result};
use tch::{kind::Kind, CModule, Device, Tensor};

use super::{
    project_growth, GrowthForecast, GrowthQuery, ModelError, ModelInfo, ModelNote, ModelService,
    SeriesForecast, SeriesQuery,
};
use crate::features::FEATURE_ARITY;
use crate::sequence::SequenceTensor;

const MODEL_TYPE: &str = "TorchScript Fish Growth Model";

/// TorchScript module mapping a `[1, window, arity]` window to the number of
/// days until the target weight.
pub struct TorchGrowthModel {
    model: CModule,
    device: Device,
    window_size: usize,
    model_path: String,
}

impl TorchGrowthModel {
    pub fn load(model_path: &str, window_size: usize) -> Result<Self> {
        let device = Device::Cpu;

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path))?;

        // Probe output shape with a dummy forward; expect a single scalar per batch.
        let dummy = Tensor::zeros(
            [1, window_size as i64, FEATURE_ARITY as i64],
            (Kind::Float, device),
        );
        let t = model.forward_ts(&[dummy])?;
        let sz = t.size();
        if sz.iter().product::<i64>() != 1 {
            bail!("unexpected model output size: {:?}", sz);
        }

        Ok(Self {
            model,
            device,
            window_size,
            model_path: model_path.to_string(),
        })
    }

    fn days_to_target(&self, tensor: &SequenceTensor) -> Result<f64, ModelError> {
        let (rows, cols) = tensor.shape();
        if rows != self.window_size || cols != FEATURE_ARITY {
            return Err(ModelError::InputShape {
                expected: (self.window_size, FEATURE_ARITY),
                actual: (rows, cols),
            });
        }

        let input = Tensor::from_slice(tensor.as_slice())
            .reshape([1, rows as i64, cols as i64])
            .to_device(self.device);

        let out = self
            .model
            .forward_ts(&[input])
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        Ok(out.reshape([-1]).double_value(&[0]))
    }
}

impl ModelService for TorchGrowthModel {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_type: MODEL_TYPE.to_string(),
            is_trained: true,
            output_type: "Days until target weight".to_string(),
            model_path: Some(self.model_path.clone()),
            note: None,
        }
    }

    fn predict(&self, tensor: &SequenceTensor, query: &GrowthQuery) -> Result<GrowthForecast, ModelError> {
        let days = self.days_to_target(tensor)?;
        if !days.is_finite() {
            return Err(ModelError::Inference(format!("non-finite output {}", days)));
        }
        let remaining = query.target_weight - query.current_weight();
        let daily_gain = if days > 0.0 { remaining / days } else { remaining };
        let (predictions, summary) = project_growth(query, daily_gain)?;
        Ok(GrowthForecast {
            predictions,
            summary,
            model_info: ModelNote {
                model_type: MODEL_TYPE.to_string(),
                note: None,
            },
        })
    }

    fn forecast_series(&self, _query: &SeriesQuery) -> Result<SeriesForecast, ModelError> {
        Err(ModelError::Unsupported("series forecasting"))
    }
}
