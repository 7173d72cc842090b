mod convolution;
mod transformer;

pub(crate) use convolution::ConvolutionModel;
pub(crate) use transformer::TransformerModel;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::PpgsModelConfig;

/// A sequence-in, sequence-out, length-aware network.
///
/// `audio` is `(batch, samples)` f32 at the model's native rate, already
/// padded; `lengths` is `(batch,)` i64 true sample counts including that
/// padding. The output is `(batch, frames, channels)` f32.
pub trait FrameModel: Send + Sync {
    fn forward(&self, audio: &Tensor, lengths: &Tensor) -> candle_core::Result<Tensor>;
}

/// The supported network families. Selecting one is an exhaustive match,
/// not a runtime string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Convolution,
    Transformer,
}

impl ModelKind {
    pub fn build(
        &self,
        config: &PpgsModelConfig,
        vb: VarBuilder,
    ) -> candle_core::Result<Box<dyn FrameModel>> {
        match self {
            Self::Convolution => Ok(Box::new(ConvolutionModel::load(config, vb)?)),
            Self::Transformer => Ok(Box::new(TransformerModel::load(config, vb)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_deserializes_from_lowercase_tags() {
        let kind: ModelKind = serde_json::from_str(r#""convolution""#).unwrap();
        assert_eq!(kind, ModelKind::Convolution);
        let kind: ModelKind = serde_json::from_str(r#""transformer""#).unwrap();
        assert_eq!(kind, ModelKind::Transformer);
        assert!(serde_json::from_str::<ModelKind>(r#""conformer""#).is_err());
    }
}
