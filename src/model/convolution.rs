use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, VarBuilder};

use crate::config::PpgsModelConfig;
use crate::model::FrameModel;

const TRUNK_LAYERS: usize = 2;

/// Convolutional frame model: a strided framing convolution turns raw
/// audio into frame-rate activations, a same-padded trunk mixes context,
/// and a projection head emits per-frame class scores.
pub(crate) struct ConvolutionModel {
    frame: Conv1d,
    trunk: Vec<Conv1d>,
    head: Conv1d,
}

impl ConvolutionModel {
    pub(crate) fn load(cfg: &PpgsModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let frame_cfg = Conv1dConfig {
            stride: cfg.hopsize,
            ..Default::default()
        };
        let frame = candle_nn::conv1d(
            1,
            cfg.hidden_channels,
            cfg.window_size,
            frame_cfg,
            vb.pp("frame"),
        )?;

        let same_cfg = Conv1dConfig {
            padding: cfg.kernel_size / 2,
            ..Default::default()
        };
        let mut trunk = Vec::with_capacity(TRUNK_LAYERS);
        for i in 0..TRUNK_LAYERS {
            trunk.push(candle_nn::conv1d(
                cfg.hidden_channels,
                cfg.hidden_channels,
                cfg.kernel_size,
                same_cfg,
                vb.pp(format!("trunk.{i}")),
            )?);
        }
        let head = candle_nn::conv1d(
            cfg.hidden_channels,
            cfg.output_channels,
            cfg.kernel_size,
            same_cfg,
            vb.pp("head"),
        )?;

        Ok(Self { frame, trunk, head })
    }
}

impl FrameModel for ConvolutionModel {
    fn forward(&self, audio: &Tensor, lengths: &Tensor) -> candle_core::Result<Tensor> {
        // The convolution stack is local, so shorter examples simply carry
        // their zero padding through; lengths only matter to attention-style
        // models.
        let _ = lengths;
        let mut h = self.frame.forward(&audio.unsqueeze(1)?)?.gelu()?;
        for conv in &self.trunk {
            h = conv.forward(&h)?.gelu()?;
        }
        // (batch, channels, frames) -> (batch, frames, channels)
        self.head.forward(&h)?.transpose(1, 2)?.contiguous()
    }
}
