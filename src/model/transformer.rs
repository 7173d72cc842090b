use candle_core::{Module, Tensor, D};
use candle_nn::{LayerNorm, Linear, VarBuilder};

use crate::config::PpgsModelConfig;
use crate::model::FrameModel;

/// Finite stand-in for -inf; keeps fully-masked rows out of NaN territory.
const MASK_VALUE: f32 = -1e9;

struct SelfAttention {
    q: Linear,
    k: Linear,
    v: Linear,
    out: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn load(cfg: &PpgsModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.hidden_channels;
        let head_dim = hidden / cfg.num_heads;
        Ok(Self {
            q: candle_nn::linear(hidden, hidden, vb.pp("q_proj"))?,
            k: candle_nn::linear(hidden, hidden, vb.pp("k_proj"))?,
            v: candle_nn::linear(hidden, hidden, vb.pp("v_proj"))?,
            out: candle_nn::linear(hidden, hidden, vb.pp("out_proj"))?,
            num_heads: cfg.num_heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        let reshape = |x: Tensor| {
            x.reshape((b, t, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = reshape((self.q.forward(xs)? * self.scale)?)?;
        let k = reshape(self.k.forward(xs)?)?;
        let v = reshape(self.v.forward(xs)?)?;

        let scores = q
            .matmul(&k.transpose(2, 3)?.contiguous()?)?
            .broadcast_add(mask)?;
        let attn = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let out = attn.matmul(&v)?.transpose(1, 2)?.contiguous()?.reshape((
            b,
            t,
            self.num_heads * self.head_dim,
        ))?;
        self.out.forward(&out)
    }
}

struct FeedForward {
    up: Linear,
    down: Linear,
}

impl FeedForward {
    fn load(cfg: &PpgsModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.hidden_channels;
        Ok(Self {
            up: candle_nn::linear(hidden, hidden * 4, vb.pp("up"))?,
            down: candle_nn::linear(hidden * 4, hidden, vb.pp("down"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.down.forward(&self.up.forward(xs)?.gelu()?)
    }
}

struct EncoderLayer {
    attn: SelfAttention,
    ln1: LayerNorm,
    ff: FeedForward,
    ln2: LayerNorm,
}

impl EncoderLayer {
    fn load(cfg: &PpgsModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.hidden_channels;
        Ok(Self {
            attn: SelfAttention::load(cfg, vb.pp("attention"))?,
            ln1: candle_nn::layer_norm(hidden, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            ff: FeedForward::load(cfg, vb.pp("feed_forward"))?,
            ln2: candle_nn::layer_norm(hidden, cfg.layer_norm_eps, vb.pp("final_layer_norm"))?,
        })
    }

    fn forward(&self, xs: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        // Pre-norm: h = x + attn(ln1(x)); y = h + ff(ln2(h)).
        let h = (xs + self.attn.forward(&self.ln1.forward(xs)?, mask)?)?;
        &h + self.ff.forward(&self.ln2.forward(&h)?)?
    }
}

/// Transformer frame model: the same strided framing convolution as the
/// convolutional variant, followed by a masked pre-norm encoder and a
/// linear head. Frames beyond an example's true length are excluded from
/// attention via the length-derived key mask.
pub(crate) struct TransformerModel {
    frame: candle_nn::Conv1d,
    layers: Vec<EncoderLayer>,
    norm: LayerNorm,
    head: Linear,
    window_size: usize,
    hopsize: usize,
}

impl TransformerModel {
    pub(crate) fn load(cfg: &PpgsModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        if cfg.hidden_channels % cfg.num_heads != 0 {
            return Err(candle_core::Error::Msg(format!(
                "hidden_channels {} not divisible by num_heads {}",
                cfg.hidden_channels, cfg.num_heads
            )));
        }
        let frame_cfg = candle_nn::Conv1dConfig {
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
        let mut layers = Vec::with_capacity(cfg.num_layers);
        for i in 0..cfg.num_layers {
            layers.push(EncoderLayer::load(cfg, vb.pp(format!("layers.{i}")))?);
        }
        let norm = candle_nn::layer_norm(cfg.hidden_channels, cfg.layer_norm_eps, vb.pp("norm"))?;
        let head = candle_nn::linear(cfg.hidden_channels, cfg.output_channels, vb.pp("head"))?;
        Ok(Self {
            frame,
            layers,
            norm,
            head,
            window_size: cfg.window_size,
            hopsize: cfg.hopsize,
        })
    }

    fn frame_mask(
        &self,
        lengths: &Tensor,
        batch: usize,
        frames: usize,
    ) -> candle_core::Result<Tensor> {
        let device = lengths.device().clone();
        let lengths = lengths.to_vec1::<i64>()?;
        if lengths.len() != batch {
            return Err(candle_core::Error::Msg(format!(
                "lengths has {} entries for a batch of {batch}",
                lengths.len()
            )));
        }
        let mut mask = vec![0f32; batch * frames];
        for (b, &samples) in lengths.iter().enumerate() {
            let valid = if samples < self.window_size as i64 {
                0
            } else {
                ((samples as usize - self.window_size) / self.hopsize + 1).min(frames)
            };
            for j in valid..frames {
                mask[b * frames + j] = MASK_VALUE;
            }
        }
        Tensor::from_vec(mask, (batch, 1, 1, frames), &device)
    }
}

impl FrameModel for TransformerModel {
    fn forward(&self, audio: &Tensor, lengths: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.frame.forward(&audio.unsqueeze(1)?)?.gelu()?;
        // (batch, hidden, frames) -> (batch, frames, hidden)
        let mut h = h.transpose(1, 2)?.contiguous()?;
        let (batch, frames, _) = h.dims3()?;
        let mask = self
            .frame_mask(lengths, batch, frames)?
            .to_device(h.device())?;
        for layer in &self.layers {
            h = layer.forward(&h, &mask)?;
        }
        self.head.forward(&self.norm.forward(&h)?)
    }
}
