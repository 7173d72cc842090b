use candle_core::Tensor;

use crate::alignment::Alignment;

/// Mono audio at a known sample rate.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One stem's paired artifacts, time axes already reconciled.
#[derive(Debug, Clone)]
pub struct DatasetItem {
    /// Feature tensor of shape (channels, frames).
    pub ppg: Tensor,
    /// One phoneme class index per frame; same length as the frame axis.
    pub indices: Vec<i64>,
    pub alignment: Alignment,
    /// Frame indices at which a new non-silence word begins.
    pub word_breaks: Vec<usize>,
    pub waveform: Waveform,
    pub stem: String,
}

/// Loss-ready padded batch: (N, C, L) features, (N, L) labels, (N,) lengths.
///
/// Padded label positions hold [`crate::IGNORE_INDEX`]; padded feature
/// positions are zero.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    pub ppgs: Tensor,
    pub indices: Tensor,
    pub lengths: Tensor,
}

/// Padded batch plus the per-example artifacts needed for evaluation,
/// passed through in input order.
#[derive(Debug, Clone)]
pub struct EvalBatch {
    pub ppgs: Tensor,
    pub indices: Tensor,
    pub alignments: Vec<Alignment>,
    pub word_breaks: Vec<Vec<usize>>,
    pub waveforms: Vec<Waveform>,
    pub stems: Vec<String>,
}
