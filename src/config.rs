use std::path::{Path, PathBuf};

use crate::data::{BatchPolicy, Dataset, Loader};
use crate::error::PpgsError;
use crate::model::ModelKind;
use crate::preprocess::{BottleneckExtractor, ModelCache};

/// Runtime configuration for dataset access and extraction.
#[derive(Debug, Clone)]
pub struct PpgsConfig {
    pub cache_dir: PathBuf,
    pub config_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub device: String,
    pub num_workers: usize,
    pub representation: String,
}

impl PpgsConfig {
    pub const DEFAULT_NUM_WORKERS: usize = 4;

    /// Dataset over one partition of this config's cache directory.
    pub fn dataset(&self, partition: &str) -> Result<Dataset, PpgsError> {
        Dataset::from_partition(&self.cache_dir, partition, self.representation.clone())
    }

    /// Loader over one partition, with this config's worker count.
    pub fn loader(
        &self,
        partition: &str,
        policy: Box<dyn BatchPolicy>,
    ) -> Result<Loader, PpgsError> {
        Ok(Loader::new(self.dataset(partition)?, policy, self.num_workers))
    }

    /// Extractor for this config's own checkpoint.
    pub fn extractor(&self) -> Result<BottleneckExtractor, PpgsError> {
        BottleneckExtractor::load(&self.config_path, &self.checkpoint_path, &self.device)
    }

    /// Checkpoint-keyed extractor cache for this config's model settings.
    pub fn model_cache(&self) -> ModelCache {
        ModelCache::new(&self.config_path, self.device.clone())
    }
}

impl Default for PpgsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            checkpoint_path: PathBuf::new(),
            device: "cpu".to_string(),
            num_workers: Self::DEFAULT_NUM_WORKERS,
            representation: "ppg".to_string(),
        }
    }
}

/// Model configuration loaded from a JSON file next to the checkpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PpgsModelConfig {
    pub model: ModelKind,
    #[serde(default = "default_hidden_channels")]
    pub hidden_channels: usize,
    #[serde(default = "default_output_channels")]
    pub output_channels: usize,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_num_heads")]
    pub num_heads: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_hopsize")]
    pub hopsize: usize,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
}

fn default_hidden_channels() -> usize {
    256
}
fn default_output_channels() -> usize {
    crate::alignment::PHONEMES.len()
}
fn default_kernel_size() -> usize {
    5
}
fn default_num_layers() -> usize {
    4
}
fn default_num_heads() -> usize {
    4
}
fn default_sample_rate() -> u32 {
    crate::SAMPLE_RATE
}
fn default_window_size() -> usize {
    crate::WINDOW_SIZE
}
fn default_hopsize() -> usize {
    crate::HOPSIZE
}
fn default_eps() -> f64 {
    1e-5
}

impl PpgsModelConfig {
    pub fn load(path: &Path) -> Result<Self, PpgsError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| PpgsError::io("read model config", e))?;
        serde_json::from_str(&data).map_err(|e| PpgsError::json("parse model config", e))
    }

    pub fn hopsize_seconds(&self) -> f64 {
        self.hopsize as f64 / self.sample_rate as f64
    }

    /// Samples of zero padding added to each side of the audio before
    /// inference, so that frame centers line up with multiples of the hop.
    pub fn pad_samples(&self) -> usize {
        self.window_size / 2 - self.hopsize / 2
    }

    /// Frames the framing convolution produces for a padded input length.
    pub fn output_frames(&self, padded_samples: usize) -> usize {
        if padded_samples < self.window_size {
            return 0;
        }
        (padded_samples - self.window_size) / self.hopsize + 1
    }
}
