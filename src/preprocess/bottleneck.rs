use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use indicatif::{ProgressBar, ProgressStyle};

use crate::audio;
use crate::config::PpgsModelConfig;
use crate::error::PpgsError;
use crate::model::FrameModel;
use crate::types::Waveform;
use crate::REPRESENTATION;

/// Bottleneck PPG extraction: resample, pad, run the frame model, crop to
/// channel-major features.
///
/// The extractor owns its loaded model and records the checkpoint it came
/// from; there is no hidden per-process model state. Use [`ModelCache`] to
/// share extractors across call sites.
pub struct BottleneckExtractor {
    model: Box<dyn FrameModel>,
    config: PpgsModelConfig,
    device: Device,
    checkpoint: PathBuf,
}

impl BottleneckExtractor {
    /// Load the model described by a JSON config and a safetensors
    /// checkpoint onto the requested device (`"cpu"` or `"cuda"`).
    pub fn load(config_path: &Path, checkpoint: &Path, device: &str) -> Result<Self, PpgsError> {
        let config = PpgsModelConfig::load(config_path)?;
        let device = parse_device(device)?;

        let model_data =
            std::fs::read(checkpoint).map_err(|e| PpgsError::io("read checkpoint", e))?;
        let vb = VarBuilder::from_buffered_safetensors(model_data, DType::F32, &device)
            .map_err(|e| PpgsError::runtime("load checkpoint", e))?;
        let model = config
            .model
            .build(&config, vb)
            .map_err(|e| PpgsError::runtime("build model", e))?;

        tracing::info!(
            kind = ?config.model,
            channels = config.output_channels,
            window = config.window_size,
            hopsize = config.hopsize,
            ?device,
            checkpoint = %checkpoint.display(),
            "bottleneck model loaded"
        );

        Ok(Self {
            model,
            config,
            device,
            checkpoint: checkpoint.to_path_buf(),
        })
    }

    /// Wrap an already-built model, bypassing config and checkpoint files.
    pub fn with_model(model: Box<dyn FrameModel>, config: PpgsModelConfig) -> Self {
        Self {
            model,
            config,
            device: Device::Cpu,
            checkpoint: PathBuf::new(),
        }
    }

    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }

    pub fn config(&self) -> &PpgsModelConfig {
        &self.config
    }

    /// Compute bottleneck PPGs for one recording. Returns `(channels,
    /// frames)` f32 on the extractor's device.
    pub fn from_audio(&self, waveform: &Waveform) -> Result<Tensor, PpgsError> {
        let samples = if waveform.sample_rate != self.config.sample_rate {
            audio::resample(
                &waveform.samples,
                waveform.sample_rate,
                self.config.sample_rate,
            )?
        } else {
            waveform.samples.clone()
        };

        let pad = self.config.pad_samples();
        // The model's length input must count the padded signal, derived
        // from the raw sample count so the padding cannot be counted twice.
        let length = (samples.len() + 2 * pad) as i64;
        let raw = samples.len();

        let audio = Tensor::from_vec(samples, (1, raw), &self.device)
            .map_err(|e| PpgsError::runtime("audio tensor", e))?;
        let audio = audio
            .pad_with_zeros(D::Minus1, pad, pad)
            .map_err(|e| PpgsError::runtime("pad audio", e))?;
        let lengths = Tensor::from_vec(vec![length], (1,), &self.device)
            .map_err(|e| PpgsError::runtime("length tensor", e))?;

        let features = self
            .model
            .forward(&audio, &lengths)
            .map_err(|e| PpgsError::runtime("forward pass", e))?;

        // (1, frames, channels): drop the lone batch element, go
        // channel-major to match the collation engine's (C, L) layout.
        features
            .get(0)
            .and_then(|t| t.t())
            .and_then(|t| t.contiguous())
            .map_err(|e| PpgsError::runtime("transpose features", e))
    }

    /// Batched extraction: `audios` is `(batch, samples)` with each row's
    /// true sample count in `lengths`. Returns `(batch, channels, frames)`
    /// cast to f16 for storage.
    pub fn from_audios(
        &self,
        audios: &Tensor,
        lengths: &[i64],
        sample_rate: u32,
    ) -> Result<Tensor, PpgsError> {
        let (batch, row_len) = audios
            .dims2()
            .map_err(|e| PpgsError::runtime("audio batch dims", e))?;
        if lengths.len() != batch {
            return Err(PpgsError::invalid_input(format!(
                "audio batch has {batch} rows but {} lengths",
                lengths.len()
            )));
        }

        let rows = audios
            .to_vec2::<f32>()
            .map_err(|e| PpgsError::runtime("audio batch read", e))?;
        let mut resampled = Vec::with_capacity(batch);
        for (i, row) in rows.iter().enumerate() {
            let true_len = lengths[i].max(0) as usize;
            if true_len > row_len {
                return Err(PpgsError::invalid_input(format!(
                    "length {true_len} of row {i} exceeds the batch's {row_len} samples"
                )));
            }
            let prefix = &row[..true_len];
            let samples = if sample_rate != self.config.sample_rate {
                audio::resample(prefix, sample_rate, self.config.sample_rate)?
            } else {
                prefix.to_vec()
            };
            resampled.push(samples);
        }

        let pad = self.config.pad_samples();
        let max_len = resampled.iter().map(Vec::len).max().unwrap_or(0);
        let padded_len = max_len + 2 * pad;
        let mut buffer = vec![0f32; batch * padded_len];
        let mut new_lengths = Vec::with_capacity(batch);
        for (i, samples) in resampled.iter().enumerate() {
            let offset = i * padded_len + pad;
            buffer[offset..offset + samples.len()].copy_from_slice(samples);
            new_lengths.push((samples.len() + 2 * pad) as i64);
        }

        let audio = Tensor::from_vec(buffer, (batch, padded_len), &self.device)
            .map_err(|e| PpgsError::runtime("audio batch tensor", e))?;
        let lengths = Tensor::from_vec(new_lengths, (batch,), &self.device)
            .map_err(|e| PpgsError::runtime("length tensor", e))?;

        let features = self
            .model
            .forward(&audio, &lengths)
            .map_err(|e| PpgsError::runtime("forward pass", e))?;
        features
            .transpose(1, 2)
            .and_then(|t| t.contiguous())
            .and_then(|t| t.to_dtype(DType::F16))
            .map_err(|e| PpgsError::runtime("store features", e))
    }

    /// Compute PPGs for an audio file and move them to host memory.
    pub fn from_file(&self, audio_file: &Path) -> Result<Tensor, PpgsError> {
        let waveform = audio::load_wav(audio_file)?;
        self.from_audio(&waveform)?
            .to_device(&Device::Cpu)
            .map_err(|e| PpgsError::runtime("move features to host", e))
    }

    /// Compute PPGs for an audio file and persist them as safetensors.
    pub fn from_file_to_file(
        &self,
        audio_file: &Path,
        output_file: &Path,
    ) -> Result<(), PpgsError> {
        let ppg = self.from_file(audio_file)?;
        ppg.save_safetensors(REPRESENTATION, output_file)
            .map_err(|e| PpgsError::runtime("save features", e))
    }

    /// Extract PPGs for paired input/output paths, in order, with progress
    /// reporting.
    pub fn from_files_to_files(
        &self,
        audio_files: &[PathBuf],
        output_files: &[PathBuf],
    ) -> Result<(), PpgsError> {
        if audio_files.len() != output_files.len() {
            return Err(PpgsError::invalid_input(format!(
                "{} audio files but {} output files",
                audio_files.len(),
                output_files.len()
            )));
        }

        let progress = ProgressBar::new(audio_files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        progress.set_message("extracting PPGs");

        for (audio_file, output_file) in audio_files.iter().zip(output_files.iter()) {
            progress.set_message(
                audio_file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            self.from_file_to_file(audio_file, output_file)?;
            progress.inc(1);
        }
        progress.finish_with_message("extraction complete");
        Ok(())
    }
}

/// Loaded extractors keyed by checkpoint path. Requesting two different
/// checkpoints in one process yields two distinct models rather than
/// silently reusing whichever loaded first.
pub struct ModelCache {
    config_path: PathBuf,
    device: String,
    extractors: Mutex<HashMap<PathBuf, Arc<BottleneckExtractor>>>,
}

impl ModelCache {
    pub fn new(config_path: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
            device: device.into(),
            extractors: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the extractor for a checkpoint, loading it on first use.
    pub fn get(&self, checkpoint: &Path) -> Result<Arc<BottleneckExtractor>, PpgsError> {
        let mut extractors = self
            .extractors
            .lock()
            .map_err(|_| PpgsError::runtime("model cache lock", "cache mutex poisoned"))?;
        if let Some(extractor) = extractors.get(checkpoint) {
            return Ok(Arc::clone(extractor));
        }
        let extractor = Arc::new(BottleneckExtractor::load(
            &self.config_path,
            checkpoint,
            &self.device,
        )?);
        extractors.insert(checkpoint.to_path_buf(), Arc::clone(&extractor));
        Ok(extractor)
    }
}

fn parse_device(device: &str) -> Result<Device, PpgsError> {
    match device {
        "cuda" => Device::new_cuda(0).map_err(|e| PpgsError::runtime("CUDA init", e)),
        _ => Ok(Device::Cpu),
    }
}
