use std::collections::HashMap;
use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};

use crate::alignment::{alignment_to_indices, frame_times, Alignment, PhonemeMap};
use crate::audio;
use crate::error::PpgsError;
use crate::types::DatasetItem;
use crate::{HOPSIZE, SAMPLE_RATE};

/// Name of the partition map file external tooling writes into the cache.
const PARTITION_FILE: &str = "partitions.json";

/// Resolves stems to their cached artifacts. For dataset `name` the cache
/// directory holds, per stem, `{stem}-{representation}.safetensors`,
/// `{stem}.textgrid` and `{stem}.wav`, all describing the same recording.
#[derive(Debug)]
pub struct Dataset {
    cache: PathBuf,
    stems: Vec<String>,
    representation: String,
    phoneme_map: PhonemeMap,
    device: Device,
}

impl Dataset {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        stems: Vec<String>,
        representation: impl Into<String>,
    ) -> Self {
        Self {
            cache: cache_dir.into(),
            stems,
            representation: representation.into(),
            phoneme_map: PhonemeMap::default(),
            device: Device::Cpu,
        }
    }

    /// Build a dataset from one partition of the cache's `partitions.json`
    /// (a map of partition name to stem list, written by external tooling).
    pub fn from_partition(
        cache_dir: impl Into<PathBuf>,
        partition: &str,
        representation: impl Into<String>,
    ) -> Result<Self, PpgsError> {
        let cache = cache_dir.into();
        let data = std::fs::read_to_string(cache.join(PARTITION_FILE))
            .map_err(|e| PpgsError::io("read partition file", e))?;
        let mut partitions: HashMap<String, Vec<String>> =
            serde_json::from_str(&data).map_err(|e| PpgsError::json("parse partition file", e))?;
        let stems = partitions.remove(partition).ok_or_else(|| {
            PpgsError::invalid_input(format!(
                "partition '{partition}' not found in {}",
                cache.join(PARTITION_FILE).display()
            ))
        })?;
        Ok(Self::new(cache, stems, representation))
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn stems(&self) -> &[String] {
        &self.stems
    }

    /// Load the `index`th item: feature tensor, frame-aligned phoneme
    /// indices, alignment, word breaks and waveform for one stem.
    pub fn item(&self, index: usize) -> Result<DatasetItem, PpgsError> {
        let stem = self.stems.get(index).ok_or_else(|| {
            PpgsError::invalid_input(format!(
                "dataset index {index} out of range for {} stems",
                self.stems.len()
            ))
        })?;

        let ppg = self.load_features(stem)?;
        let frames = ppg
            .dims2()
            .map_err(|e| PpgsError::runtime("feature dims", e))?
            .1;

        // Frame k is centered on sample k * HOPSIZE.
        let hopsize = HOPSIZE as f64 / SAMPLE_RATE as f64;
        let alignment = Alignment::from_textgrid(&self.cache.join(format!("{stem}.textgrid")))?;
        let times = frame_times(frames, hopsize, alignment.duration());

        let (indices, word_breaks) =
            alignment_to_indices(&alignment, hopsize, Some(&times), &self.phoneme_map)
                .map_err(|e| PpgsError::stem(stem, e))?;
        debug_assert_eq!(indices.len(), frames);

        let waveform = audio::load_wav(&self.cache.join(format!("{stem}.wav")))?;

        Ok(DatasetItem {
            ppg,
            indices,
            alignment,
            word_breaks,
            waveform,
            stem: stem.clone(),
        })
    }

    fn load_features(&self, stem: &str) -> Result<Tensor, PpgsError> {
        let path = self
            .cache
            .join(format!("{stem}-{}.safetensors", self.representation));
        let data = std::fs::read(&path).map_err(|e| PpgsError::io("read feature cache", e))?;
        let mut tensors = candle_core::safetensors::load_buffer(&data, &self.device)
            .map_err(|e| PpgsError::runtime("parse feature cache", e))?;

        let tensor = match tensors.remove(&self.representation) {
            Some(tensor) => tensor,
            None => {
                let mut values = tensors.into_values();
                match (values.next(), values.next()) {
                    // A sole unnamed tensor is accepted regardless of key.
                    (Some(tensor), None) => tensor,
                    _ => {
                        return Err(PpgsError::invalid_input(format!(
                            "no tensor named '{}' in {}",
                            self.representation,
                            path.display()
                        )))
                    }
                }
            }
        };
        // Batched extraction stores f16; training always consumes f32.
        if tensor.dtype() == DType::F32 {
            Ok(tensor)
        } else {
            tensor
                .to_dtype(DType::F32)
                .map_err(|e| PpgsError::runtime("upcast feature cache", e))
        }
    }
}
