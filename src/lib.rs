pub mod alignment;
pub mod audio;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod preprocess;
pub mod types;

pub use alignment::{Alignment, PhonemeMap};
pub use config::{PpgsConfig, PpgsModelConfig};
pub use data::{collate, collate_reduced, BatchPolicy, Dataset, Loader, RandomBatchPolicy};
pub use error::PpgsError;
pub use model::{FrameModel, ModelKind};
pub use preprocess::{BottleneckExtractor, ModelCache};
pub use types::{DatasetItem, EvalBatch, TrainingBatch, Waveform};

/// Native sample rate of the PPG models, in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples between consecutive frame centers at the native rate.
pub const HOPSIZE: usize = 160;

/// Analysis window of the frame models, in samples.
pub const WINDOW_SIZE: usize = 1024;

/// Label value excluded from loss computation. Must match the loss
/// function's configured ignore value; fixed crate-wide by contract.
pub const IGNORE_INDEX: i64 = -100;

/// Tensor key and default representation name for cached features.
pub const REPRESENTATION: &str = "ppg";
