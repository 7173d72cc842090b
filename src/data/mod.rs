pub mod collate;
pub mod dataset;
pub mod loader;
pub mod sampler;

pub use collate::{collate, collate_reduced};
pub use dataset::Dataset;
pub use loader::Loader;
pub use sampler::{BatchPolicy, RandomBatchPolicy, SequentialBatchPolicy};
