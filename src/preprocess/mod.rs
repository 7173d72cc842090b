pub mod bottleneck;

pub use bottleneck::{BottleneckExtractor, ModelCache};
