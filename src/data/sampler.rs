use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Partitions dataset indices into batches. Implementations decide batch
/// membership only; item loading and collation happen elsewhere.
pub trait BatchPolicy: Send + Sync {
    fn batches(&self, len: usize) -> Vec<Vec<usize>>;
}

/// Seeded random shuffle chunked into fixed-size batches. Deterministic for
/// a given `(len, seed)` pair so epochs are reproducible.
#[derive(Debug, Clone)]
pub struct RandomBatchPolicy {
    pub batch_size: usize,
    pub seed: u64,
    pub drop_last: bool,
}

impl RandomBatchPolicy {
    pub fn new(batch_size: usize, seed: u64) -> Self {
        Self {
            batch_size,
            seed,
            drop_last: false,
        }
    }
}

impl BatchPolicy for RandomBatchPolicy {
    fn batches(&self, len: usize) -> Vec<Vec<usize>> {
        if self.batch_size == 0 || len == 0 {
            return Vec::new();
        }
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let mut batches: Vec<Vec<usize>> = indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        if self.drop_last {
            if let Some(last) = batches.last() {
                if last.len() < self.batch_size {
                    batches.pop();
                }
            }
        }
        batches
    }
}

/// In-order chunking without shuffling, for evaluation passes.
#[derive(Debug, Clone)]
pub struct SequentialBatchPolicy {
    pub batch_size: usize,
}

impl SequentialBatchPolicy {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl BatchPolicy for SequentialBatchPolicy {
    fn batches(&self, len: usize) -> Vec<Vec<usize>> {
        if self.batch_size == 0 || len == 0 {
            return Vec::new();
        }
        (0..len)
            .collect::<Vec<usize>>()
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}
