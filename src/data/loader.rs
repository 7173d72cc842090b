use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::collate::{collate, collate_reduced};
use crate::data::dataset::Dataset;
use crate::data::sampler::BatchPolicy;
use crate::error::PpgsError;
use crate::types::{DatasetItem, EvalBatch, TrainingBatch};

/// Batches dispatched to the worker pool ahead of the one being consumed.
const DEFAULT_PREFETCH_BATCHES: usize = 2;

/// Composes a dataset, a batching policy and the collation engine into an
/// iterable of padded batches with bounded worker parallelism.
///
/// Workers perform independent per-item loads; collation runs on the
/// consumer thread once every item of a batch has arrived. Batches are
/// always yielded in the order the policy produced them.
pub struct Loader {
    dataset: Arc<Dataset>,
    policy: Box<dyn BatchPolicy>,
    num_workers: usize,
    prefetch_batches: usize,
}

impl Loader {
    pub fn new(dataset: Dataset, policy: Box<dyn BatchPolicy>, num_workers: usize) -> Self {
        Self {
            dataset: Arc::new(dataset),
            policy,
            num_workers,
            prefetch_batches: DEFAULT_PREFETCH_BATCHES,
        }
    }

    pub fn with_prefetch(mut self, prefetch_batches: usize) -> Self {
        self.prefetch_batches = prefetch_batches.max(1);
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// One epoch of `(padded_ppgs, padded_indices, lengths)` batches.
    pub fn training_batches(&self) -> TrainingBatches {
        TrainingBatches {
            inner: self.item_batches(),
        }
    }

    /// One epoch of evaluation batches carrying alignments, word breaks,
    /// waveforms and stems alongside the padded tensors.
    pub fn evaluation_batches(&self) -> EvalBatches {
        EvalBatches {
            inner: self.item_batches(),
        }
    }

    fn item_batches(&self) -> ItemBatches {
        let batches = self.policy.batches(self.dataset.len());
        if self.num_workers == 0 {
            return ItemBatches {
                dataset: Arc::clone(&self.dataset),
                batches,
                next_dispatch: 0,
                next_yield: 0,
                prefetch: self.prefetch_batches,
                pending: HashMap::new(),
                completed: HashMap::new(),
                task_tx: None,
                done_rx: None,
                workers: Vec::new(),
            };
        }

        let (task_tx, task_rx) = unbounded::<LoadTask>();
        let (done_tx, done_rx) = unbounded::<LoadDone>();
        tracing::debug!(
            workers = self.num_workers,
            batches = batches.len(),
            prefetch = self.prefetch_batches,
            "starting loader worker pool"
        );
        let mut workers = Vec::with_capacity(self.num_workers);
        for _ in 0..self.num_workers {
            let dataset = Arc::clone(&self.dataset);
            let task_rx: Receiver<LoadTask> = task_rx.clone();
            let done_tx: Sender<LoadDone> = done_tx.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let item = dataset.item(task.index);
                    let done = LoadDone {
                        batch: task.batch,
                        slot: task.slot,
                        item,
                    };
                    if done_tx.send(done).is_err() {
                        break;
                    }
                }
            }));
        }

        ItemBatches {
            dataset: Arc::clone(&self.dataset),
            batches,
            next_dispatch: 0,
            next_yield: 0,
            prefetch: self.prefetch_batches,
            pending: HashMap::new(),
            completed: HashMap::new(),
            task_tx: Some(task_tx),
            done_rx: Some(done_rx),
            workers,
        }
    }
}

struct LoadTask {
    batch: usize,
    slot: usize,
    index: usize,
}

struct LoadDone {
    batch: usize,
    slot: usize,
    item: Result<DatasetItem, PpgsError>,
}

struct PendingBatch {
    slots: Vec<Option<DatasetItem>>,
    remaining: usize,
    failed: Option<PpgsError>,
}

/// Ordered stream of un-collated item batches. The worker pool runs ahead
/// by at most `prefetch` batches; an item-load failure fails its batch and
/// iteration continues with the next one.
struct ItemBatches {
    dataset: Arc<Dataset>,
    batches: Vec<Vec<usize>>,
    next_dispatch: usize,
    next_yield: usize,
    prefetch: usize,
    pending: HashMap<usize, PendingBatch>,
    completed: HashMap<usize, Result<Vec<DatasetItem>, PpgsError>>,
    task_tx: Option<Sender<LoadTask>>,
    done_rx: Option<Receiver<LoadDone>>,
    workers: Vec<JoinHandle<()>>,
}

impl ItemBatches {
    fn dispatch(&mut self) {
        let Some(task_tx) = &self.task_tx else {
            return;
        };
        while self.next_dispatch < self.batches.len()
            && self.next_dispatch < self.next_yield + self.prefetch
        {
            let batch = self.next_dispatch;
            self.next_dispatch += 1;
            let indices = &self.batches[batch];
            if indices.is_empty() {
                self.completed.insert(batch, Ok(Vec::new()));
                continue;
            }
            self.pending.insert(
                batch,
                PendingBatch {
                    slots: (0..indices.len()).map(|_| None).collect(),
                    remaining: indices.len(),
                    failed: None,
                },
            );
            for (slot, &index) in indices.iter().enumerate() {
                let _ = task_tx.send(LoadTask { batch, slot, index });
            }
        }
    }

    fn absorb(&mut self, done: LoadDone) {
        let Some(pending) = self.pending.get_mut(&done.batch) else {
            return;
        };
        pending.remaining -= 1;
        match done.item {
            Ok(item) => pending.slots[done.slot] = Some(item),
            Err(err) => {
                if pending.failed.is_none() {
                    pending.failed = Some(err);
                }
            }
        }
        if pending.remaining > 0 {
            return;
        }
        let Some(pending) = self.pending.remove(&done.batch) else {
            return;
        };
        let expected = pending.slots.len();
        let result = match pending.failed {
            Some(err) => Err(err),
            None => {
                let items: Vec<DatasetItem> = pending.slots.into_iter().flatten().collect();
                if items.len() == expected {
                    Ok(items)
                } else {
                    Err(PpgsError::runtime(
                        "data loader",
                        "completed batch is missing items",
                    ))
                }
            }
        };
        self.completed.insert(done.batch, result);
    }

    fn load_inline(&self, batch: usize) -> Result<Vec<DatasetItem>, PpgsError> {
        let indices = &self.batches[batch];
        let mut items = Vec::with_capacity(indices.len());
        for &index in indices {
            items.push(self.dataset.item(index)?);
        }
        Ok(items)
    }
}

impl Iterator for ItemBatches {
    type Item = Result<Vec<DatasetItem>, PpgsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_yield >= self.batches.len() {
            return None;
        }

        if self.task_tx.is_none() {
            let result = self.load_inline(self.next_yield);
            self.next_yield += 1;
            return Some(result);
        }

        self.dispatch();
        loop {
            if let Some(result) = self.completed.remove(&self.next_yield) {
                self.next_yield += 1;
                self.dispatch();
                return Some(result);
            }
            let received = {
                let Some(done_rx) = &self.done_rx else {
                    return Some(Err(PpgsError::runtime(
                        "data loader",
                        "worker pool is not running",
                    )));
                };
                done_rx.recv()
            };
            match received {
                Ok(done) => self.absorb(done),
                Err(_) => {
                    return Some(Err(PpgsError::runtime(
                        "data loader",
                        "worker pool disconnected before the batch completed",
                    )))
                }
            }
        }
    }
}

impl Drop for ItemBatches {
    fn drop(&mut self) {
        // Closing the task channel lets workers drain and exit.
        self.task_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

pub struct TrainingBatches {
    inner: ItemBatches,
}

impl Iterator for TrainingBatches {
    type Item = Result<TrainingBatch, PpgsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|result| result.and_then(collate_reduced))
    }
}

pub struct EvalBatches {
    inner: ItemBatches,
}

impl Iterator for EvalBatches {
    type Item = Result<EvalBatch, PpgsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|result| result.and_then(collate))
    }
}
