use crate::{
    common::*,
    dataset::{Mode, Sample, VideoDataset},
    message::{IndexBatch, SampleBatch},
};
use crossbeam::channel::{bounded, Receiver, Sender};

#[derive(Debug)]
pub struct LoaderInit {
    pub dataset: Arc<VideoDataset>,
    pub batch_size: usize,
    pub num_workers: usize,
    pub prefetch: usize,
    pub seed: u64,
}

impl LoaderInit {
    pub fn build(self) -> Loader {
        let Self {
            dataset,
            batch_size,
            num_workers,
            prefetch,
            seed,
        } = self;

        Loader {
            dataset,
            batch_size: batch_size.max(1),
            num_workers: num_workers.max(1),
            prefetch: prefetch.max(1),
            seed,
        }
    }
}

/// A prefetching batch loader over a [`VideoDataset`].
///
/// Each epoch spawns an index feeder plus `num_workers` loading threads
/// connected by bounded channels; workers service `get(index)` calls
/// independently and stream finished batches back ahead of consumption.
/// Train epochs shuffle the index permutation from the seed; validation
/// epochs keep the deterministic order.
#[derive(Debug)]
pub struct Loader {
    dataset: Arc<VideoDataset>,
    batch_size: usize,
    num_workers: usize,
    prefetch: usize,
    seed: u64,
}

impl Loader {
    pub fn dataset(&self) -> &VideoDataset {
        &self.dataset
    }

    /// Number of batches one epoch yields before per-sample drops.
    pub fn batches_per_epoch(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn epoch(&self, epoch: u64) -> Batches {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.dataset.mode() == Mode::Train {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch));
            indices.shuffle(&mut rng);
        }

        let (index_tx, index_rx) = bounded::<IndexBatch>(self.num_workers * 2);
        let (batch_tx, batch_rx) = bounded::<SampleBatch>(self.prefetch);

        let batch_size = self.batch_size;
        let feeder = thread::Builder::new()
            .name("loader-feeder".into())
            .spawn(move || feed_indices(indices, batch_size, index_tx))
            .expect("failed to spawn loader feeder");

        let workers = (0..self.num_workers)
            .map(|worker_index| {
                let dataset = self.dataset.clone();
                let index_rx = index_rx.clone();
                let batch_tx = batch_tx.clone();
                thread::Builder::new()
                    .name(format!("loader-worker-{}", worker_index))
                    .spawn(move || load_batches(dataset, index_rx, batch_tx))
                    .expect("failed to spawn loader worker")
            })
            .collect();

        Batches {
            batch_rx: Some(batch_rx),
            feeder: Some(feeder),
            workers,
        }
    }
}

fn feed_indices(indices: Vec<usize>, batch_size: usize, index_tx: Sender<IndexBatch>) {
    for (serial, chunk) in indices.chunks(batch_size).enumerate() {
        let batch = IndexBatch {
            serial,
            indices: chunk.to_vec(),
        };
        if index_tx.send(batch).is_err() {
            // consumer hung up mid-epoch
            return;
        }
    }
}

fn load_batches(
    dataset: Arc<VideoDataset>,
    index_rx: Receiver<IndexBatch>,
    batch_tx: Sender<SampleBatch>,
) {
    while let Ok(IndexBatch { serial, indices }) = index_rx.recv() {
        let samples = indices
            .into_iter()
            .filter_map(|index| match dataset.get(index) {
                Ok(sample) => Some(sample),
                Err(err) => {
                    // One failed sample shrinks its batch, never the epoch.
                    warn!("skipping sample {}: {}", index, err);
                    None
                }
            })
            .collect();
        if batch_tx.send(SampleBatch { serial, samples }).is_err() {
            return;
        }
    }
}

/// Iterator over one epoch's collated sample batches.
pub struct Batches {
    batch_rx: Option<Receiver<SampleBatch>>,
    feeder: Option<thread::JoinHandle<()>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Iterator for Batches {
    type Item = Vec<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch_rx = self.batch_rx.as_ref()?;
        loop {
            match batch_rx.recv() {
                // a batch whose samples all failed is skipped outright
                Ok(batch) if batch.samples.is_empty() => continue,
                Ok(batch) => return Some(batch.samples),
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        // Closing the receiver first unblocks any worker mid-send.
        self.batch_rx.take();
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
