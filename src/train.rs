use crate::{
    aggregate::{Aggregator, VideoPrediction},
    checkpoint,
    clip::Modality,
    common::*,
    dataset::Sample,
    loader::Loader,
    metrics::{EpochMetrics, MetricsWriter},
    model::C3dInit,
    params::{PLATEAU_FACTOR, PLATEAU_PATIENCE},
};

/// Reduce-on-plateau learning rate schedule observing validation loss.
///
/// After `patience` consecutive epochs without the loss improving on the
/// best seen, the learning rate is multiplied by `factor` and the stall
/// counter resets.
#[derive(Debug)]
pub struct PlateauScheduler {
    learning_rate: f64,
    factor: f64,
    patience: usize,
    best_loss: f64,
    stalled: usize,
}

impl PlateauScheduler {
    pub fn new(learning_rate: f64, factor: f64, patience: usize) -> Self {
        Self {
            learning_rate,
            factor,
            patience,
            best_loss: f64::INFINITY,
            stalled: 0,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Feeds one epoch's validation loss; returns the reduced learning rate
    /// when a plateau triggers.
    pub fn observe(&mut self, val_loss: f64) -> Option<f64> {
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.stalled = 0;
            return None;
        }

        self.stalled += 1;
        if self.stalled > self.patience {
            self.stalled = 0;
            self.learning_rate *= self.factor;
            Some(self.learning_rate)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct TrainLoopInit {
    pub train_loader: Loader,
    pub val_loader: Loader,
    pub modality: Modality,
    pub num_classes: i64,
    pub epochs: i64,
    pub learning_rate: f64,
    pub momentum: f64,
    pub device: Device,
    pub checkpoint_dir: Option<PathBuf>,
    pub metrics: MetricsWriter,
    pub shutdown: Arc<AtomicBool>,
}

impl TrainLoopInit {
    pub fn build(self) -> Result<TrainLoop> {
        let Self {
            train_loader,
            val_loader,
            modality,
            num_classes,
            epochs,
            learning_rate,
            momentum,
            device,
            checkpoint_dir,
            metrics,
            shutdown,
        } = self;

        let vs = VarStore::new(device);
        let model = C3dInit::new(modality.model_channels(), num_classes).build(&vs.root());
        let optimizer = Sgd {
            momentum,
            ..Default::default()
        }
        .build(&vs, learning_rate)?;

        Ok(TrainLoop {
            vs,
            model,
            optimizer,
            scheduler: PlateauScheduler::new(learning_rate, PLATEAU_FACTOR, PLATEAU_PATIENCE),
            train_loader,
            val_loader,
            modality,
            num_classes,
            epochs,
            device,
            checkpoint_dir,
            metrics,
            shutdown,
            best_acc: 0.0,
        })
    }
}

/// Drives training and validation epochs, tracks the best validation
/// accuracy seen and persists a checkpoint whenever it improves.
pub struct TrainLoop {
    vs: VarStore,
    model: Box<dyn Fn(&Tensor, bool) -> Tensor + Send>,
    optimizer: Optimizer,
    scheduler: PlateauScheduler,
    train_loader: Loader,
    val_loader: Loader,
    modality: Modality,
    num_classes: i64,
    epochs: i64,
    device: Device,
    checkpoint_dir: Option<PathBuf>,
    metrics: MetricsWriter,
    shutdown: Arc<AtomicBool>,
    best_acc: f64,
}

impl TrainLoop {
    pub fn run(&mut self) -> Result<()> {
        for epoch in 0..self.epochs {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!("shutting down before epoch {}", epoch);
                break;
            }

            info!("==> Epoch [{}/{}] training stage", epoch, self.epochs);
            let instant = Instant::now();
            let (train_acc, train_loss) = self.train_one_epoch(epoch)?;
            info!(
                "train accuracy: {:.4}\ttrain loss: {:.4}\telapsed: {}s",
                train_acc,
                train_loss,
                instant.elapsed().as_secs()
            );

            info!("==> Epoch [{}/{}] validation stage", epoch, self.epochs);
            let (val_acc, val_loss, predictions) = self.validate_one_epoch(epoch)?;
            info!(
                "validation accuracy: {:.4}\tvalidation loss: {:.4}",
                val_acc, val_loss
            );

            if let Some(reduced) = self.scheduler.observe(val_loss) {
                info!("validation loss plateaued, reducing learning rate to {}", reduced);
                self.optimizer.set_lr(reduced);
            }

            if val_acc > self.best_acc {
                self.best_acc = val_acc;
                if let Some(dir) = self.checkpoint_dir.clone() {
                    checkpoint::save_best(&self.vs, epoch, &predictions, &dir)?;
                }
            }

            self.metrics.append(&EpochMetrics {
                epoch,
                train_acc,
                train_loss,
                val_acc,
                val_loss,
                learning_rate: self.scheduler.learning_rate(),
            });
        }

        info!("best validation accuracy: {:.4}", self.best_acc);
        Ok(())
    }

    fn train_one_epoch(&mut self, epoch: i64) -> Result<(f64, f64)> {
        let mut loss_sum = 0.0;
        let mut correct = 0i64;
        let mut seen = 0i64;
        let mut batches = 0i64;

        for samples in self.train_loader.epoch(epoch as u64) {
            let (clips, labels) = collate_train(samples)?;
            let input = to_model_input(&clips, self.modality)?.to_device(self.device);
            let labels = labels.to_device(self.device);

            let logits = (self.model)(&input, true);
            let loss = logits.cross_entropy_for_logits(&labels);
            self.optimizer.backward_step(&loss);

            // measure accuracy and record loss
            loss_sum += loss.double_value(&[]);
            batches += 1;
            let predicted = logits.argmax(-1, false);
            correct += predicted
                .eq_tensor(&labels)
                .sum(Kind::Int64)
                .int64_value(&[]);
            seen += labels.size()[0];
        }

        ensure!(seen > 0, "training epoch {} produced no samples", epoch);
        Ok((correct as f64 / seen as f64, loss_sum / batches as f64))
    }

    fn validate_one_epoch(
        &mut self,
        epoch: i64,
    ) -> Result<(f64, f64, HashMap<String, VideoPrediction>)> {
        let aggregator = Aggregator::new(self.num_classes as usize);

        for samples in self.val_loader.epoch(epoch as u64) {
            let (videos, clips, labels) = collate_val(samples)?;
            let input = to_model_input(&clips, self.modality)?.to_device(self.device);

            let probs = tch::no_grad(|| (self.model)(&input, false))
                .softmax(-1, Kind::Float)
                .to_device(Device::Cpu);

            for (index, (video_id, label)) in videos.iter().zip(&labels).enumerate() {
                let mut scores = vec![0f32; self.num_classes as usize];
                probs
                    .select(0, index as i64)
                    .copy_data(&mut scores, self.num_classes as usize);
                aggregator.accumulate(video_id, *label, &scores);
            }
        }

        let result = aggregator.finalize();
        Ok((result.accuracy, result.mean_loss, result.predictions))
    }
}

/// Stacks train samples into `[batch, planes, size, size]` clips and a
/// label vector.
fn collate_train(samples: Vec<Sample>) -> Result<(Tensor, Tensor)> {
    let mut clips = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());
    for sample in samples {
        match sample {
            Sample::Train(clip, label) => {
                clips.push(clip);
                labels.push(label);
            }
            Sample::Val(..) => bail!("validation sample in a training batch"),
        }
    }
    Ok((Tensor::stack(&clips, 0), Tensor::from_slice(&labels)))
}

/// Stacks validation samples, keeping the per-sample video identity for
/// aggregation.
fn collate_val(samples: Vec<Sample>) -> Result<(Vec<String>, Tensor, Vec<i64>)> {
    let mut videos = Vec::with_capacity(samples.len());
    let mut clips = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());
    for sample in samples {
        match sample {
            Sample::Val(video_id, clip, label) => {
                videos.push(video_id);
                clips.push(clip);
                labels.push(label);
            }
            Sample::Train(..) => bail!("training sample in a validation batch"),
        }
    }
    Ok((videos, Tensor::stack(&clips, 0), labels))
}

/// Reshapes a `[batch, planes, size, size]` clip batch into the 5-d input
/// the model expects: flow planes split into x/y channels over time,
/// spatial planes become a single-channel cube.
fn to_model_input(clips: &Tensor, modality: Modality) -> Result<Tensor> {
    let (batch, planes, height, width) = clips.size4()?;
    let input = match modality {
        Modality::Flow => clips
            .view([batch, planes / 2, 2, height, width])
            .permute([0, 2, 1, 3, 4]),
        Modality::Spatial => clips.view([batch, 1, planes, height, width]),
    };
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_scheduler_reduces_after_patience() {
        let mut scheduler = PlateauScheduler::new(1e-3, 0.1, 1);
        assert_eq!(scheduler.observe(2.0), None); // new best
        assert_eq!(scheduler.observe(1.5), None); // new best
        assert_eq!(scheduler.observe(1.6), None); // first stall
        let reduced = scheduler.observe(1.7).unwrap(); // second stall, reduce
        assert!((reduced - 1e-4).abs() < 1e-12);
        assert!((scheduler.learning_rate() - 1e-4).abs() < 1e-12);

        // the stall counter reset with the reduction
        assert_eq!(scheduler.observe(1.8), None);
    }

    #[test]
    fn plateau_improvement_resets_the_stall_counter() {
        let mut scheduler = PlateauScheduler::new(1.0, 0.5, 1);
        scheduler.observe(2.0);
        scheduler.observe(2.1); // stall
        scheduler.observe(1.9); // improvement
        scheduler.observe(2.2); // stall again, counter restarted
        assert_eq!(scheduler.observe(2.3), Some(0.5));
    }

    #[test]
    fn flow_batches_reshape_to_two_channel_cubes() {
        let clips = Tensor::rand(&[3, 8, 16, 16], (Kind::Float, Device::Cpu));
        let input = to_model_input(&clips, Modality::Flow).unwrap();
        assert_eq!(input.size(), vec![3, 2, 4, 16, 16]);

        // plane 2j is channel-x of frame j
        let x_plane = clips.get(0).get(2);
        let mapped = input.get(0).get(0).get(1);
        assert!((&x_plane - &mapped)
            .abs()
            .sum(Kind::Float)
            .double_value(&[])
            .abs()
            < 1e-6);
    }

    #[test]
    fn spatial_batches_reshape_to_single_channel_cubes() {
        let clips = Tensor::rand(&[2, 5, 16, 16], (Kind::Float, Device::Cpu));
        let input = to_model_input(&clips, Modality::Spatial).unwrap();
        assert_eq!(input.size(), vec![2, 1, 5, 16, 16]);
    }

    #[test]
    fn collate_train_stacks_clips_and_labels() {
        let samples = vec![
            Sample::Train(Tensor::zeros(&[4, 8, 8], (Kind::Float, Device::Cpu)), 1),
            Sample::Train(Tensor::zeros(&[4, 8, 8], (Kind::Float, Device::Cpu)), 3),
        ];
        let (clips, labels) = collate_train(samples).unwrap();
        assert_eq!(clips.size(), vec![2, 4, 8, 8]);
        assert_eq!(Vec::<i64>::try_from(&labels).unwrap(), [1, 3]);
    }

    #[test]
    fn collate_rejects_mixed_modes() {
        let samples = vec![Sample::Val(
            "v".into(),
            Tensor::zeros(&[4, 8, 8], (Kind::Float, Device::Cpu)),
            0,
        )];
        assert!(collate_train(samples).is_err());
    }
}
