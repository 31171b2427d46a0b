use c3drs::{
    clip::ClipLoader,
    common::*,
    config::Config,
    dataset::{DatasetInit, Mode},
    index::Manifest,
    loader::LoaderInit,
    metrics::MetricsWriter,
    train::TrainLoopInit,
};

lazy_static::lazy_static! {
    static ref SHUTDOWN_FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// C3D action recognition trainer.
#[derive(FromArgs)]
struct Args {
    /// the config file.
    #[argh(option, default = "PathBuf::from(\"config.json5\")")]
    config: PathBuf,
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    // Set signal handler
    ctrlc::set_handler(|| {
        warn!("Interrupted by user");
        SHUTDOWN_FLAG.store(true, Ordering::SeqCst);
    })?;

    // Parse arguments
    let args: Args = argh::from_env();

    // load config
    let config = Config::open(&args.config)?;

    // init log and checkpoint dirs
    if config.logging.enabled {
        fs::create_dir_all(&config.logging.log_dir)?;
        fs::create_dir_all(&config.logging.checkpoint_dir)?;
    }

    // Load the split manifests
    info!("Loading video manifests");
    let (train_manifest, test_manifest) = Manifest::load_split_pair(
        &config.dataset.list_dir,
        config.dataset.split,
        config.dataset.duplicates,
    )?;
    ensure!(!train_manifest.is_empty(), "training manifest is empty");
    ensure!(!test_manifest.is_empty(), "test manifest is empty");

    let clip_loader = ClipLoader::new(
        &config.dataset.data_dir,
        config.dataset.modality,
        config.dataset.in_channel.get() as i64,
        config.dataset.frame_size,
    );

    // Build dataset views
    let train_set = DatasetInit {
        manifest: train_manifest,
        mode: Mode::Train,
        loader: clip_loader.clone(),
        short_videos: config.dataset.short_videos,
        seed: config.training.seed,
    }
    .build()?;
    info!("==> Training data: {} videos", train_set.len());

    let val_set = DatasetInit {
        manifest: test_manifest,
        mode: Mode::Val,
        loader: clip_loader,
        short_videos: config.dataset.short_videos,
        seed: config.training.seed,
    }
    .build()?;
    info!("==> Validation data: {} clips", val_set.len());

    // Build prefetching loaders
    let train_loader = LoaderInit {
        dataset: Arc::new(train_set),
        batch_size: config.training.batch_size.get(),
        num_workers: config.training.num_workers,
        prefetch: config.training.prefetch,
        seed: config.training.seed,
    }
    .build();

    let val_loader = LoaderInit {
        dataset: Arc::new(val_set),
        batch_size: config.training.batch_size.get(),
        num_workers: config.training.num_workers,
        prefetch: config.training.prefetch,
        seed: config.training.seed,
    }
    .build();

    let metrics = if config.logging.enabled {
        MetricsWriter::new(&config.logging.log_dir)
    } else {
        MetricsWriter::disabled()
    };
    let checkpoint_dir = config
        .logging
        .enabled
        .then(|| config.logging.checkpoint_dir.clone());

    info!("Training on {:?}", config.training.device);
    let mut train_loop = TrainLoopInit {
        train_loader,
        val_loader,
        modality: config.dataset.modality,
        num_classes: config.training.num_classes,
        epochs: config.training.epochs,
        learning_rate: config.training.learning_rate,
        momentum: config.training.momentum,
        device: config.training.device,
        checkpoint_dir,
        metrics,
        shutdown: SHUTDOWN_FLAG.clone(),
    }
    .build()?;

    train_loop.run()
}
