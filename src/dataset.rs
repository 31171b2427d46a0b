use crate::{
    common::*,
    error::DataError,
    index::{Manifest, VideoRecord},
    sampler::{sample_train_start, validation_offsets},
};
use crate::clip::ClipLoader;
use rayon::prelude::*;

/// Dataset access mode, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Val,
}

impl FromStr for Mode {
    type Err = DataError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "train" => Ok(Mode::Train),
            "val" | "validation" => Ok(Mode::Val),
            other => Err(DataError::InvalidMode {
                given: other.to_owned(),
                expected: "train, val",
            }),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Mode::Train => "train",
            Mode::Val => "val",
        };
        write!(f, "{}", text)
    }
}

/// How videos too short for the 19-segment validation scheme are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortVideoPolicy {
    /// Exclude the video from the validation set, with a warning.
    Skip,
    /// Abort dataset construction.
    Reject,
}

impl Default for ShortVideoPolicy {
    fn default() -> Self {
        Self::Skip
    }
}

/// One dataset sample. Validation samples carry the source video id so
/// clip predictions can be aggregated per video.
#[derive(Debug)]
pub enum Sample {
    Train(Tensor, i64),
    Val(String, Tensor, i64),
}

impl Sample {
    pub fn label(&self) -> i64 {
        match self {
            Sample::Train(_, label) | Sample::Val(_, _, label) => *label,
        }
    }

    pub fn clip(&self) -> &Tensor {
        match self {
            Sample::Train(clip, _) | Sample::Val(_, clip, _) => clip,
        }
    }
}

/// A materialized validation clip key: which video, which start offset.
#[derive(Debug, Clone)]
struct ValEntry {
    video_id: String,
    start: i64,
    class_label: i64,
}

#[derive(Debug)]
pub struct DatasetInit {
    pub manifest: Manifest,
    pub mode: Mode,
    pub loader: ClipLoader,
    pub short_videos: ShortVideoPolicy,
    pub seed: u64,
}

impl DatasetInit {
    pub fn build(self) -> Result<VideoDataset, DataError> {
        let Self {
            manifest,
            mode,
            loader,
            short_videos,
            seed,
        } = self;

        let records = manifest.into_sorted();

        let entries = match mode {
            Mode::Train => vec![],
            Mode::Val => {
                // The 19 offsets per video are fixed for the whole run, so
                // they are computed here once instead of per access.
                let clip_len = loader.clip_len();
                let offsets: Vec<_> = records
                    .par_iter()
                    .map(|record| validation_offsets(record, clip_len))
                    .collect();

                let mut entries = vec![];
                for (record, result) in records.iter().zip(offsets) {
                    match result {
                        Ok(starts) => entries.extend(starts.iter().map(|&start| ValEntry {
                            video_id: record.video_id.clone(),
                            start,
                            class_label: record.class_label,
                        })),
                        Err(err) => match short_videos {
                            ShortVideoPolicy::Skip => {
                                warn!("excluding video from validation: {}", err);
                            }
                            ShortVideoPolicy::Reject => return Err(err),
                        },
                    }
                }
                entries
            }
        };

        Ok(VideoDataset {
            mode,
            loader,
            records,
            entries,
            seed,
            draws: AtomicU64::new(0),
        })
    }
}

/// An indexable view over one split's clips.
///
/// Train mode indexes videos and re-samples a fresh random start on every
/// access; validation mode indexes precomputed (video, offset) pairs and is
/// idempotent. Access is `&self` throughout so loader workers can share one
/// instance.
#[derive(Debug)]
pub struct VideoDataset {
    mode: Mode,
    loader: ClipLoader,
    records: Vec<VideoRecord>,
    entries: Vec<ValEntry>,
    seed: u64,
    draws: AtomicU64,
}

impl VideoDataset {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        match self.mode {
            Mode::Train => self.records.len(),
            Mode::Val => self.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Sample, DataError> {
        match self.mode {
            Mode::Train => {
                let record = &self.records[index];
                // Each access draws from its own RNG stream derived from the
                // base seed, keeping sampling lock-free across workers.
                let draw = self.draws.fetch_add(1, Ordering::Relaxed);
                let mut rng =
                    StdRng::seed_from_u64(self.seed ^ draw.wrapping_mul(0x9e37_79b9_7f4a_7c15));
                let start = sample_train_start(&mut rng, record);
                let clip = self.loader.load(&record.video_id, start)?;
                Ok(Sample::Train(clip, record.class_label))
            }
            Mode::Val => {
                let entry = &self.entries[index];
                let clip = self.loader.load(&entry.video_id, entry.start)?;
                Ok(Sample::Val(entry.video_id.clone(), clip, entry.class_label))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clip::tests::write_frames, clip::Modality, index::DuplicatePolicy};
    use tempfile::TempDir;

    fn manifest_from(dir: &TempDir, lines: &str) -> Manifest {
        let path = dir.path().join("train_split1.txt");
        fs::write(&path, lines).unwrap();
        Manifest::load(&path, DuplicatePolicy::default()).unwrap()
    }

    #[test]
    fn mode_parses_only_train_and_val() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("val".parse::<Mode>().unwrap(), Mode::Val);
        assert_eq!("validation".parse::<Mode>().unwrap(), Mode::Val);
        assert!(matches!(
            "test".parse::<Mode>(),
            Err(DataError::InvalidMode { .. })
        ));
    }

    #[test]
    fn val_dataset_has_19_clips_per_video() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid001", Modality::Flow, 28, 100);
        let manifest = manifest_from(&dir, "vid001 28 3\n");

        let dataset = DatasetInit {
            manifest,
            mode: Mode::Val,
            loader: ClipLoader::new(dir.path(), Modality::Flow, 10, 16),
            short_videos: ShortVideoPolicy::default(),
            seed: 0,
        }
        .build()
        .unwrap();

        assert_eq!(dataset.len(), 19);
    }

    #[test]
    fn val_access_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid001", Modality::Flow, 28, 77);
        let manifest = manifest_from(&dir, "vid001 28 3\n");

        let dataset = DatasetInit {
            manifest,
            mode: Mode::Val,
            loader: ClipLoader::new(dir.path(), Modality::Flow, 10, 16),
            short_videos: ShortVideoPolicy::default(),
            seed: 0,
        }
        .build()
        .unwrap();

        let first = dataset.get(4).unwrap();
        let second = dataset.get(4).unwrap();
        match (&first, &second) {
            (Sample::Val(video_a, clip_a, label_a), Sample::Val(video_b, clip_b, label_b)) => {
                assert_eq!(video_a, video_b);
                assert_eq!(label_a, label_b);
                assert_eq!(
                    clip_a.sum(Kind::Float).double_value(&[]),
                    clip_b.sum(Kind::Float).double_value(&[])
                );
            }
            other => panic!("unexpected samples {:?}", other),
        }
    }

    #[test]
    fn short_videos_are_skipped_or_rejected() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "long", Modality::Flow, 28, 1);
        write_frames(dir.path(), "short", Modality::Flow, 12, 1);

        let build = |policy| {
            DatasetInit {
                manifest: manifest_from(&dir, "long 28 0\nshort 12 1\n"),
                mode: Mode::Val,
                loader: ClipLoader::new(dir.path(), Modality::Flow, 10, 16),
                short_videos: policy,
                seed: 0,
            }
            .build()
        };

        let skipped = build(ShortVideoPolicy::Skip).unwrap();
        assert_eq!(skipped.len(), 19);

        assert!(matches!(
            build(ShortVideoPolicy::Reject),
            Err(DataError::InsufficientLength { .. })
        ));
    }

    #[test]
    fn train_dataset_indexes_videos() {
        let dir = TempDir::new().unwrap();
        // enough trailing frames that any start in [1, 4] resolves
        write_frames(dir.path(), "vid001", Modality::Flow, 7, 10);
        let manifest = manifest_from(&dir, "vid001 4 2\n");

        let dataset = DatasetInit {
            manifest,
            mode: Mode::Train,
            loader: ClipLoader::new(dir.path(), Modality::Flow, 4, 16),
            short_videos: ShortVideoPolicy::default(),
            seed: 42,
        }
        .build()
        .unwrap();

        assert_eq!(dataset.len(), 1);
        match dataset.get(0).unwrap() {
            Sample::Train(clip, label) => {
                assert_eq!(clip.size(), vec![8, 16, 16]);
                assert_eq!(label, 2);
            }
            other => panic!("unexpected sample {:?}", other),
        }
    }

    #[test]
    fn missing_frame_fails_the_sample_only() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid001", Modality::Flow, 28, 1);
        fs::remove_file(dir.path().join("vid001").join("flow_y_00028.jpg")).unwrap();
        let manifest = manifest_from(&dir, "vid001 28 0\n");

        let dataset = DatasetInit {
            manifest,
            mode: Mode::Val,
            loader: ClipLoader::new(dir.path(), Modality::Flow, 10, 16),
            short_videos: ShortVideoPolicy::default(),
            seed: 0,
        }
        .build()
        .unwrap();

        // offsets are 1..=19; only the last clip reaches frame 28
        assert!(dataset.get(18).unwrap_err().is_per_sample());
        assert!(dataset.get(17).is_ok());
    }
}
