use crate::{
    clip::Modality,
    common::*,
    dataset::ShortVideoPolicy,
    index::DuplicatePolicy,
    params::{DEFAULT_FRAME_SIZE, DEFAULT_LEARNING_RATE, DEFAULT_MOMENTUM},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory holding one frame directory per video.
    pub data_dir: PathBuf,
    /// Directory holding the `train_split{N}.txt` / `test_split{N}.txt` pair.
    pub list_dir: PathBuf,
    pub split: u32,
    pub modality: Modality,
    /// Frames stacked per clip.
    pub in_channel: NonZeroUsize,
    #[serde(default = "default_frame_size")]
    pub frame_size: i64,
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default)]
    pub short_videos: ShortVideoPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: NonZeroUsize,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,
    pub epochs: i64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    pub num_classes: i64,
    #[serde(default)]
    pub seed: u64,
    #[serde(
        serialize_with = "serialize_device",
        deserialize_with = "deserialize_device",
        default = "default_device"
    )]
    pub device: Device,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
}

fn default_frame_size() -> i64 {
    DEFAULT_FRAME_SIZE
}

fn default_num_workers() -> usize {
    num_cpus::get()
}

fn default_prefetch() -> usize {
    2
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

fn default_momentum() -> f64 {
    DEFAULT_MOMENTUM
}

fn default_device() -> Device {
    Device::cuda_if_available()
}

fn serialize_device<S>(device: &Device, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let text = match device {
        Device::Cpu => "cpu".to_owned(),
        Device::Cuda(n) => format!("cuda({})", n),
        other => return Err(S::Error::custom(format!("unsupported device {:?}", other))),
    };
    text.serialize(serializer)
}

fn deserialize_device<'de, D>(deserializer: D) -> Result<Device, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    let device = match name.as_str() {
        "cpu" => Device::Cpu,
        _ => {
            let prefix = "cuda(";
            let suffix = ")";
            if name.starts_with(prefix) && name.ends_with(suffix) {
                let number: usize = name[prefix.len()..name.len() - suffix.len()]
                    .parse()
                    .map_err(|_err| D::Error::custom(format!("invalid device name {}", name)))?;
                Device::Cuda(number)
            } else {
                return Err(D::Error::custom(format!("invalid device name {}", name)));
            }
        }
    };
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        dataset: {
            data_dir: "/data/frames",
            list_dir: "/data/lists",
            split: 1,
            modality: "flow",
            in_channel: 10,
        },
        training: {
            batch_size: 16,
            epochs: 100,
            num_classes: 51,
            device: "cpu",
        },
        logging: {
            enabled: false,
            log_dir: "logs",
            checkpoint_dir: "checkpoints",
        },
    }"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = json5::from_str(MINIMAL).unwrap();
        assert_eq!(config.dataset.modality, Modality::Flow);
        assert_eq!(config.dataset.in_channel.get(), 10);
        assert_eq!(config.dataset.frame_size, DEFAULT_FRAME_SIZE);
        assert_eq!(config.dataset.duplicates, DuplicatePolicy::Overwrite);
        assert_eq!(config.dataset.short_videos, ShortVideoPolicy::Skip);
        assert_eq!(config.training.device, Device::Cpu);
        assert_eq!(config.training.prefetch, 2);
        assert!((config.training.learning_rate - DEFAULT_LEARNING_RATE).abs() < 1e-12);
    }

    #[test]
    fn parses_cuda_device_names() {
        let replaced = MINIMAL.replace(r#""cpu""#, r#""cuda(1)""#);
        let config: Config = json5::from_str(&replaced).unwrap();
        assert_eq!(config.training.device, Device::Cuda(1));

        let broken = MINIMAL.replace(r#""cpu""#, r#""gpu0""#);
        assert!(json5::from_str::<Config>(&broken).is_err());
    }

    #[test]
    fn rejects_unknown_modality() {
        let broken = MINIMAL.replace(r#""flow""#, r#""rgbd""#);
        let err = json5::from_str::<Config>(&broken).unwrap_err();
        assert!(err.to_string().contains("invalid mode"));
    }

    #[test]
    fn device_round_trips() {
        let config: Config = json5::from_str(MINIMAL).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""device":"cpu""#));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.training.device, Device::Cpu);
    }
}
