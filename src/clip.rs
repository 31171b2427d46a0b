use crate::{common::*, error::DataError, params::FRAME_INDEX_WIDTH};

/// Input modality of the stream being trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Modality {
    /// Optical flow: interleaved x/y planes, two per frame.
    Flow,
    /// Spatial cube: one indexed image plane per frame.
    Spatial,
}

impl Modality {
    /// Number of planes a clip of `in_channel` frames stacks to.
    pub fn planes(&self, in_channel: i64) -> i64 {
        match self {
            Modality::Flow => 2 * in_channel,
            Modality::Spatial => in_channel,
        }
    }

    /// Channel count of the 5-d model input this modality reshapes to.
    pub fn model_channels(&self) -> i64 {
        match self {
            Modality::Flow => 2,
            Modality::Spatial => 1,
        }
    }
}

impl FromStr for Modality {
    type Err = DataError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "flow" => Ok(Modality::Flow),
            "spatial" => Ok(Modality::Spatial),
            other => Err(DataError::InvalidMode {
                given: other.to_owned(),
                expected: "flow, spatial",
            }),
        }
    }
}

impl TryFrom<String> for Modality {
    type Error = DataError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Modality> for String {
    fn from(modality: Modality) -> Self {
        modality.to_string()
    }
}

impl Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Modality::Flow => "flow",
            Modality::Spatial => "spatial",
        };
        write!(f, "{}", text)
    }
}

/// Loads one clip's frame files into a fixed-shape tensor.
///
/// Frame files live under `<data_dir>/<video_id>/` and are named with a
/// 1-indexed, 5-digit zero-padded frame number: `flow_x_%05d.jpg` and
/// `flow_y_%05d.jpg` for flow, `image_%05d.jpg` for spatial cubes.
#[derive(Debug, Clone)]
pub struct ClipLoader {
    data_dir: PathBuf,
    modality: Modality,
    in_channel: i64,
    frame_size: i64,
}

impl ClipLoader {
    pub fn new<P>(data_dir: P, modality: Modality, in_channel: i64, frame_size: i64) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            data_dir: data_dir.into(),
            modality,
            in_channel,
            frame_size,
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Frames consumed per clip.
    pub fn clip_len(&self) -> i64 {
        self.in_channel
    }

    /// Planes in the stacked clip tensor.
    pub fn planes(&self) -> i64 {
        self.modality.planes(self.in_channel)
    }

    /// Reads, resizes and stacks the clip starting at `start` into a
    /// `[planes, frame_size, frame_size]` f32 tensor scaled to `[0, 1]`.
    /// Every source file is opened and closed within this call.
    pub fn load(&self, video_id: &str, start: i64) -> Result<Tensor, DataError> {
        let video_dir = self.data_dir.join(video_id);
        let size = self.frame_size;
        let mut planes = Vec::with_capacity((self.planes() * size * size) as usize);

        for j in 0..self.in_channel {
            let frame_idx = start + j;
            match self.modality {
                Modality::Flow => {
                    self.read_plane(self.frame_path(&video_dir, "flow_x_", frame_idx), &mut planes)?;
                    self.read_plane(self.frame_path(&video_dir, "flow_y_", frame_idx), &mut planes)?;
                }
                Modality::Spatial => {
                    self.read_plane(self.frame_path(&video_dir, "image_", frame_idx), &mut planes)?;
                }
            }
        }

        Ok(Tensor::from_slice(&planes).view([self.planes(), size, size]))
    }

    fn frame_path(&self, video_dir: &Path, prefix: &str, frame_idx: i64) -> PathBuf {
        video_dir.join(format!(
            "{}{:0width$}.jpg",
            prefix,
            frame_idx,
            width = FRAME_INDEX_WIDTH
        ))
    }

    fn read_plane(&self, path: PathBuf, planes: &mut Vec<f32>) -> Result<(), DataError> {
        let missing = |err: &dyn Display, path: &Path| {
            debug!("failed to read frame {}: {}", path.display(), err);
            DataError::MissingFrame {
                path: path.to_path_buf(),
            }
        };

        let image = ImageReader::open(&path)
            .map_err(|err| missing(&err, &path))?
            .decode()
            .map_err(|err| missing(&err, &path))?;

        let size = self.frame_size as u32;
        let resized = image.resize_exact(size, size, FilterType::Triangle).into_luma8();
        planes.extend(resized.into_raw().into_iter().map(|p| p as f32 / 255.0));
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tempfile::TempDir;

    pub fn write_frames(dir: &Path, video_id: &str, modality: Modality, frames: i64, value: u8) {
        let video_dir = dir.join(video_id);
        fs::create_dir_all(&video_dir).unwrap();
        let image = image::GrayImage::from_pixel(8, 8, image::Luma([value]));
        for idx in 1..=frames {
            match modality {
                Modality::Flow => {
                    image
                        .save(video_dir.join(format!("flow_x_{:05}.jpg", idx)))
                        .unwrap();
                    image
                        .save(video_dir.join(format!("flow_y_{:05}.jpg", idx)))
                        .unwrap();
                }
                Modality::Spatial => {
                    image
                        .save(video_dir.join(format!("image_{:05}.jpg", idx)))
                        .unwrap();
                }
            }
        }
    }

    #[test]
    fn parses_modality_strings() {
        assert_eq!("flow".parse::<Modality>().unwrap(), Modality::Flow);
        assert_eq!("spatial".parse::<Modality>().unwrap(), Modality::Spatial);
        assert!(matches!(
            "rgb".parse::<Modality>(),
            Err(DataError::InvalidMode { .. })
        ));
    }

    #[test]
    fn loads_flow_clip_with_fixed_shape() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid001", Modality::Flow, 5, 255);

        let loader = ClipLoader::new(dir.path(), Modality::Flow, 3, 16);
        let clip = loader.load("vid001", 2).unwrap();
        assert_eq!(clip.size(), vec![6, 16, 16]);

        // a constant-white source stays near one after jpeg round-trip
        let full = (6 * 16 * 16) as f64;
        let total = clip.sum(Kind::Float).double_value(&[]);
        assert!(total > 0.97 * full && total <= full + 1.0);
    }

    #[test]
    fn loads_spatial_clip_with_fixed_shape() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid002", Modality::Spatial, 4, 0);

        let loader = ClipLoader::new(dir.path(), Modality::Spatial, 4, 16);
        let clip = loader.load("vid002", 1).unwrap();
        assert_eq!(clip.size(), vec![4, 16, 16]);
        let total = clip.sum(Kind::Float).double_value(&[]);
        assert!(total < 0.03 * (4 * 16 * 16) as f64);
    }

    #[test]
    fn missing_frame_aborts_the_sample() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), "vid003", Modality::Flow, 4, 128);
        fs::remove_file(dir.path().join("vid003").join("flow_x_00003.jpg")).unwrap();

        let loader = ClipLoader::new(dir.path(), Modality::Flow, 3, 16);
        let err = loader.load("vid003", 1).unwrap_err();
        assert!(err.is_per_sample());
        match err {
            DataError::MissingFrame { path } => {
                assert!(path.ends_with("vid003/flow_x_00003.jpg"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        // a clip that stops before the gap still loads
        let short = ClipLoader::new(dir.path(), Modality::Flow, 2, 16);
        assert!(short.load("vid003", 1).is_ok());
    }
}
