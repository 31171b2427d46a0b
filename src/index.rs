use crate::{common::*, error::DataError};

/// One manifest entry: a video directory name, its frame count and its
/// action class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub frame_count: i64,
    pub class_label: i64,
}

impl VideoRecord {
    /// Parses a `<video_id> <frame_count> <class_label>` manifest line.
    pub fn parse_line(path: &Path, line_no: usize, line: &str) -> Result<Self, DataError> {
        let bad = |message: String| DataError::Parse {
            path: path.to_path_buf(),
            line_no,
            message,
        };

        let mut fields = line.split_whitespace();
        let video_id = fields
            .next()
            .ok_or_else(|| bad("empty line".into()))?
            .to_owned();
        let frame_count = fields
            .next()
            .ok_or_else(|| bad("missing frame count".into()))?
            .parse::<i64>()
            .map_err(|err| bad(format!("bad frame count: {}", err)))?;
        let class_label = fields
            .next()
            .ok_or_else(|| bad("missing class label".into()))?
            .parse::<i64>()
            .map_err(|err| bad(format!("bad class label: {}", err)))?;

        Ok(Self {
            video_id,
            frame_count,
            class_label,
        })
    }

    /// Re-serializes the record as a manifest line, without the newline.
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.video_id, self.frame_count, self.class_label)
    }
}

/// How duplicate video ids in one manifest file are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Last entry wins, a warning is logged.
    Overwrite,
    /// A duplicate id is a parse error.
    Reject,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::Overwrite
    }
}

/// The per-split mapping from video id to [`VideoRecord`], loaded once per
/// run and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Manifest {
    records: HashMap<String, VideoRecord>,
}

impl Manifest {
    pub fn load<P>(path: P, duplicates: DuplicatePolicy) -> Result<Self, DataError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| DataError::Parse {
            path: path.to_path_buf(),
            line_no: 0,
            message: err.to_string(),
        })?;

        let mut records = HashMap::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = index + 1;
            let record = VideoRecord::parse_line(path, line_no, line)?;
            if let Some(prev) = records.insert(record.video_id.clone(), record) {
                match duplicates {
                    DuplicatePolicy::Overwrite => {
                        warn!(
                            "duplicate manifest entry for {} in {}, keeping the later one",
                            prev.video_id,
                            path.display()
                        );
                    }
                    DuplicatePolicy::Reject => {
                        return Err(DataError::Parse {
                            path: path.to_path_buf(),
                            line_no,
                            message: format!("duplicate video id {}", prev.video_id),
                        });
                    }
                }
            }
        }

        Ok(Self { records })
    }

    /// Loads the `train_split{N}.txt` / `test_split{N}.txt` pair for a split.
    pub fn load_split_pair<P>(
        list_dir: P,
        split: u32,
        duplicates: DuplicatePolicy,
    ) -> Result<(Self, Self), DataError>
    where
        P: AsRef<Path>,
    {
        let list_dir = list_dir.as_ref();
        let train = Self::load(
            list_dir.join(format!("train_split{}.txt", split)),
            duplicates,
        )?;
        let test = Self::load(list_dir.join(format!("test_split{}.txt", split)), duplicates)?;
        Ok((train, test))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, video_id: &str) -> Option<&VideoRecord> {
        self.records.get(video_id)
    }

    /// Consumes the manifest into records sorted by video id, so dataset
    /// indices are stable across runs.
    pub fn into_sorted(self) -> Vec<VideoRecord> {
        self.records
            .into_values()
            .sorted_by(|a, b| a.video_id.cmp(&b.video_id))
            .collect()
    }
}
