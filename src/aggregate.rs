use crate::common::*;

/// A finalized per-video prediction, persisted alongside best checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPrediction {
    pub class_label: i64,
    pub predicted: i64,
    pub scores: Vec<f32>,
}

/// What a validation pass reduces to.
#[derive(Debug)]
pub struct VideoLevelResult {
    pub accuracy: f64,
    pub mean_loss: f64,
    pub predictions: HashMap<String, VideoPrediction>,
}

#[derive(Debug)]
struct VideoScores {
    class_label: i64,
    scores: Vec<f32>,
}

/// Accumulates per-clip class scores keyed by video id.
///
/// The first `accumulate` for a video stores its score vector and captures
/// the true label; later calls add elementwise. Scores are summed, not
/// averaged, and the finalized loss is computed on the summed vector, which
/// matches the evaluation semantics exactly. The map lives for one
/// validation epoch and is consumed by `finalize`.
///
/// Accumulation takes `&self` behind a mutex so loader workers may stream
/// results in concurrently without losing updates.
#[derive(Debug)]
pub struct Aggregator {
    classes: usize,
    videos: Mutex<HashMap<String, VideoScores>>,
}

impl Aggregator {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            videos: Mutex::new(HashMap::new()),
        }
    }

    pub fn accumulate(&self, video_id: &str, class_label: i64, scores: &[f32]) {
        assert_eq!(scores.len(), self.classes, "clip score vector length");

        let mut videos = self.videos.lock().expect("aggregator mutex poisoned");
        match videos.get_mut(video_id) {
            Some(entry) => {
                debug_assert_eq!(entry.class_label, class_label);
                for (sum, score) in entry.scores.iter_mut().zip(scores) {
                    *sum += score;
                }
            }
            None => {
                videos.insert(
                    video_id.to_owned(),
                    VideoScores {
                        class_label,
                        scores: scores.to_vec(),
                    },
                );
            }
        }
    }

    /// Number of videos seen so far.
    pub fn len(&self) -> usize {
        self.videos.lock().expect("aggregator mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reduces every accumulated vector to a video-level prediction and the
    /// (accuracy, mean loss) pair over all videos.
    pub fn finalize(self) -> VideoLevelResult {
        let videos = self
            .videos
            .into_inner()
            .expect("aggregator mutex poisoned");

        let mut correct = 0usize;
        let mut loss_sum = 0.0;
        let count = videos.len();

        let predictions: HashMap<_, _> = videos
            .into_iter()
            .map(|(video_id, entry)| {
                let predicted = argmax_first(&entry.scores) as i64;
                if predicted == entry.class_label {
                    correct += 1;
                }
                loss_sum += cross_entropy(&entry.scores, entry.class_label);
                let prediction = VideoPrediction {
                    class_label: entry.class_label,
                    predicted,
                    scores: entry.scores,
                };
                (video_id, prediction)
            })
            .collect();

        if count == 0 {
            return VideoLevelResult {
                accuracy: 0.0,
                mean_loss: 0.0,
                predictions,
            };
        }

        VideoLevelResult {
            accuracy: correct as f64 / count as f64,
            mean_loss: loss_sum / count as f64,
            predictions,
        }
    }
}

/// Index of the largest value; ties resolve to the first index.
fn argmax_first(scores: &[f32]) -> usize {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }
    best
}

/// Cross-entropy of an unnormalized score vector against the true label,
/// computed with the usual max-shift for stability.
fn cross_entropy(scores: &[f32], class_label: i64) -> f64 {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, |acc, s| acc.max(s as f64));
    let log_sum_exp: f64 = max
        + scores
            .iter()
            .map(|&s| (s as f64 - max).exp())
            .sum::<f64>()
            .ln();
    log_sum_exp - scores[class_label as usize] as f64
}
