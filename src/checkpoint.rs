use crate::{aggregate::VideoPrediction, common::*};

/// Persists a new best epoch: model weights tagged with the epoch number
/// plus the video-level prediction map for later analysis.
pub fn save_best(
    vs: &VarStore,
    epoch: i64,
    predictions: &HashMap<String, VideoPrediction>,
    dir: &Path,
) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;

    let weights_path = dir.join(format!("c3d_best_epoch{}.ot", epoch));
    vs.save(&weights_path)
        .with_context(|| format!("failed to save weights to {}", weights_path.display()))?;

    let preds_path = dir.join(format!("video_preds_epoch{}.json", epoch));
    let file = BufWriter::new(
        File::create(&preds_path)
            .with_context(|| format!("failed to create {}", preds_path.display()))?,
    );
    serde_json::to_writer_pretty(file, predictions)?;

    info!(
        "saved best checkpoint {} with {} video predictions",
        weights_path.display(),
        predictions.len()
    );
    Ok(())
}
