use crate::common::*;

/// Per-epoch scalars emitted for external plotting. Never read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: i64,
    pub train_acc: f64,
    pub train_loss: f64,
    pub val_acc: f64,
    pub val_loss: f64,
    pub learning_rate: f64,
}

/// Appends one JSON line per epoch to `<log_dir>/metrics.jsonl`.
///
/// The sink is fire-and-forget: a failed write is logged and the run
/// continues.
#[derive(Debug)]
pub struct MetricsWriter {
    path: Option<PathBuf>,
}

impl MetricsWriter {
    pub fn new<P>(log_dir: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            path: Some(log_dir.as_ref().join("metrics.jsonl")),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn append(&self, record: &EpochMetrics) {
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };
        if let Err(err) = self.try_append(path, record) {
            warn!("failed to record metrics: {}", err);
        }
    }

    fn try_append(&self, path: &Path, record: &EpochMetrics) -> Result<()> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(epoch: i64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_acc: 0.5,
            train_loss: 1.25,
            val_acc: 0.25,
            val_loss: 2.5,
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn record_round_trips_through_json() {
        let original = record(3);
        let json = serde_json::to_string(&original).unwrap();
        let back: EpochMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn appends_one_line_per_epoch() {
        let dir = TempDir::new().unwrap();
        let writer = MetricsWriter::new(dir.path());
        writer.append(&record(0));
        writer.append(&record(1));

        let text = fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
        let epochs: Vec<i64> = text
            .lines()
            .map(|line| serde_json::from_str::<EpochMetrics>(line).unwrap().epoch)
            .collect();
        assert_eq!(epochs, [0, 1]);
    }

    #[test]
    fn disabled_writer_is_a_no_op() {
        MetricsWriter::disabled().append(&record(0));
    }
}
