use std::time::{Duration, Instant};

/// Progress of a bulk load, logged at most once per `interval`.
pub struct BulkLoadProgress {
    files_total: usize,
    files_processed: usize,
    interval: Duration,
    started_at: Instant,
    last_report: Instant,
}

pub struct ProgressSnapshot {
    pub files_total: usize,
    pub files_processed: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
    pub eta_ms: Option<u64>,
}

impl BulkLoadProgress {
    pub fn new(files_total: usize, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            files_total,
            files_processed: 0,
            interval,
            started_at: now,
            last_report: now,
        }
    }

    /// Counts one finished file. Returns `true` if a progress line was logged.
    pub fn inc(&mut self) -> bool {
        self.files_processed += 1;
        if self.last_report.elapsed() <= self.interval {
            return false;
        }
        self.last_report = Instant::now();
        let snapshot = self.snapshot();
        tracing::info!(
            "Processed {}/{} files ({:.1}%){}",
            snapshot.files_processed,
            snapshot.files_total,
            snapshot.progress_pct,
            snapshot.eta_ms.map(format_eta).unwrap_or_default()
        );
        true
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;

        let progress_pct = if self.files_total > 0 {
            (self.files_processed as f64 / self.files_total as f64) * 100.0
        } else {
            0.0
        };

        let eta_ms = if self.files_processed > 0 && self.files_processed < self.files_total {
            let remaining = self.files_total - self.files_processed;
            let ms_per_file = elapsed_ms as f64 / self.files_processed as f64;
            Some((remaining as f64 * ms_per_file) as u64)
        } else {
            None
        };

        ProgressSnapshot {
            files_total: self.files_total,
            files_processed: self.files_processed,
            elapsed_ms,
            progress_pct,
            eta_ms,
        }
    }
}

fn format_eta(eta_ms: u64) -> String {
    format!(", about {}s left", eta_ms.div_ceil(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_percentage() {
        let mut progress = BulkLoadProgress::new(4, Duration::from_secs(3600));
        assert!(!progress.inc());
        progress.inc();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.files_processed, 2);
        assert_eq!(snapshot.files_total, 4);
        assert!((snapshot.progress_pct - 50.0).abs() < f64::EPSILON);
        assert!(snapshot.eta_ms.is_some());
    }

    #[test]
    fn test_reports_after_interval() {
        let mut progress = BulkLoadProgress::new(10, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(progress.inc());
    }

    #[test]
    fn test_format_eta_rounds_up() {
        assert_eq!(format_eta(0), ", about 0s left");
        assert_eq!(format_eta(1), ", about 1s left");
        assert_eq!(format_eta(61_000), ", about 61s left");
    }

    #[test]
    fn test_empty_total() {
        let progress = BulkLoadProgress::new(0, Duration::from_secs(2));
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.progress_pct, 0.0);
        assert!(snapshot.eta_ms.is_none());
    }
}
