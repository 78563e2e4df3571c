// file: src/sync/progress.rs
// description: progress tracking and fetch statistics for sync runs
// reference: uses indicatif for progress bars and tracks fetch metrics

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct FetchStats {
    pub files_fetched: usize,
    pub files_failed: usize,
    pub bytes_fetched: u64,
    pub duration_secs: u64,
}

impl FetchStats {
    pub fn files_per_second(&self) -> f64 {
        if self.duration_secs == 0 {
            return 0.0;
        }
        self.files_fetched as f64 / self.duration_secs as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.files_fetched + self.files_failed;
        if total == 0 {
            return 0.0;
        }
        (self.files_fetched as f64 / total as f64) * 100.0
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    files_fetched: Arc<AtomicUsize>,
    files_failed: Arc<AtomicUsize>,
    bytes_fetched: Arc<AtomicU64>,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_files: usize) -> Self {
        Self::with_color(total_files, true)
    }

    pub fn with_color(total_files: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();
        Self::build(&multi_progress, total_files, colored)
    }

    /// Tracker that counts but never draws; used when progress output is off.
    pub fn hidden(total_files: usize) -> Self {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::build(&multi_progress, total_files, false)
    }

    fn build(multi_progress: &MultiProgress, total_files: usize, colored: bool) -> Self {
        let main_bar = create_progress_bar(multi_progress, total_files as u64, colored);
        let detail_bar = create_detail_bar(multi_progress);

        Self {
            main_bar,
            detail_bar,
            files_fetched: Arc::new(AtomicUsize::new(0)),
            files_failed: Arc::new(AtomicUsize::new(0)),
            bytes_fetched: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_fetched(&self, bytes: u64) {
        self.files_fetched.fetch_add(1, Ordering::SeqCst);
        self.bytes_fetched.fetch_add(bytes, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn inc_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    /// Takes back `count` failures that are about to be fetched again, so a
    /// path that succeeds on retry is not counted as failed.
    pub fn retrying(&self, count: usize) {
        let _ = self
            .files_failed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |failed| {
                Some(failed.saturating_sub(count))
            });
        self.main_bar.dec(count as u64);
        self.update_detail_bar();
    }

    pub fn set_message(&self, message: String) {
        self.main_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Fetch complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn get_stats(&self) -> FetchStats {
        FetchStats {
            files_fetched: self.files_fetched.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            bytes_fetched: self.bytes_fetched.load(Ordering::SeqCst),
            duration_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn update_detail_bar(&self) {
        let fetched = self.files_fetched.load(Ordering::SeqCst);
        let failed = self.files_failed.load(Ordering::SeqCst);
        self.detail_bar
            .set_message(format!("Fetched: {} | Failed: {}", fetched, failed));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}"
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .expect("Failed to create progress bar template")
            .progress_chars(if colored { "█▓▒░" } else { "=>-" }),
    );
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg}")
            .expect("Failed to create detail bar template"),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_stats_rates() {
        let stats = FetchStats {
            files_fetched: 90,
            files_failed: 10,
            bytes_fetched: 4096,
            duration_secs: 10,
        };
        assert_eq!(stats.files_per_second(), 9.0);
        assert!((stats.success_rate() - 90.0).abs() < f64::EPSILON);
        assert_eq!(FetchStats::default().success_rate(), 0.0);
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = ProgressTracker::hidden(3);
        tracker.inc_fetched(100);
        tracker.inc_fetched(24);
        tracker.inc_failed();

        let stats = tracker.get_stats();
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.bytes_fetched, 124);
    }

    #[test]
    fn test_retry_success_is_not_counted_as_failure() {
        let tracker = ProgressTracker::hidden(2);
        tracker.inc_fetched(10);
        tracker.inc_failed();

        tracker.retrying(1);
        tracker.inc_fetched(5);

        let stats = tracker.get_stats();
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(stats.files_failed, 0);
        assert_eq!(tracker.main_bar.position(), 2);
    }
}
