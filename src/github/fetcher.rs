// file: src/github/fetcher.rs
// description: bounded-concurrency retrieval of many remote files
// reference: futures buffer_unordered fan-out with per-request timeout

use crate::github::ContentSource;
use crate::models::{FetchFailure, FetchResult, RepoCoordinate};
use crate::sync::progress::ProgressTracker;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches many files through a [`ContentSource`] with at most
/// `max_concurrency` requests in flight.
///
/// Every input path yields exactly one [`FetchResult`]; the order of the
/// returned vector is unspecified. No retries happen here, the caller decides.
#[derive(Clone)]
pub struct ConcurrentFileFetcher {
    source: Arc<dyn ContentSource>,
    timeout: Duration,
}

impl ConcurrentFileFetcher {
    pub fn new(source: Arc<dyn ContentSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch_all(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        paths: &[String],
        max_concurrency: usize,
    ) -> Vec<FetchResult> {
        self.fetch_all_with_progress(repo, branch, paths, max_concurrency, None)
            .await
    }

    pub async fn fetch_all_with_progress(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        paths: &[String],
        max_concurrency: usize,
        progress: Option<&ProgressTracker>,
    ) -> Vec<FetchResult> {
        let limit = max_concurrency.max(1);
        let source = self.source.as_ref();
        let timeout = self.timeout;

        debug!(
            "Fetching {} files from {}@{} (concurrency {})",
            paths.len(),
            repo,
            branch,
            limit
        );

        stream::iter(paths.iter().cloned())
            .map(|path| async move {
                let result = match tokio::time::timeout(timeout, source.get_file(repo, &path, branch))
                    .await
                {
                    Ok(Ok(file)) => FetchResult::success(file),
                    Ok(Err(err)) => {
                        warn!("Failed to fetch {}: {}", path, err);
                        FetchResult::failure(path, FetchFailure::from(err))
                    }
                    Err(_) => {
                        warn!("Fetch of {} timed out after {:?}", path, timeout);
                        FetchResult::failure(path, FetchFailure::timeout(timeout.as_secs()))
                    }
                };

                if let Some(tracker) = progress {
                    match &result.outcome {
                        Ok(file) => tracker.inc_fetched(file.size),
                        Err(_) => tracker.inc_failed(),
                    }
                }
                result
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DocsKbError, ErrorKind, Result};
    use crate::models::FetchedFile;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Content source that records how many requests overlap.
    struct InstrumentedSource {
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
        missing: HashSet<String>,
        delay: Duration,
    }

    impl InstrumentedSource {
        fn new(missing: &[&str], delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                missing: missing.iter().map(|p| p.to_string()).collect(),
                delay,
            }
        }
    }

    #[async_trait]
    impl ContentSource for InstrumentedSource {
        async fn get_file(
            &self,
            _repo: &RepoCoordinate,
            path: &str,
            _branch: &str,
        ) -> Result<FetchedFile> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.missing.contains(path) {
                return Err(DocsKbError::NotFound(path.to_string()));
            }
            Ok(FetchedFile::new(path, format!("# {}", path), format!("sha-{}", path)))
        }
    }

    fn paths(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("docs/{}.md", i)).collect()
    }

    #[tokio::test]
    async fn test_bounded_concurrency_with_one_missing_file() {
        let source = Arc::new(InstrumentedSource::new(
            &["docs/3.md"],
            Duration::from_millis(20),
        ));
        let fetcher = ConcurrentFileFetcher::new(source.clone(), Duration::from_secs(5));
        let repo = RepoCoordinate::new("acme", "docs");

        let results = fetcher.fetch_all(&repo, "main", &paths(5), 2).await;

        assert_eq!(results.len(), 5);
        let not_found: Vec<_> = results
            .iter()
            .filter(|r| r.failure_kind() == Some(ErrorKind::NotFound))
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(not_found, vec!["docs/3.md"]);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 4);
        assert!(source.high_water.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_every_path_gets_a_result() {
        let source = Arc::new(InstrumentedSource::new(&[], Duration::from_millis(1)));
        let fetcher = ConcurrentFileFetcher::new(source, Duration::from_secs(5));
        let repo = RepoCoordinate::new("acme", "docs");
        let input = paths(12);

        let results = fetcher.fetch_all(&repo, "main", &input, 4).await;

        let mut seen: Vec<_> = results.iter().map(|r| r.path.clone()).collect();
        seen.sort();
        let mut expected = input.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_zero_concurrency_treated_as_one() {
        let source = Arc::new(InstrumentedSource::new(&[], Duration::from_millis(5)));
        let fetcher = ConcurrentFileFetcher::new(source.clone(), Duration::from_secs(5));
        let repo = RepoCoordinate::new("acme", "docs");

        let results = fetcher.fetch_all(&repo, "main", &paths(3), 0).await;

        assert_eq!(results.len(), 3);
        assert_eq!(source.high_water.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let source = Arc::new(InstrumentedSource::new(&[], Duration::from_millis(200)));
        let fetcher = ConcurrentFileFetcher::new(source, Duration::from_millis(10));
        let repo = RepoCoordinate::new("acme", "docs");

        let results = fetcher.fetch_all(&repo, "main", &paths(2), 2).await;

        assert_eq!(results.len(), 2);
        assert!(
            results
                .iter()
                .all(|r| r.failure_kind() == Some(ErrorKind::Transient))
        );
    }

    #[tokio::test]
    async fn test_progress_counts_outcomes() {
        let source = Arc::new(InstrumentedSource::new(&["docs/1.md"], Duration::ZERO));
        let fetcher = ConcurrentFileFetcher::new(source, Duration::from_secs(5));
        let repo = RepoCoordinate::new("acme", "docs");
        let tracker = ProgressTracker::hidden(3);

        fetcher
            .fetch_all_with_progress(&repo, "main", &paths(3), 3, Some(&tracker))
            .await;

        let stats = tracker.get_stats();
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(stats.files_failed, 1);
    }
}
