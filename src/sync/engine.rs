// file: src/sync/engine.rs
// description: incremental synchronization of a repository into its knowledge base
// reference: list, plan, fetch, apply, persist

use crate::config::SyncConfig;
use crate::error::{DocsKbError, Result};
use crate::github::{ConcurrentFileFetcher, ContentSource, InclusionPolicy, RemoteLister};
use crate::knowledge::KnowledgeBase;
use crate::models::{
    Document, FetchFailure, FetchResult, FetchedFile, FileRecord, IdentityMap, RepoCoordinate,
    Snapshot, SyncReport, TrackedRepository,
};
use crate::parser::MarkdownParser;
use crate::store::{RepositoryStore, SnapshotStore};
use crate::sync::lock::{SyncGuard, SyncLocks};
use crate::sync::planner::{self, SyncDiff};
use crate::sync::progress::ProgressTracker;
use crate::utils::{OperationTimer, Validator};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const SLOW_FETCH_PHASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Plan only: report what would change without fetching or writing.
    pub dry_run: bool,
    /// Overrides `sync.max_concurrency` for this run.
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    FirstIngest,
    Refresh,
    Incremental,
}

/// Paths of one fetch phase, split by outcome.
#[derive(Debug, Default)]
struct FetchPhase {
    fetched: Vec<FetchedFile>,
    failed: BTreeMap<String, FetchFailure>,
    cancelled: Vec<String>,
}

/// Outcome of one repository within [`SyncEngine::sync_all`].
#[derive(Debug)]
pub struct RepositoryOutcome {
    pub repository: TrackedRepository,
    pub result: Result<SyncReport>,
}

pub struct SyncEngine {
    lister: Arc<dyn RemoteLister>,
    fetcher: ConcurrentFileFetcher,
    knowledge: Arc<dyn KnowledgeBase>,
    snapshots: Arc<dyn SnapshotStore>,
    repositories: Arc<dyn RepositoryStore>,
    locks: SyncLocks,
    settings: SyncConfig,
    policy: InclusionPolicy,
    parser: MarkdownParser,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl SyncEngine {
    pub fn new(
        lister: Arc<dyn RemoteLister>,
        source: Arc<dyn ContentSource>,
        knowledge: Arc<dyn KnowledgeBase>,
        snapshots: Arc<dyn SnapshotStore>,
        repositories: Arc<dyn RepositoryStore>,
        locks: SyncLocks,
        settings: SyncConfig,
    ) -> Self {
        Self {
            lister,
            fetcher: ConcurrentFileFetcher::new(source, settings.fetch_timeout()),
            knowledge,
            snapshots,
            repositories,
            locks,
            policy: InclusionPolicy::from_config(&settings),
            settings,
            parser: MarkdownParser::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Shared flag; setting it stops the current sync at the next batch boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Starts tracking `repo@branch` and indexes every matching file.
    ///
    /// An already tracked repository is re-fetched in full; files gone
    /// upstream are still removed.
    pub async fn ingest(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        Validator::validate_branch(branch)?;
        let id = repo.knowledge_base_id(branch);
        let guard = self.locks.try_acquire(&id)?;

        match self.repositories.get(&id).await? {
            Some(mut tracked) => {
                info!("{} is already tracked, refreshing every file", tracked.label());
                let previous = self.snapshots.load(&id).await?;
                self.execute(&guard, &mut tracked, repo, previous, options, Mode::Refresh)
                    .await
            }
            None => {
                let mut tracked = TrackedRepository::new(repo, branch);
                info!("Ingesting {} as {}", tracked.label(), tracked.id);
                self.execute(
                    &guard,
                    &mut tracked,
                    repo,
                    Snapshot::new(),
                    options,
                    Mode::FirstIngest,
                )
                .await
            }
        }
    }

    pub async fn sync(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let id = repo.knowledge_base_id(branch);
        let guard = self.locks.try_acquire(&id)?;

        let mut tracked = self.tracked(repo, branch).await?;
        let previous = self.snapshots.load(&id).await?;
        self.execute(&guard, &mut tracked, repo, previous, options, Mode::Incremental)
            .await
    }

    /// Syncs every tracked repository in turn; one failure does not stop the rest.
    pub async fn sync_all(&self, options: SyncOptions) -> Result<Vec<RepositoryOutcome>> {
        let repositories = self.repositories.list().await?;
        info!("Syncing {} tracked repositories", repositories.len());

        let mut outcomes = Vec::with_capacity(repositories.len());
        for repository in repositories {
            if self.is_cancelled() {
                warn!("Cancelled before syncing {}", repository.label());
                break;
            }

            let result = match repository.coordinate() {
                Ok(coordinate) => self.sync(&coordinate, &repository.branch, options).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!("Sync of {} failed: {}", repository.label(), e);
            }
            outcomes.push(RepositoryOutcome { repository, result });
        }
        Ok(outcomes)
    }

    /// Stops tracking `repo@branch`: drops its knowledge base, snapshot and record.
    pub async fn delete(&self, repo: &RepoCoordinate, branch: &str) -> Result<TrackedRepository> {
        let id = repo.knowledge_base_id(branch);
        let _guard = self.locks.try_acquire(&id)?;

        let tracked = self.tracked(repo, branch).await?;
        self.knowledge.drop_base(&tracked.id).await?;
        self.snapshots.remove(&tracked.id).await?;
        self.repositories.delete(&tracked.id).await?;

        info!("Deleted {} ({})", tracked.label(), tracked.id);
        Ok(tracked)
    }

    async fn tracked(&self, repo: &RepoCoordinate, branch: &str) -> Result<TrackedRepository> {
        self.repositories
            .get(&repo.knowledge_base_id(branch))
            .await?
            .ok_or_else(|| DocsKbError::NotFound(format!("{}@{} is not tracked", repo, branch)))
    }

    async fn execute(
        &self,
        guard: &SyncGuard,
        tracked: &mut TrackedRepository,
        repo: &RepoCoordinate,
        previous: Snapshot,
        options: SyncOptions,
        mode: Mode,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let label = tracked.label();
        let mut report = SyncReport::new(&tracked.name, &tracked.branch);

        let timer = OperationTimer::new(&format!("list {}", label));
        let listing = self
            .lister
            .list_files(repo, &tracked.branch, &self.policy)
            .await?;
        timer.finish_with_count(listing.files.len());

        if listing.truncated {
            return Err(DocsKbError::IncompleteListing(label));
        }
        if listing.files.is_empty() {
            if mode == Mode::FirstIngest {
                return Err(DocsKbError::NotFound(format!(
                    "no files matching {:?} in {}",
                    self.policy.extensions(),
                    label
                )));
            }
            if !previous.is_empty() && !self.settings.allow_empty_listing {
                return Err(DocsKbError::EmptyListing(label));
            }
        }

        let current: IdentityMap = listing
            .files
            .iter()
            .map(|file| (file.path.clone(), file.sha.clone()))
            .collect();
        let mut diff = planner::plan(&previous.identities(), &current);
        if mode == Mode::Refresh {
            let unchanged = std::mem::take(&mut diff.unchanged);
            diff.modified.extend(unchanged);
        }

        report.added = diff.added.len();
        report.modified = diff.modified.len();
        report.deleted = diff.deleted.len();
        report.unchanged = diff.unchanged.len();
        info!(
            "Planned {}: {} added, {} modified, {} deleted, {} unchanged",
            label, report.added, report.modified, report.deleted, report.unchanged
        );

        if options.dry_run {
            report.dry_run = true;
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        self.knowledge.ensure(&tracked.id).await?;

        let concurrency = options
            .max_concurrency
            .unwrap_or(self.settings.max_concurrency)
            .max(1);
        let phase = self
            .fetch_changes(guard, repo, tracked, &diff, concurrency)
            .await?;

        let mut snapshot = previous;
        for (path, failure) in &phase.failed {
            report.record_failure(path, failure.kind, failure.message.clone());
        }

        for file in phase.fetched {
            let document = Document::from_fetched(tracked, &file)
                .with_title(self.parser.extract_title(&file.content));
            match self.knowledge.upsert(&tracked.id, &document).await {
                Ok(()) => {
                    debug!("Indexed {}", file.path);
                    snapshot.upsert(FileRecord::new(&file.path, &file.sha, file.size));
                }
                Err(e) => {
                    // the backend may have dropped the old entry before failing;
                    // forgetting the record makes the next sync re-add the path
                    warn!("Failed to index {}: {}", file.path, e);
                    snapshot.remove(&file.path);
                    report.record_failure(&file.path, e.kind(), e.to_string());
                }
            }
        }

        for path in &diff.deleted {
            match self.knowledge.remove(&tracked.id, path).await {
                Ok(()) => {
                    debug!("Removed {}", path);
                    snapshot.remove(path);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path, e);
                    report.record_failure(path, e.kind(), e.to_string());
                }
            }
        }

        let now = Utc::now();
        for path in &diff.unchanged {
            snapshot.touch(path, now);
        }

        report.cancelled = !phase.cancelled.is_empty();
        report.cancelled_paths = phase.cancelled;

        self.snapshots.save(&tracked.id, &snapshot).await?;
        tracked.mark_synced(snapshot.len());
        self.repositories.put(tracked).await?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        if report.is_clean() {
            info!("{}", report.summary_line());
        } else {
            warn!("{}", report.summary_line());
        }
        Ok(report)
    }

    /// Fetches `added ∪ modified` batch by batch, checking for cancellation
    /// between batches.
    ///
    /// The sync lock is refreshed before every batch; losing it aborts the
    /// sync before anything has been written.
    async fn fetch_changes(
        &self,
        guard: &SyncGuard,
        repo: &RepoCoordinate,
        tracked: &TrackedRepository,
        diff: &SyncDiff,
        concurrency: usize,
    ) -> Result<FetchPhase> {
        let paths = diff.fetch_paths();
        let batch_size = self.settings.fetch_batch_size.max(1);
        let batches = paths.len().div_ceil(batch_size);
        let progress = if self.show_progress && !paths.is_empty() {
            ProgressTracker::new(paths.len())
        } else {
            ProgressTracker::hidden(paths.len())
        };

        info!(
            "Fetching {} files from {} in {} batches (timeout {}s per file)",
            paths.len(),
            tracked.label(),
            batches,
            self.fetcher.timeout().as_secs()
        );
        let timer = OperationTimer::new(&format!("fetch {}", tracked.label()));
        let mut phase = FetchPhase::default();

        for (index, batch) in paths.chunks(batch_size).enumerate() {
            guard.heartbeat()?;
            if self.is_cancelled() {
                phase
                    .cancelled
                    .extend(paths[index * batch_size..].iter().cloned());
                warn!(
                    "Sync of {} cancelled, {} files not fetched",
                    tracked.label(),
                    phase.cancelled.len()
                );
                break;
            }

            progress.set_message(format!("batch {}/{}", index + 1, batches));
            let results = self
                .fetch_with_retries(repo, &tracked.branch, batch, concurrency, &progress)
                .await;
            for result in results {
                match result.outcome {
                    Ok(file) => phase.fetched.push(file),
                    Err(failure) => {
                        phase.failed.insert(result.path, failure);
                    }
                }
            }
        }

        guard.heartbeat()?;
        progress.finish();
        timer.warn_if_slow(SLOW_FETCH_PHASE, "fetch phase");
        timer.finish();

        let stats = progress.get_stats();
        info!(
            "Fetched {} files ({} bytes, {} failed): {:.1}% success, {:.2} files/sec",
            stats.files_fetched,
            stats.bytes_fetched,
            stats.files_failed,
            stats.success_rate(),
            stats.files_per_second()
        );
        Ok(phase)
    }

    /// Retries transient failures with half the concurrency each round.
    async fn fetch_with_retries(
        &self,
        repo: &RepoCoordinate,
        branch: &str,
        batch: &[String],
        concurrency: usize,
        progress: &ProgressTracker,
    ) -> Vec<FetchResult> {
        let mut results = self
            .fetcher
            .fetch_all_with_progress(repo, branch, batch, concurrency, Some(progress))
            .await;
        let mut concurrency = concurrency;

        for attempt in 1..=self.settings.transient_retries {
            let (retry, mut done): (Vec<FetchResult>, Vec<FetchResult>) = results
                .into_iter()
                .partition(|r| r.failure_kind().is_some_and(|kind| kind.is_retryable()));
            if retry.is_empty() {
                return done;
            }

            concurrency = (concurrency / 2).max(1);
            let retry_paths: Vec<String> = retry.into_iter().map(|r| r.path).collect();
            info!(
                "Retrying {} transient failures (attempt {}, concurrency {})",
                retry_paths.len(),
                attempt,
                concurrency
            );
            progress.retrying(retry_paths.len());
            done.extend(
                self.fetcher
                    .fetch_all_with_progress(repo, branch, &retry_paths, concurrency, Some(progress))
                    .await,
            );
            results = done;
        }
        results
    }
}
