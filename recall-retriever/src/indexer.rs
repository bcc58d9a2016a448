//! Workspace file indexer.
//!
//! The [`Indexer`] walks a workspace (honoring `.gitignore` and skipping
//! hidden entries), hashes every matching file with blake3 and feeds new or
//! changed files through the [`Pipeline`]. Files that disappeared since the
//! previous scan are removed from the pipeline. Content hashes are kept on
//! the chunk metadata, so a restarted indexer over a loaded pipeline skips
//! files it already knows.
//!
//! [`Indexer::start`] runs one scan and then, when a poll interval is
//! configured, keeps rescanning from a background task until
//! [`Indexer::stop`] or the caller's token cancels it.

use crate::config::IndexerSettings;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use recall_context::Metadata;
use recall_embed::EmbedError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const SOURCE_KEY: &str = "source";
pub const PATH_KEY: &str = "path";
pub const TITLE_KEY: &str = "title";
pub const TYPE_KEY: &str = "type";
pub const HASH_KEY: &str = "content_hash";

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexing cancelled")]
    Cancelled,

    #[error("{} is outside the workspace", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("background indexing is already running")]
    AlreadyRunning,
}

/// Whether `err` was caused by cancellation, either of a scan or of an
/// embedding request.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<IndexerError>(),
            Some(IndexerError::Cancelled)
        ) || cause
            .downcast_ref::<EmbedError>()
            .is_some_and(EmbedError::is_cancelled)
    })
}

/// Configuration for the indexer
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Root directory to index
    pub workspace: PathBuf,
    /// Lowercase extensions without the dot
    pub extensions: Vec<String>,
    /// Rescan period; `None` disables the background loop
    pub poll_interval: Option<Duration>,
    /// A background scan running longer than this is cancelled
    pub scan_timeout: Duration,
}

impl IndexerConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            extensions: vec!["md".to_string()],
            poll_interval: None,
            scan_timeout: Duration::from_secs(300),
        }
    }

    pub fn from_settings(workspace: impl Into<PathBuf>, settings: &IndexerSettings) -> Self {
        Self::new(workspace)
            .with_extensions(settings.extensions.iter().cloned())
            .with_poll_interval(settings.poll_interval())
            .with_scan_timeout(settings.scan_timeout())
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Matching files found by the walk
    pub files_scanned: usize,
    /// New or changed files sent through the pipeline
    pub files_indexed: usize,
    /// Files whose content hash was unchanged
    pub files_skipped: usize,
    /// Previously indexed files that no longer exist
    pub files_removed: usize,
    pub chunks_indexed: usize,
    /// Per-file problems; the scan carried on past each of them
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl IndexReport {
    fn begin() -> Self {
        Self {
            files_scanned: 0,
            files_indexed: 0,
            files_skipped: 0,
            files_removed: 0,
            chunks_indexed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn changed(&self) -> bool {
        self.files_indexed > 0 || self.files_removed > 0
    }
}

#[derive(Debug, Default)]
struct Tracked {
    /// Workspace-relative path to content hash
    hashes: HashMap<String, String>,
    /// Whether `hashes` was filled from the pipeline yet
    seeded: bool,
}

struct BackgroundTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Indexer {
    config: IndexerConfig,
    pipeline: Arc<Pipeline>,
    tracked: Mutex<Tracked>,
    background: Mutex<Option<BackgroundTask>>,
}

struct PendingFile {
    relative: String,
    absolute: PathBuf,
    content: String,
    hash: String,
}

fn content_hash(content: &str) -> String {
    hex::encode(blake3::hash(content.as_bytes()).as_bytes())
}

fn is_memory_path(relative: &str) -> bool {
    relative.starts_with("memory/") || relative == "MEMORY.md"
}

impl Indexer {
    pub fn new(config: IndexerConfig, pipeline: Arc<Pipeline>) -> Result<Self> {
        let workspace = std::fs::canonicalize(&config.workspace).with_context(|| {
            format!("Workspace {} is not accessible", config.workspace.display())
        })?;
        if !workspace.is_dir() {
            anyhow::bail!("Workspace {} is not a directory", workspace.display());
        }
        let extensions = config.extensions.clone();
        let config = IndexerConfig { workspace, ..config }.with_extensions(extensions);
        Ok(Self {
            config,
            pipeline,
            tracked: Mutex::new(Tracked::default()),
            background: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }

    /// `path` relative to the workspace, `/`-separated.
    fn relative(&self, path: &Path) -> Result<String> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.workspace.join(path)
        };
        let absolute = std::fs::canonicalize(&absolute).unwrap_or(absolute);
        let relative = absolute
            .strip_prefix(&self.config.workspace)
            .map_err(|_| IndexerError::OutsideWorkspace(absolute.clone()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            return Err(IndexerError::OutsideWorkspace(absolute).into());
        }
        Ok(parts.join("/"))
    }

    fn metadata_for(&self, relative: &str, absolute: &Path, hash: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), absolute.display().to_string());
        metadata.insert(PATH_KEY.to_string(), relative.to_string());
        if let Some(stem) = absolute.file_stem() {
            metadata.insert(TITLE_KEY.to_string(), stem.to_string_lossy().into_owned());
        }
        if is_memory_path(relative) {
            metadata.insert(TYPE_KEY.to_string(), "memory".to_string());
        }
        metadata.insert(HASH_KEY.to_string(), hash.to_string());
        metadata
    }

    /// Fill the hash table from what the pipeline already holds.
    async fn seed(&self, tracked: &mut Tracked) {
        if tracked.seeded {
            return;
        }
        for (doc_id, metadata) in self.pipeline.document_metadata().await {
            if let Some(hash) = metadata.get(HASH_KEY) {
                tracked.hashes.insert(doc_id, hash.clone());
            }
        }
        if !tracked.hashes.is_empty() {
            debug!("Restored {} file hashes from the index", tracked.hashes.len());
        }
        tracked.seeded = true;
    }

    /// Matching files in the workspace, sorted.
    fn discover(&self, report: &mut IndexReport) -> Vec<PathBuf> {
        let walker = ignore::WalkBuilder::new(&self.config.workspace)
            .hidden(true)
            .require_git(false)
            .build();
        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                    if is_file && self.matches_extension(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    report.errors.push(e.to_string());
                }
            }
        }
        files.sort();
        files
    }

    /// Scan the workspace once and bring the pipeline up to date.
    ///
    /// Per-file failures are logged and collected in the report. A fired
    /// `cancel` aborts with [`IndexerError::Cancelled`] and nothing is saved.
    pub async fn index_now(&self, cancel: &CancellationToken) -> Result<IndexReport> {
        let timer = Instant::now();
        let mut report = IndexReport::begin();
        if cancel.is_cancelled() {
            return Err(IndexerError::Cancelled.into());
        }

        let mut tracked = self.tracked.lock().await;
        self.seed(&mut tracked).await;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for absolute in self.discover(&mut report) {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled.into());
            }
            let relative = match self.relative(&absolute) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!("Skipping {}: {}", absolute.display(), e);
                    report.errors.push(format!("{}: {}", absolute.display(), e));
                    continue;
                }
            };
            seen.insert(relative.clone());
            report.files_scanned += 1;

            let content = match tokio::fs::read_to_string(&absolute).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", relative, e);
                    report.errors.push(format!("{relative}: {e}"));
                    continue;
                }
            };
            let hash = content_hash(&content);
            if tracked.hashes.get(&relative) == Some(&hash) {
                report.files_skipped += 1;
                continue;
            }
            pending.push(PendingFile {
                relative,
                absolute,
                content,
                hash,
            });
        }

        if !pending.is_empty() && self.pipeline.chunk_count().await == 0 {
            let corpus: Vec<String> = pending.iter().map(|f| f.content.clone()).collect();
            self.pipeline
                .fit(&corpus)
                .await
                .context("Failed to prepare the embedder")?;
        }

        for file in pending {
            if cancel.is_cancelled() {
                return Err(IndexerError::Cancelled.into());
            }
            let metadata = self.metadata_for(&file.relative, &file.absolute, &file.hash);
            match self
                .pipeline
                .add_cancellable(&file.relative, &file.content, &metadata, cancel)
                .await
            {
                Ok(chunks) => {
                    debug!("Indexed {} ({} chunks)", file.relative, chunks);
                    report.files_indexed += 1;
                    report.chunks_indexed += chunks;
                    tracked.hashes.insert(file.relative, file.hash);
                }
                Err(e) if is_cancelled(&e) => return Err(IndexerError::Cancelled.into()),
                Err(e) => {
                    warn!("Failed to index {}: {:#}", file.relative, e);
                    report.errors.push(format!("{}: {:#}", file.relative, e));
                }
            }
        }

        let stale: Vec<String> = tracked
            .hashes
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();
        for path in stale {
            self.pipeline.remove(std::slice::from_ref(&path)).await?;
            tracked.hashes.remove(&path);
            debug!("Removed {} from the index", path);
            report.files_removed += 1;
        }

        if report.changed() {
            self.pipeline.save().await?;
        }

        report.duration = timer.elapsed();
        info!(
            "Scan finished in {:?}: {} scanned, {} indexed, {} skipped, {} removed, {} errors",
            report.duration,
            report.files_scanned,
            report.files_indexed,
            report.files_skipped,
            report.files_removed,
            report.errors.len()
        );
        Ok(report)
    }

    /// Index one file now, whether or not it changed, and save.
    ///
    /// Returns the number of chunks stored.
    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let relative = self.relative(path)?;
        let absolute = self.config.workspace.join(&relative);
        let content = tokio::fs::read_to_string(&absolute)
            .await
            .with_context(|| format!("Failed to read {}", absolute.display()))?;
        let hash = content_hash(&content);

        let mut tracked = self.tracked.lock().await;
        self.seed(&mut tracked).await;
        let metadata = self.metadata_for(&relative, &absolute, &hash);
        let chunks = self.pipeline.add(&relative, &content, &metadata).await?;
        tracked.hashes.insert(relative, hash);
        self.pipeline.save().await?;
        Ok(chunks)
    }

    /// Drop one file from the index and save. Returns whether it was known.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        let relative = self.relative(path)?;

        let mut tracked = self.tracked.lock().await;
        self.seed(&mut tracked).await;
        let was_tracked = tracked.hashes.remove(&relative).is_some();
        let chunks = self.pipeline.remove(std::slice::from_ref(&relative)).await?;
        let removed = was_tracked || chunks > 0;
        if removed {
            self.pipeline.save().await?;
        }
        Ok(removed)
    }

    /// Run one scan, then keep scanning in the background if a poll interval
    /// is configured.
    ///
    /// The background loop ends when `cancel` fires or [`stop`](Self::stop)
    /// is called. Returns the report of the first scan.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<IndexReport> {
        let mut background = self.background.lock().await;
        if background.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return Err(IndexerError::AlreadyRunning.into());
        }

        let report = self.index_now(&cancel).await?;

        if let Some(interval) = self.config.poll_interval {
            let token = cancel.child_token();
            let handle = tokio::spawn(Arc::clone(self).poll(interval, token.clone()));
            *background = Some(BackgroundTask { token, handle });
            info!("Watching {} every {:?}", self.config.workspace.display(), interval);
        }
        Ok(report)
    }

    async fn poll(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately and the initial scan already ran
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let scan_token = token.child_token();
            let watchdog = {
                let scan_token = scan_token.clone();
                let timeout = self.config.scan_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    scan_token.cancel();
                })
            };
            let result = self.index_now(&scan_token).await;
            watchdog.abort();

            match result {
                Ok(report) if report.changed() => {
                    debug!(
                        "Background scan indexed {} and removed {} files",
                        report.files_indexed, report.files_removed
                    );
                }
                Ok(_) => {}
                Err(e) if is_cancelled(&e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    warn!(
                        "Background scan exceeded {:?} and was cancelled",
                        self.config.scan_timeout
                    );
                }
                Err(e) => error!("Background scan failed: {:#}", e),
            }
        }
        debug!("Background indexing stopped");
    }

    /// Cancel the background loop and wait for it to finish.
    pub async fn stop(&self) {
        let task = self.background.lock().await.take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!("Background indexing task ended abnormally: {}", e);
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.background
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HnswConfig;
    use crate::storage::{MemoryStore, VectorStore};
    use recall_context::{ChunkerConfig, create_chunker};
    use recall_embed::TfIdfProvider;
    use std::fs;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    fn pipeline_with(store: Arc<dyn VectorStore>) -> Arc<Pipeline> {
        Arc::new(
            Pipeline::new(
                create_chunker(&ChunkerConfig::default()),
                Arc::new(TfIdfProvider::new(256)),
                HnswConfig::default().with_seed(1),
                Some(store),
            )
            .unwrap(),
        )
    }

    fn indexer_for(workspace: &Path) -> Indexer {
        Indexer::new(
            IndexerConfig::new(workspace),
            pipeline_with(Arc::new(MemoryStore::new())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rescan_skips_unchanged_files() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("a.md"), "# A\n\nalpha text")?;
        fs::write(temp_dir.path().join("b.md"), "# B\n\nbeta text")?;
        let indexer = indexer_for(temp_dir.path());
        let token = CancellationToken::new();

        let first = indexer.index_now(&token).await?;
        assert_eq!(first.files_scanned, 2);
        assert_eq!(first.files_indexed, 2);
        assert!(first.chunks_indexed >= 2);

        let second = indexer.index_now(&token).await?;
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 2);
        assert!(!second.changed());

        fs::write(temp_dir.path().join("b.md"), "# B\n\nbeta text, revised")?;
        let third = indexer.index_now(&token).await?;
        assert_eq!(third.files_indexed, 1);
        assert_eq!(third.files_skipped, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_file_is_removed() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("keep.md"), "apples and pears")?;
        fs::write(temp_dir.path().join("remove.md"), "zebras and giraffes")?;
        let indexer = indexer_for(temp_dir.path());
        let token = CancellationToken::new();

        indexer.index_now(&token).await?;
        let hits = indexer.pipeline().search("zebras", 1).await?;
        assert!(hits[0].id.starts_with("remove.md#"));

        fs::remove_file(temp_dir.path().join("remove.md"))?;
        let report = indexer.index_now(&token).await?;
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_indexed, 0);

        let hits = indexer.pipeline().search("zebras", 10).await?;
        assert!(hits.iter().all(|h| h.id.starts_with("keep.md#")));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_metadata_and_filtering() -> Result<()> {
        let temp_dir = tempdir()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("memory"))?;
        fs::create_dir_all(root.join("notes"))?;
        fs::create_dir_all(root.join(".hidden"))?;
        fs::write(root.join("memory/today.md"), "met with the team")?;
        fs::write(root.join("MEMORY.md"), "long term facts")?;
        fs::write(root.join("notes/plan.md"), "ship the release")?;
        fs::write(root.join("notes/data.txt"), "not markdown")?;
        fs::write(root.join(".hidden/secret.md"), "hidden note")?;
        fs::write(root.join(".gitignore"), "ignored.md\n")?;
        fs::write(root.join("ignored.md"), "ignored note")?;

        let indexer = indexer_for(root);
        let report = indexer.index_now(&CancellationToken::new()).await?;
        assert_eq!(report.files_scanned, 3);
        assert_eq!(
            indexer.pipeline().document_ids().await,
            vec!["MEMORY.md", "memory/today.md", "notes/plan.md"]
        );

        let metadata = indexer.pipeline().document_metadata().await;
        let plan = &metadata["notes/plan.md"];
        assert_eq!(plan[PATH_KEY], "notes/plan.md");
        assert_eq!(plan[TITLE_KEY], "plan");
        assert!(plan[SOURCE_KEY].ends_with("plan.md"));
        assert!(Path::new(&plan[SOURCE_KEY]).is_absolute());
        assert!(!plan.contains_key(TYPE_KEY));
        assert_eq!(metadata["memory/today.md"][TYPE_KEY], "memory");
        assert_eq!(metadata["MEMORY.md"][TYPE_KEY], "memory");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unreadable_file_is_reported() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("good.md"), "fine content")?;
        fs::write(temp_dir.path().join("bad.md"), [0xff, 0xfe, 0xfd])?;
        let indexer = indexer_for(temp_dir.path());

        let report = indexer.index_now(&CancellationToken::new()).await?;
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("bad.md"));
        assert!(logs_contain("Failed to read bad.md"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_scan() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("a.md"), "text")?;
        let indexer = indexer_for(temp_dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let err = indexer.index_now(&token).await.unwrap_err();
        assert!(is_cancelled(&err));
        assert_eq!(indexer.pipeline().chunk_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_restarted_indexer_skips_known_files() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("a.md"), "persistent content")?;
        let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

        let first = Indexer::new(IndexerConfig::new(temp_dir.path()), pipeline_with(store.clone()))?;
        first.index_now(&CancellationToken::new()).await?;

        let pipeline = pipeline_with(store);
        pipeline.load().await?;
        let second = Indexer::new(IndexerConfig::new(temp_dir.path()), pipeline)?;
        let report = second.index_now(&CancellationToken::new()).await?;
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_indexed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_file_operations() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("one.md"), "first file")?;
        let indexer = indexer_for(temp_dir.path());

        assert_eq!(indexer.index_file(Path::new("one.md")).await?, 1);
        assert_eq!(indexer.pipeline().document_ids().await, vec!["one.md"]);

        let outside = tempdir()?;
        fs::write(outside.path().join("x.md"), "elsewhere")?;
        let err = indexer.index_file(&outside.path().join("x.md")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexerError>(),
            Some(IndexerError::OutsideWorkspace(_))
        ));

        assert!(indexer.remove_file(Path::new("one.md")).await?);
        assert!(!indexer.remove_file(Path::new("one.md")).await?);
        assert_eq!(indexer.pipeline().document_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_background_loop_picks_up_new_files() -> Result<()> {
        let temp_dir = tempdir()?;
        fs::write(temp_dir.path().join("first.md"), "initial note")?;
        let indexer = Arc::new(Indexer::new(
            IndexerConfig::new(temp_dir.path()).with_poll_interval(Some(Duration::from_millis(20))),
            pipeline_with(Arc::new(MemoryStore::new())),
        )?);

        let report = indexer.start(CancellationToken::new()).await?;
        assert_eq!(report.files_indexed, 1);
        assert!(indexer.is_running().await);
        assert!(matches!(
            indexer
                .start(CancellationToken::new())
                .await
                .unwrap_err()
                .downcast_ref::<IndexerError>(),
            Some(IndexerError::AlreadyRunning)
        ));

        fs::write(temp_dir.path().join("second.md"), "later note")?;
        let picked_up = tokio::time::timeout(Duration::from_secs(10), async {
            while indexer.pipeline().document_count().await < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(picked_up.is_ok());

        indexer.stop().await;
        assert!(!indexer.is_running().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_parent_token_stops_background_loop() -> Result<()> {
        let temp_dir = tempdir()?;
        let indexer = Arc::new(Indexer::new(
            IndexerConfig::new(temp_dir.path()).with_poll_interval(Some(Duration::from_millis(10))),
            pipeline_with(Arc::new(MemoryStore::new())),
        )?);
        let token = CancellationToken::new();
        indexer.start(token.clone()).await?;
        token.cancel();

        let stopped = tokio::time::timeout(Duration::from_secs(5), async {
            while indexer.is_running().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        Ok(())
    }

    #[test]
    fn test_memory_paths() {
        assert!(is_memory_path("memory/2024-01-01.md"));
        assert!(is_memory_path("MEMORY.md"));
        assert!(!is_memory_path("notes/MEMORY.md"));
        assert!(!is_memory_path("memoryless.md"));
    }
}
