//! Repository import orchestration
//!
//! One import runs as a single sequential flow:
//! lookup → scratch prep → fetch → delete existing → walk/stage/flush →
//! record URL → release scratch. A blocking scanner task walks the tree and
//! evaluates files; the async side classifies, stages and flushes batches.
//! The channel between them holds at most one batch, so memory stays bounded
//! and the scanner never runs ahead of a stalled flush.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::classify;
use crate::config::IngestConfig;
use crate::fetcher::{FetchError, Fetcher, GitFetcher, ScratchSpace};
use crate::filter::{ContentReader, FilterPolicy, FsContentReader, SkipReason};
use crate::store::{NewFile, ProjectId, ProjectStore, StoreError};
use crate::walker::walk;

/// Pipeline step, reported with fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    LookupProject,
    PrepareScratch,
    Fetch,
    DeleteExisting,
    InsertBatch,
    FinalFlush,
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStep::LookupProject => "project lookup",
            ImportStep::PrepareScratch => "scratch preparation",
            ImportStep::Fetch => "fetch",
            ImportStep::DeleteExisting => "delete existing files",
            ImportStep::InsertBatch => "batch insert",
            ImportStep::FinalFlush => "final flush",
        };
        f.write_str(name)
    }
}

/// Per-file result of a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Imported,
    Skipped(SkipReason),
}

/// Aggregate counts for one import.
///
/// `files_skipped` always equals the sum of the three skip buckets, and
/// `files_committed` never exceeds `files_imported`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub files_imported: usize,
    pub files_skipped: usize,
    pub skipped_too_large: usize,
    pub skipped_binary: usize,
    pub skipped_unreadable: usize,
    pub files_committed: usize,
    pub batches_committed: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Imported => self.files_imported += 1,
            FileOutcome::Skipped(reason) => {
                self.files_skipped += 1;
                match reason {
                    SkipReason::TooLarge { .. } => self.skipped_too_large += 1,
                    SkipReason::Binary => self.skipped_binary += 1,
                    SkipReason::Unreadable { .. } => self.skipped_unreadable += 1,
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("project {0} not found")]
    NotFound(ProjectId),

    #[error("failed to clear scratch location {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(
        "{step} failed ({} imported, {} committed, {} skipped): {source}",
        .summary.files_imported,
        .summary.files_committed,
        .summary.files_skipped
    )]
    Persistence {
        step: ImportStep,
        summary: ImportSummary,
        #[source]
        source: StoreError,
    },
}

impl ImportError {
    pub fn step(&self) -> ImportStep {
        match self {
            ImportError::NotFound(_) => ImportStep::LookupProject,
            ImportError::Cleanup { .. } => ImportStep::PrepareScratch,
            ImportError::Fetch(_) => ImportStep::Fetch,
            ImportError::Persistence { step, .. } => *step,
        }
    }

    /// Counts accumulated before the failure, when any work had started
    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportError::Persistence { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

struct ScannedFile {
    path: String,
    content: Result<String, SkipReason>,
}

/// Imports remote repositories into project file rows.
///
/// Imports for different projects may run concurrently. Two imports for the
/// same project must not overlap: they share a scratch location and race on
/// delete-then-insert.
pub struct Importer {
    store: Arc<dyn ProjectStore>,
    fetcher: Arc<dyn Fetcher>,
    reader: Arc<dyn ContentReader>,
    policy: FilterPolicy,
    scratch_dir: PathBuf,
    batch_size: usize,
}

impl Importer {
    pub fn new(store: Arc<dyn ProjectStore>, config: &IngestConfig) -> Self {
        Self {
            store,
            fetcher: Arc::new(GitFetcher::new(config.fetch_timeout())),
            reader: Arc::new(FsContentReader),
            policy: config.filter_policy(),
            scratch_dir: config.scratch_dir.clone(),
            batch_size: config.batch_size.max(1),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn ContentReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn scratch_space(&self, project_id: ProjectId) -> ScratchSpace {
        ScratchSpace::for_project(&self.scratch_dir, project_id)
    }

    pub async fn import_repository(
        &self,
        project_id: ProjectId,
        repository_url: &str,
    ) -> Result<ImportSummary, ImportError> {
        self.import_repository_with_cancel(project_id, repository_url, CancellationToken::new())
            .await
    }

    /// Import with a caller-held cancellation signal for the fetch step
    #[instrument(skip(self, cancel))]
    pub async fn import_repository_with_cancel(
        &self,
        project_id: ProjectId,
        repository_url: &str,
        cancel: CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let project = self
            .store
            .find_project(project_id)
            .await
            .map_err(|source| ImportError::Persistence {
                step: ImportStep::LookupProject,
                summary: ImportSummary::default(),
                source,
            })?;
        if project.is_none() {
            warn!(project_id = %project_id, "Import requested for unknown project");
            return Err(ImportError::NotFound(project_id));
        }

        let scratch = self.scratch_space(project_id);
        if let Err(source) = scratch.prepare().await {
            error!(path = %scratch.path().display(), error = %source, "Cannot prepare scratch location");
            return Err(ImportError::Cleanup {
                path: scratch.path().to_path_buf(),
                source,
            });
        }

        let outcome = self
            .run(project_id, repository_url, &scratch, cancel)
            .await;
        scratch.release().await;

        match &outcome {
            Ok(summary) => info!(
                project_id = %project_id,
                repository = %repository_url,
                imported = summary.files_imported,
                skipped = summary.files_skipped,
                batches = summary.batches_committed,
                "Import complete"
            ),
            Err(err) => error!(
                project_id = %project_id,
                repository = %repository_url,
                step = %err.step(),
                "Import failed: {}",
                err
            ),
        }
        outcome
    }

    async fn run(
        &self,
        project_id: ProjectId,
        repository_url: &str,
        scratch: &ScratchSpace,
        cancel: CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        self.fetcher
            .fetch(repository_url, scratch.path(), cancel)
            .await?;

        let deleted = self
            .store
            .delete_files_for_project(project_id)
            .await
            .map_err(|source| ImportError::Persistence {
                step: ImportStep::DeleteExisting,
                summary: ImportSummary::default(),
                source,
            })?;
        debug!(project_id = %project_id, deleted, "Cleared previous import");

        let summary = self.ingest_tree(project_id, scratch.path()).await?;

        if let Err(err) = self
            .store
            .update_project_repo_url(project_id, repository_url)
            .await
        {
            warn!(
                project_id = %project_id,
                error = %err,
                "Failed to record repository URL on project"
            );
        }

        Ok(summary)
    }

    async fn ingest_tree(
        &self,
        project_id: ProjectId,
        root: &Path,
    ) -> Result<ImportSummary, ImportError> {
        let (tx, mut rx) = mpsc::channel::<ScannedFile>(self.batch_size);
        let scanner = {
            let root = root.to_path_buf();
            let policy = self.policy.clone();
            let reader = Arc::clone(&self.reader);
            task::spawn_blocking(move || {
                for entry in walk(&root, &policy) {
                    let scanned = ScannedFile {
                        content: policy.evaluate(&entry.absolute, reader.as_ref()),
                        path: entry.relative,
                    };
                    if tx.blocking_send(scanned).is_err() {
                        // Receiver gone: the import already failed.
                        break;
                    }
                }
            })
        };

        let mut summary = ImportSummary::default();
        let mut staged: Vec<NewFile> = Vec::with_capacity(self.batch_size);
        let mut failure = None;

        while let Some(scanned) = rx.recv().await {
            let outcome = match scanned.content {
                Ok(content) => {
                    staged.push(NewFile {
                        project_id,
                        language: classify(&scanned.path).to_string(),
                        path: scanned.path,
                        content,
                    });
                    FileOutcome::Imported
                }
                Err(reason) => {
                    debug!(path = %scanned.path, %reason, "Skipping file");
                    FileOutcome::Skipped(reason)
                }
            };
            summary.record(&outcome);

            if staged.len() >= self.batch_size {
                if let Err(source) = self.flush(&mut staged, &mut summary).await {
                    failure = Some((ImportStep::InsertBatch, source));
                    break;
                }
            }
        }

        drop(rx);
        if let Err(err) = scanner.await {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
        }

        if failure.is_none() && !staged.is_empty() {
            if let Err(source) = self.flush(&mut staged, &mut summary).await {
                failure = Some((ImportStep::FinalFlush, source));
            }
        }

        match failure {
            Some((step, source)) => Err(ImportError::Persistence {
                step,
                summary,
                source,
            }),
            None => Ok(summary),
        }
    }

    async fn flush(
        &self,
        staged: &mut Vec<NewFile>,
        summary: &mut ImportSummary,
    ) -> Result<(), StoreError> {
        let batch = summary.batches_committed + 1;
        self.store.insert_files(staged).await?;

        summary.files_committed += staged.len();
        summary.batches_committed = batch;
        debug!(batch, rows = staged.len(), "Committed batch");
        staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileRow, MemoryProjectStore, Project, StoreResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Copies a prepared directory instead of cloning
    struct DirFetcher {
        source: PathBuf,
        calls: AtomicUsize,
    }

    impl DirFetcher {
        fn new(source: &Path) -> Arc<Self> {
            Arc::new(Self {
                source: source.to_path_buf(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), target)?;
            }
        }
        Ok(())
    }

    #[async_trait]
    impl Fetcher for DirFetcher {
        async fn fetch(
            &self,
            _url: &str,
            dest: &Path,
            _cancel: CancellationToken,
        ) -> Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            copy_tree(&self.source, dest).map_err(|err| FetchError::Task(err.to_string()))
        }
    }

    /// Leaves a partial tree behind, then waits for cancellation
    struct StallingFetcher;

    #[async_trait]
    impl Fetcher for StallingFetcher {
        async fn fetch(
            &self,
            _url: &str,
            dest: &Path,
            cancel: CancellationToken,
        ) -> Result<(), FetchError> {
            fs::create_dir_all(dest.join("partial")).map_err(|e| FetchError::Task(e.to_string()))?;
            cancel.cancelled().await;
            Err(FetchError::Cancelled)
        }
    }

    #[derive(Default)]
    struct CountingReader {
        reads: Mutex<Vec<PathBuf>>,
    }

    impl ContentReader for CountingReader {
        fn file_size(&self, path: &Path) -> io::Result<u64> {
            FsContentReader.file_size(path)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.reads.lock().push(path.to_path_buf());
            FsContentReader.read(path)
        }
    }

    /// Refuses to read files with one chosen name
    struct DeniedReader {
        denied: &'static str,
    }

    impl ContentReader for DeniedReader {
        fn file_size(&self, path: &Path) -> io::Result<u64> {
            FsContentReader.file_size(path)
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            if path.file_name().is_some_and(|name| name == self.denied) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
            }
            FsContentReader.read(path)
        }
    }

    /// Wraps the memory store, records batch sizes and fails chosen calls
    struct RecordingStore {
        inner: MemoryProjectStore,
        batches: Mutex<Vec<usize>>,
        fail_insert_on: Option<usize>,
        fail_delete: bool,
        fail_url_update: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: MemoryProjectStore::new(),
                batches: Mutex::new(Vec::new()),
                fail_insert_on: None,
                fail_delete: false,
                fail_url_update: false,
            }
        }
    }

    #[async_trait]
    impl ProjectStore for RecordingStore {
        async fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
            self.inner.find_project(id).await
        }

        async fn delete_files_for_project(&self, id: ProjectId) -> StoreResult<u64> {
            if self.fail_delete {
                return Err(StoreError::Unavailable("delete refused".into()));
            }
            self.inner.delete_files_for_project(id).await
        }

        async fn insert_files(&self, batch: &[NewFile]) -> StoreResult<()> {
            let call = {
                let mut batches = self.batches.lock();
                batches.push(batch.len());
                batches.len()
            };
            if self.fail_insert_on == Some(call) {
                return Err(StoreError::Unavailable(format!("insert {call} refused")));
            }
            self.inner.insert_files(batch).await
        }

        async fn update_project_repo_url(&self, id: ProjectId, url: &str) -> StoreResult<()> {
            if self.fail_url_update {
                return Err(StoreError::Unavailable("update refused".into()));
            }
            self.inner.update_project_repo_url(id, url).await
        }

        async fn create_project(&self, name: &str) -> StoreResult<Project> {
            self.inner.create_project(name).await
        }

        async fn list_projects(&self) -> StoreResult<Vec<Project>> {
            self.inner.list_projects().await
        }

        async fn list_files(&self, id: ProjectId) -> StoreResult<Vec<FileRow>> {
            self.inner.list_files(id).await
        }
    }

    struct Fixture {
        source: TempDir,
        scratch: TempDir,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            Ok(Self {
                source: TempDir::new()?,
                scratch: TempDir::new()?,
            })
        }

        fn write(&self, rel: &str, bytes: &[u8]) -> anyhow::Result<()> {
            let path = self.source.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, bytes)?;
            Ok(())
        }

        fn config(&self, batch_size: usize) -> IngestConfig {
            IngestConfig {
                scratch_dir: self.scratch.path().to_path_buf(),
                batch_size,
                ..IngestConfig::default()
            }
        }
    }

    fn sorted_paths(files: &[FileRow]) -> Vec<String> {
        let mut paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_mixed_tree_import() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write("a.py", &[b'#'; 500])?;
        fixture.write("b.png", &vec![b'x'; 2_000_000])?;
        fixture.write("c.bin", &[0xff, 0xfe, 0x00, 0x80, 0x81, 0xc3, 0x28, 0xa0, 0xa1, 0xe2])?;
        fixture.write(".git/config", b"[core]\n\tbare = false\n")?;

        let store = Arc::new(MemoryProjectStore::new());
        let project = store.create_project("demo").await?;
        let reader = Arc::new(CountingReader::default());
        let importer = Importer::new(store.clone(), &fixture.config(50))
            .with_fetcher(DirFetcher::new(fixture.source.path()))
            .with_reader(reader.clone());

        let summary = importer
            .import_repository(project.id, "https://example.com/demo.git")
            .await?;

        assert_eq!(summary.files_imported, 1);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.skipped_too_large, 1);
        assert_eq!(summary.skipped_binary, 1);
        assert_eq!(summary.batches_committed, 1);

        let files = store.list_files(project.id).await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.py");
        assert_eq!(files[0].language.as_deref(), Some("python"));

        let read_names: Vec<String> = reader
            .reads
            .lock()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert!(!read_names.contains(&"b.png".to_string()), "oversized file was read");
        assert!(!read_names.contains(&"config".to_string()), ".git was visited");

        let project = store.find_project(project.id).await?.expect("project exists");
        assert_eq!(project.repo_url.as_deref(), Some("https://example.com/demo.git"));
        assert!(!importer.scratch_space(project.id).path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped_and_import_continues() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write("app.py", b"print('app')\n")?;
        fixture.write("secret.env", b"TOKEN=abc\n")?;
        fixture.write("lib/util.go", b"package lib\n")?;

        let store = Arc::new(MemoryProjectStore::new());
        let project = store.create_project("denied").await?;
        let importer = Importer::new(store.clone(), &fixture.config(50))
            .with_fetcher(DirFetcher::new(fixture.source.path()))
            .with_reader(Arc::new(DeniedReader {
                denied: "secret.env",
            }));

        let summary = importer
            .import_repository(project.id, "https://example.com/denied.git")
            .await?;

        assert_eq!(summary.files_imported, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.skipped_unreadable, 1);
        assert_eq!(summary.skipped_binary, 0);
        assert_eq!(summary.files_committed, 2);
        assert_eq!(
            sorted_paths(&store.list_files(project.id).await?),
            vec!["app.py", "lib/util.go"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_batches_are_bounded() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        for i in 0..7 {
            fixture.write(&format!("src/mod_{i}.rs"), b"pub fn f() {}\n")?;
        }

        let store = Arc::new(RecordingStore::new());
        let project = store.create_project("batched").await?;
        let importer = Importer::new(store.clone(), &fixture.config(3))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        let summary = importer.import_repository(project.id, "https://example.com/b.git").await?;

        assert_eq!(*store.batches.lock(), vec![3, 3, 1]);
        assert_eq!(summary.batches_committed, 3);
        assert_eq!(summary.files_committed, 7);
        assert_eq!(store.list_files(project.id).await?.len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_final_batch() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        for i in 0..4 {
            fixture.write(&format!("f{i}.txt"), b"text")?;
        }

        let store = Arc::new(RecordingStore::new());
        let project = store.create_project("even").await?;
        let importer = Importer::new(store.clone(), &fixture.config(2))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        importer.import_repository(project.id, "https://example.com/e.git").await?;
        assert_eq!(*store.batches.lock(), vec![2, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        for i in 0..8 {
            fixture.write(&format!("f{i}.md"), b"# doc")?;
        }

        let mut store = RecordingStore::new();
        store.fail_insert_on = Some(2);
        let store = Arc::new(store);
        let project = store.create_project("partial").await?;
        let importer = Importer::new(store.clone(), &fixture.config(3))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        let err = importer
            .import_repository(project.id, "https://example.com/p.git")
            .await
            .expect_err("second batch fails");

        assert_eq!(err.step(), ImportStep::InsertBatch);
        let summary = err.summary().expect("summary attached");
        assert_eq!(summary.files_committed, 3);
        assert_eq!(summary.batches_committed, 1);
        assert_eq!(summary.files_imported, 6);
        assert_eq!(store.list_files(project.id).await?.len(), 3);

        // URL only recorded on success
        let project = store.find_project(project.id).await?.expect("project exists");
        assert!(project.repo_url.is_none());
        assert!(!importer.scratch_space(project.id).path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_final_flush() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        for i in 0..4 {
            fixture.write(&format!("f{i}.json"), b"{}")?;
        }

        let mut store = RecordingStore::new();
        store.fail_insert_on = Some(2);
        let store = Arc::new(store);
        let project = store.create_project("tail").await?;
        let importer = Importer::new(store.clone(), &fixture.config(3))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        let err = importer
            .import_repository(project.id, "https://example.com/t.git")
            .await
            .expect_err("final flush fails");

        assert_eq!(err.step(), ImportStep::FinalFlush);
        let summary = err.summary().expect("summary attached");
        assert_eq!(summary.files_imported, 4);
        assert_eq!(summary.files_committed, 3);
        assert_eq!(store.list_files(project.id).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_failure_aborts_before_insert() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write("main.go", b"package main")?;

        let mut store = RecordingStore::new();
        store.fail_delete = true;
        let store = Arc::new(store);
        let project = store.create_project("nodelete").await?;
        let importer = Importer::new(store.clone(), &fixture.config(50))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        let err = importer
            .import_repository(project.id, "https://example.com/d.git")
            .await
            .expect_err("delete fails");

        assert_eq!(err.step(), ImportStep::DeleteExisting);
        assert!(store.batches.lock().is_empty());
        assert!(!importer.scratch_space(project.id).path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_url_update_failure_is_not_fatal() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write("index.ts", b"export {}")?;

        let mut store = RecordingStore::new();
        store.fail_url_update = true;
        let store = Arc::new(store);
        let project = store.create_project("nourl").await?;
        let importer = Importer::new(store.clone(), &fixture.config(50))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        let summary = importer.import_repository(project.id, "https://example.com/u.git").await?;
        assert_eq!(summary.files_imported, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_project_touches_nothing() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let scratch_base = fixture.scratch.path().join("never-created");
        let store = Arc::new(MemoryProjectStore::new());
        let fetcher = DirFetcher::new(fixture.source.path());
        let config = IngestConfig {
            scratch_dir: scratch_base.clone(),
            ..IngestConfig::default()
        };
        let importer = Importer::new(store, &config).with_fetcher(fetcher.clone());

        let err = importer
            .import_repository(ProjectId(42), "https://example.com/x.git")
            .await
            .expect_err("project is missing");

        assert!(matches!(err, ImportError::NotFound(ProjectId(42))));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(!scratch_base.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unclearable_scratch_aborts_before_fetch() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        // A regular file where the scratch base directory should be
        let blocker = fixture.scratch.path().join("blocker");
        fs::write(&blocker, b"not a directory")?;

        let store = Arc::new(MemoryProjectStore::new());
        let project = store.create_project("blocked").await?;
        let fetcher = DirFetcher::new(fixture.source.path());
        let config = IngestConfig {
            scratch_dir: blocker,
            ..IngestConfig::default()
        };
        let importer = Importer::new(store, &config).with_fetcher(fetcher.clone());

        let err = importer
            .import_repository(project.id, "https://example.com/x.git")
            .await
            .expect_err("scratch cannot be prepared");

        assert!(matches!(err, ImportError::Cleanup { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_fetch_cleans_up_and_keeps_rows() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let store = Arc::new(MemoryProjectStore::new());
        let project = store.create_project("cancel").await?;
        store
            .insert_files(&[NewFile {
                project_id: project.id,
                path: "old.py".to_string(),
                content: "print()".to_string(),
                language: "python".to_string(),
            }])
            .await?;

        let importer =
            Importer::new(store.clone(), &fixture.config(50)).with_fetcher(Arc::new(StallingFetcher));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = importer
            .import_repository_with_cancel(project.id, "https://example.com/c.git", cancel)
            .await
            .expect_err("fetch cancelled");

        assert!(matches!(err, ImportError::Fetch(FetchError::Cancelled)));
        assert!(!importer.scratch_space(project.id).path().exists());
        assert_eq!(sorted_paths(&store.list_files(project.id).await?), vec!["old.py"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reimport_replaces_previous_rows() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.write("keep.rs", b"fn keep() {}")?;
        fixture.write("gone.rs", b"fn gone() {}")?;

        let store = Arc::new(MemoryProjectStore::new());
        let project = store.create_project("reimport").await?;
        let importer = Importer::new(store.clone(), &fixture.config(50))
            .with_fetcher(DirFetcher::new(fixture.source.path()));

        importer.import_repository(project.id, "https://example.com/r.git").await?;
        let first = store.list_files(project.id).await?;
        importer.import_repository(project.id, "https://example.com/r.git").await?;
        let second = store.list_files(project.id).await?;
        assert_eq!(sorted_paths(&first), sorted_paths(&second));
        assert_eq!(second.len(), 2);

        fs::remove_file(fixture.source.path().join("gone.rs"))?;
        importer.import_repository(project.id, "https://example.com/r.git").await?;
        assert_eq!(sorted_paths(&store.list_files(project.id).await?), vec!["keep.rs"]);
        Ok(())
    }

    #[test]
    fn test_summary_buckets_add_up() {
        let mut summary = ImportSummary::default();
        for outcome in [
            FileOutcome::Imported,
            FileOutcome::Skipped(SkipReason::Binary),
            FileOutcome::Skipped(SkipReason::TooLarge { size: 10 }),
            FileOutcome::Skipped(SkipReason::Unreadable {
                message: "denied".into(),
            }),
            FileOutcome::Imported,
        ] {
            summary.record(&outcome);
        }
        assert_eq!(summary.files_imported, 2);
        assert_eq!(summary.files_skipped, 3);
        assert_eq!(
            summary.files_skipped,
            summary.skipped_too_large + summary.skipped_binary + summary.skipped_unreadable
        );
    }
}
