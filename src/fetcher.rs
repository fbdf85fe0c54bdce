//! Repository retrieval into project-scoped scratch directories

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::store::ProjectId;

/// How long an interrupted clone gets to notice the abort flag
const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid repository URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("clone task failed: {0}")]
    Task(String),
}

/// Project-scoped directory holding one fetched working tree
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    path: PathBuf,
}

impl ScratchSpace {
    pub fn for_project(base: &Path, project_id: ProjectId) -> Self {
        Self {
            path: base.join(format!("project-{project_id}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove whatever a previous attempt left behind and make sure the
    /// parent directory exists. The scratch path itself is left absent.
    pub async fn prepare(&self) -> io::Result<()> {
        match tokio::fs::symlink_metadata(&self.path).await {
            Ok(meta) => {
                warn!(path = %self.path.display(), "Removing stale scratch location");
                if meta.is_dir() {
                    tokio::fs::remove_dir_all(&self.path).await?;
                } else {
                    tokio::fs::remove_file(&self.path).await?;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Delete the scratch location. Failures are logged, never returned.
    pub async fn release(&self) {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Released scratch location"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove scratch location"
            ),
        }
    }
}

/// Retrieves a repository working tree into a local directory
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Materialize `url` at `dest`, which must not exist yet.
    ///
    /// Returns once the tree is complete, or with an error as soon as `cancel`
    /// fires or the transfer fails.
    async fn fetch(&self, url: &str, dest: &Path, cancel: CancellationToken)
        -> Result<(), FetchError>;
}

/// Clones with libgit2 on the blocking pool
#[derive(Debug, Clone)]
pub struct GitFetcher {
    timeout: Duration,
}

impl GitFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    #[instrument(skip(self, dest, cancel))]
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<(), FetchError> {
        validate_repository_url(url)?;

        info!(
            repository = %infer_repository_name(url),
            path = %dest.display(),
            "Cloning repository"
        );

        let abort = Arc::new(AtomicBool::new(false));
        let task_abort = Arc::clone(&abort);
        let git_url = url.to_string();
        let dest_path = dest.to_path_buf();

        let mut handle =
            task::spawn_blocking(move || clone_repository(&git_url, &dest_path, &task_abort));

        let interrupted = tokio::select! {
            joined = &mut handle => {
                return joined.unwrap_or_else(|err| Err(FetchError::Task(err.to_string())));
            }
            _ = cancel.cancelled() => FetchError::Cancelled,
            _ = tokio::time::sleep(self.timeout) => FetchError::TimedOut(self.timeout),
        };

        // Stop the transfer before the caller removes the scratch directory.
        abort.store(true, Ordering::SeqCst);
        wait_for_stopped_clone(handle, ABORT_GRACE, dest).await;
        Err(interrupted)
    }
}

/// Give an aborted clone `grace` to return. Returns false when it is still
/// running, in which case it may keep writing under `dest` after the caller
/// releases the scratch location.
async fn wait_for_stopped_clone<T>(handle: JoinHandle<T>, grace: Duration, dest: &Path) -> bool {
    match tokio::time::timeout(grace, handle).await {
        Ok(_) => true,
        Err(_) => {
            error!(
                path = %dest.display(),
                grace = ?grace,
                "Aborted clone still running; scratch cleanup may be incomplete"
            );
            false
        }
    }
}

fn clone_repository(url: &str, dest: &Path, abort: &AtomicBool) -> Result<(), FetchError> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(|_| !abort.load(Ordering::SeqCst));

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);

    builder
        .clone(url, dest)
        .map_err(|source| FetchError::Clone {
            url: url.to_string(),
            source,
        })?;

    debug!(repository = %url, path = %dest.display(), "Repository clone finished");
    Ok(())
}

/// Reject URLs no transport could handle, before any network activity
pub fn validate_repository_url(raw: &str) -> Result<(), FetchError> {
    let invalid = |reason: &str| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty URL"));
    }
    if is_scp_like(trimmed) {
        return Ok(());
    }

    let parsed = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    match parsed.scheme() {
        "file" => Ok(()),
        "http" | "https" | "ssh" | "git" => {
            if parsed.host_str().map_or(true, str::is_empty) {
                Err(invalid("missing host"))
            } else {
                Ok(())
            }
        }
        other => Err(invalid(&format!("unsupported scheme {other:?}"))),
    }
}

// `git@github.com:owner/repo.git`
fn is_scp_like(raw: &str) -> bool {
    match raw.split_once(':') {
        Some((user_host, path)) => {
            user_host.contains('@')
                && !user_host.contains('/')
                && !path.is_empty()
                && !path.starts_with("//")
        }
        None => false,
    }
}

/// Last path segment of a repository URL without `.git`, for log context
pub fn infer_repository_name(git_url: &str) -> String {
    let path = if let Ok(parsed) = Url::parse(git_url) {
        parsed.path().to_string()
    } else if let Some((_, path)) = git_url.split_once(':') {
        path.to_string()
    } else {
        git_url.to_string()
    };

    path.trim_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty())
        .next_back()
        .map(|seg| seg.trim_end_matches(".git").to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "repository".to_string())
}
