//! Project and file persistence
//!
//! The importer only talks to [`ProjectStore`]. Postgres backs it in
//! production; the in-memory store backs dry runs and tests.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod memory;
mod postgres;

pub use memory::MemoryProjectStore;
pub use postgres::PgProjectStore;

/// Store-assigned project identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ProjectId)
    }
}

/// Row in the `projects` table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub repo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row in the `files` table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FileRow {
    pub id: i64,
    pub project_id: ProjectId,
    pub path: String,
    pub content: Option<String>,
    pub language: Option<String>,
}

/// A staged file waiting to be flushed
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub project_id: ProjectId,
    pub path: String,
    pub content: String,
    pub language: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence operations the import pipeline depends on.
///
/// `delete_files_for_project` and each `insert_files` call are individually
/// atomic. Nothing spans calls.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    /// Remove every file row of a project, returning how many were removed
    async fn delete_files_for_project(&self, id: ProjectId) -> StoreResult<u64>;

    /// Insert and commit one batch
    async fn insert_files(&self, batch: &[NewFile]) -> StoreResult<()>;

    async fn update_project_repo_url(&self, id: ProjectId, url: &str) -> StoreResult<()>;

    async fn create_project(&self, name: &str) -> StoreResult<Project>;

    async fn list_projects(&self) -> StoreResult<Vec<Project>>;

    async fn list_files(&self, id: ProjectId) -> StoreResult<Vec<FileRow>>;
}
