use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::{FileRow, NewFile, Project, ProjectId, ProjectStore, StoreError, StoreResult};
use crate::config::DatabaseConfig;

// Schema creation runs once per process no matter how many stores are opened.
static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        repo_url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id BIGSERIAL PRIMARY KEY,
        project_id BIGINT NOT NULL REFERENCES projects(id),
        path TEXT NOT NULL,
        content TEXT,
        language TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS files_project_id_idx ON files (project_id)",
];

/// Postgres-backed project store
#[derive(Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("no database URL configured".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        SCHEMA_READY
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                info!("Database schema initialized");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    #[instrument(skip(self))]
    async fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, repo_url, created_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_files_for_project(&self, id: ProjectId) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM files WHERE project_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(project_id = %id, deleted, "Deleted existing files");
        Ok(deleted)
    }

    #[instrument(skip(self, batch), fields(rows = batch.len()))]
    async fn insert_files(&self, batch: &[NewFile]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO files (project_id, path, content, language) ");
        builder.push_values(batch, |mut row, file| {
            row.push_bind(file.project_id)
                .push_bind(&file.path)
                .push_bind(&file.content)
                .push_bind(&file.language);
        });
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_project_repo_url(&self, id: ProjectId, url: &str) -> StoreResult<()> {
        sqlx::query("UPDATE projects SET repo_url = $2 WHERE id = $1")
            .bind(id)
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_project(&self, name: &str) -> StoreResult<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name)
            VALUES ($1)
            RETURNING id, name, repo_url, created_at
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, repo_url, created_at
            FROM projects
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_files(&self, id: ProjectId) -> StoreResult<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, project_id, path, content, language
            FROM files
            WHERE project_id = $1
            ORDER BY path, id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
