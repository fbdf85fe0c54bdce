use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{FileRow, NewFile, Project, ProjectId, ProjectStore, StoreResult};

#[derive(Default)]
struct Tables {
    projects: BTreeMap<ProjectId, Project>,
    files: Vec<FileRow>,
    next_project_id: i64,
    next_file_id: i64,
}

/// Process-local store with the same per-call atomicity as Postgres
#[derive(Default)]
pub struct MemoryProjectStore {
    tables: Mutex<Tables>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn find_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.tables.lock().projects.get(&id).cloned())
    }

    async fn delete_files_for_project(&self, id: ProjectId) -> StoreResult<u64> {
        let mut tables = self.tables.lock();
        let before = tables.files.len();
        tables.files.retain(|file| file.project_id != id);
        Ok((before - tables.files.len()) as u64)
    }

    async fn insert_files(&self, batch: &[NewFile]) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        for file in batch {
            tables.next_file_id += 1;
            let id = tables.next_file_id;
            tables.files.push(FileRow {
                id,
                project_id: file.project_id,
                path: file.path.clone(),
                content: Some(file.content.clone()),
                language: Some(file.language.clone()),
            });
        }
        Ok(())
    }

    async fn update_project_repo_url(&self, id: ProjectId, url: &str) -> StoreResult<()> {
        if let Some(project) = self.tables.lock().projects.get_mut(&id) {
            project.repo_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn create_project(&self, name: &str) -> StoreResult<Project> {
        let mut tables = self.tables.lock();
        tables.next_project_id += 1;
        let project = Project {
            id: ProjectId(tables.next_project_id),
            name: name.to_string(),
            repo_url: None,
            created_at: Utc::now(),
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        Ok(self.tables.lock().projects.values().cloned().collect())
    }

    async fn list_files(&self, id: ProjectId) -> StoreResult<Vec<FileRow>> {
        Ok(self
            .tables
            .lock()
            .files
            .iter()
            .filter(|file| file.project_id == id)
            .cloned()
            .collect())
    }
}
