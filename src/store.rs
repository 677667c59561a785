//! Task store seam.
//!
//! The board and the CLI talk to the authoritative store through these async
//! traits. `LocalStore` serves them from a JSON database on disk; the REST
//! client in `client.rs` serves them from a remote `tb serve`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::project::{NewProject, ProjectPatch, ProjectSummary};
use crate::task::*;

/// Task queries and mutations. This is the only part the board needs.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage>;
    async fn get_task(&self, id: u64) -> Result<TaskDetail>;
    async fn create_task(&self, new: NewTask) -> Result<Task>;
    async fn update_task(&self, id: u64, patch: TaskPatch) -> Result<Task>;
    async fn delete_task(&self, id: u64) -> Result<()>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn list_notes(&self, task_id: u64) -> Result<Vec<TaskNote>>;
    async fn add_note(&self, task_id: u64, text: String) -> Result<TaskNote>;
    async fn delete_note(&self, note_id: u64) -> Result<()>;
}

#[async_trait]
pub trait TimeEntryStore: Send + Sync {
    async fn list_time_entries(&self, task_id: u64) -> Result<TimeSheet>;
    async fn add_time_entry(&self, task_id: u64, input: TimeEntryInput) -> Result<TimeEntry>;
    async fn update_time_entry(&self, entry_id: u64, input: TimeEntryInput) -> Result<TimeEntry>;
    async fn delete_time_entry(&self, entry_id: u64) -> Result<()>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>>;
    async fn get_project(&self, id: u64) -> Result<ProjectSummary>;
    async fn create_project(&self, new: NewProject) -> Result<ProjectSummary>;
    async fn update_project(&self, id: u64, patch: ProjectPatch) -> Result<ProjectSummary>;
    async fn delete_project(&self, id: u64) -> Result<()>;
}

/// Everything a front end needs from a store.
pub trait Backend: TaskStore + NoteStore + TimeEntryStore + ProjectStore {}

impl<T: TaskStore + NoteStore + TimeEntryStore + ProjectStore> Backend for T {}

/// Store over a shared in-process `Database`, optionally persisted after every mutation.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or start) the database file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = Database::load(&path)?;
        debug!(path = %path.display(), tasks = db.tasks.len(), "opened task database");
        Ok(LocalStore {
            db: Arc::new(Mutex::new(db)),
            path: Some(path),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(db: Database) -> Self {
        LocalStore {
            db: Arc::new(Mutex::new(db)),
            path: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        // A panic while holding the lock leaves the database as consistent as
        // its last completed operation.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        f(&self.lock())
    }

    /// Run a mutation and persist the result. On a failed save the in-memory
    /// change is reverted so memory and disk agree.
    ///
    /// Disk-backed writes run on the blocking pool.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
    {
        if self.path.is_none() {
            return f(&mut self.lock());
        }
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write_blocking(f))
            .await
            .map_err(|e| Error::Io(format!("store write did not finish: {e}")))?
    }

    fn write_blocking<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut db = self.lock();
        let Some(path) = &self.path else {
            return f(&mut db);
        };
        let before = db.clone();
        let value = f(&mut db)?;
        if let Err(e) = db.save(path) {
            *db = before;
            return Err(e);
        }
        Ok(value)
    }
}

#[async_trait]
impl TaskStore for LocalStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage> {
        self.read(|db| Ok(db.list_tasks(filter)))
    }

    async fn get_task(&self, id: u64) -> Result<TaskDetail> {
        self.read(|db| db.task_detail(id))
    }

    async fn create_task(&self, new: NewTask) -> Result<Task> {
        self.write(move |db| db.create_task(new)).await
    }

    async fn update_task(&self, id: u64, patch: TaskPatch) -> Result<Task> {
        self.write(move |db| db.update_task(id, patch)).await
    }

    async fn delete_task(&self, id: u64) -> Result<()> {
        self.write(move |db| db.delete_task(id)).await
    }
}

#[async_trait]
impl NoteStore for LocalStore {
    async fn list_notes(&self, task_id: u64) -> Result<Vec<TaskNote>> {
        self.read(|db| Ok(db.notes_for(task_id)))
    }

    async fn add_note(&self, task_id: u64, text: String) -> Result<TaskNote> {
        self.write(move |db| db.add_note(task_id, &text)).await
    }

    async fn delete_note(&self, note_id: u64) -> Result<()> {
        self.write(move |db| db.delete_note(note_id)).await
    }
}

#[async_trait]
impl TimeEntryStore for LocalStore {
    async fn list_time_entries(&self, task_id: u64) -> Result<TimeSheet> {
        self.read(|db| Ok(db.time_sheet(task_id)))
    }

    async fn add_time_entry(&self, task_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        self.write(move |db| db.add_time_entry(task_id, input)).await
    }

    async fn update_time_entry(&self, entry_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        self.write(move |db| db.update_time_entry(entry_id, input)).await
    }

    async fn delete_time_entry(&self, entry_id: u64) -> Result<()> {
        self.write(move |db| db.delete_time_entry(entry_id)).await
    }
}

#[async_trait]
impl ProjectStore for LocalStore {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.read(|db| Ok(db.list_projects()))
    }

    async fn get_project(&self, id: u64) -> Result<ProjectSummary> {
        self.read(|db| db.project_summary(id))
    }

    async fn create_project(&self, new: NewProject) -> Result<ProjectSummary> {
        self.write(move |db| db.create_project(new)).await
    }

    async fn update_project(&self, id: u64, patch: ProjectPatch) -> Result<ProjectSummary> {
        self.write(move |db| db.update_project(id, patch)).await
    }

    async fn delete_project(&self, id: u64) -> Result<()> {
        self.write(move |db| db.delete_project(id)).await
    }
}
