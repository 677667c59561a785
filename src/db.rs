//! Database operations and utility functions for task management.
//!
//! This module provides the `Database` struct, the authoritative record of
//! tasks, notes, time entries and projects. All validation and cascade rules of
//! the task store live here so that every front end (local CLI, REST server)
//! enforces the same invariants. It also carries the small formatting helpers
//! shared by the CLI tables and the board.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fields::*;
use crate::project::{NewProject, Project, ProjectPatch, ProjectSummary};
use crate::task::*;

/// In-memory database for storing and managing tasks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub notes: Vec<TaskNote>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// High-water mark of issued ids; ids are never reused after a delete.
    #[serde(default)]
    last_id: u64,
}

impl Database {
    /// Load database from JSON file, creating a new empty database if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Database::default());
        }
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        if buf.trim().is_empty() {
            return Ok(Database::default());
        }
        Ok(serde_json::from_str(&buf)?)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Generate the next available record ID.
    fn next_id(&mut self) -> u64 {
        let seen = self
            .tasks
            .iter()
            .map(|t| t.id)
            .chain(self.notes.iter().map(|n| n.id))
            .chain(self.time_entries.iter().map(|e| e.id))
            .chain(self.projects.iter().map(|p| p.id))
            .max()
            .unwrap_or(0);
        self.last_id = self.last_id.max(seen) + 1;
        self.last_id
    }

    /// Get a task by ID.
    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a mutable reference to a task by ID.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn project(&self, id: u64) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Order value one step past the current end of a status column.
    fn next_order(&self, status: Status) -> f64 {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.order)
            .fold(None, |acc: Option<f64>, o| Some(acc.map_or(o, |a| a.max(o))))
            .map_or(ORDER_STEP, |max| max + ORDER_STEP)
    }

    /// Enforce the one-level hierarchy for `child` (None while creating) under `parent_id`.
    fn check_parent(&self, child: Option<u64>, parent_id: u64) -> Result<()> {
        if child == Some(parent_id) {
            return Err(Error::validation("a task cannot be its own parent"));
        }
        let Some(parent) = self.get(parent_id) else {
            return Err(Error::validation(format!("parent task {parent_id} does not exist")));
        };
        if parent.parent_id.is_some() {
            return Err(Error::validation(format!(
                "task {parent_id} is already a subtask; nesting is one level deep"
            )));
        }
        if let Some(child) = child {
            if self.tasks.iter().any(|t| t.parent_id == Some(child)) {
                return Err(Error::validation(format!(
                    "task {child} has subtasks and cannot become a subtask"
                )));
            }
        }
        Ok(())
    }

    fn check_project(&self, project_id: u64) -> Result<()> {
        if self.project(project_id).is_none() {
            return Err(Error::validation(format!("project {project_id} does not exist")));
        }
        Ok(())
    }

    /// List root tasks matching the filter, one page at a time.
    pub fn list_tasks(&self, filter: &TaskFilter) -> TaskPage {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.parent_id.is_none())
            .filter(|t| filter.project_id.map_or(true, |p| t.project_id == Some(p)))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.priority.map_or(true, |p| t.priority == p))
            .filter(|t| {
                filter
                    .assignee_id
                    .as_deref()
                    .map_or(true, |a| t.assignee_id.as_deref() == Some(a))
            })
            .filter(|t| {
                needle.as_deref().map_or(true, |n| {
                    t.title.to_lowercase().contains(n)
                        || t.description.as_deref().is_some_and(|d| d.to_lowercase().contains(n))
                })
            })
            .collect();

        let sort_by = filter.sort_by.unwrap_or_default();
        rows.sort_by(|a, b| {
            let ord = match sort_by {
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
                SortKey::Order => a.position_cmp(b),
                SortKey::DueDate => a.due_date.cmp(&b.due_date),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });
        if filter.sort_order.unwrap_or_default() == SortOrder::Desc {
            rows.reverse();
        }

        let page = filter.page();
        let limit = filter.limit();
        let total = rows.len() as u64;
        let total_pages = total.div_ceil(u64::from(limit)).max(1) as u32;
        let skip = (page as usize - 1) * limit as usize;
        let tasks = rows.into_iter().skip(skip).take(limit as usize).cloned().collect();

        TaskPage {
            tasks,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_tasks: total,
            },
        }
    }

    /// A task together with its notes, subtasks and logged time.
    pub fn task_detail(&self, id: u64) -> Result<TaskDetail> {
        let task = self.get(id).cloned().ok_or_else(|| Error::not_found("task", id))?;
        let mut children: Vec<Task> =
            self.tasks.iter().filter(|t| t.parent_id == Some(id)).cloned().collect();
        children.sort_by(|a, b| a.position_cmp(b));
        let sheet = self.time_sheet(id);
        Ok(TaskDetail {
            task,
            notes: self.notes_for(id),
            children,
            time_entries: sheet.time_entries,
            total_hours: sheet.total_hours,
        })
    }

    pub fn create_task(&mut self, new: NewTask) -> Result<Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::validation("title is required"));
        }
        if let Some(pid) = new.parent_id {
            self.check_parent(None, pid)?;
        }
        if let Some(pid) = new.project_id {
            self.check_project(pid)?;
        }
        let order = match new.order {
            Some(o) if !o.is_finite() => return Err(Error::validation("order must be a finite number")),
            Some(o) => o,
            None => self.next_order(new.status.unwrap_or(Status::Todo)),
        };

        let now = Utc::now();
        let task = Task {
            id: self.next_id(),
            title: title.to_string(),
            description: clean(new.description),
            status: new.status.unwrap_or(Status::Todo),
            priority: new.priority.unwrap_or_default(),
            project_id: new.project_id,
            parent_id: new.parent_id,
            assignee_id: clean(new.assignee_id),
            due_date: new.due_date,
            order,
            created_at: now,
            updated_at: now,
        };
        self.tasks.push(task.clone());
        Ok(task)
    }

    /// Merge the supplied fields into a task. Nothing is written unless every field validates.
    pub fn update_task(&mut self, id: u64, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::validation("no fields to update"));
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(Error::validation("title cannot be empty"));
            }
        }
        if patch.order.is_some_and(|o| !o.is_finite()) {
            return Err(Error::validation("order must be a finite number"));
        }
        let current = self.get(id).ok_or_else(|| Error::not_found("task", id))?;
        let status_changed = patch.status.is_some_and(|s| s != current.status);
        if let Some(Some(pid)) = patch.parent_id {
            self.check_parent(Some(id), pid)?;
        }
        if let Some(Some(pid)) = patch.project_id {
            self.check_project(pid)?;
        }
        // A status change without an explicit position lands at the end of the new column.
        let appended = match (status_changed, patch.order, patch.status) {
            (true, None, Some(status)) => Some(self.next_order(status)),
            _ => None,
        };

        let Some(t) = self.get_mut(id) else {
            return Err(Error::not_found("task", id));
        };
        if let Some(title) = patch.title {
            t.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            t.description = clean(description);
        }
        if let Some(status) = patch.status {
            t.status = status;
        }
        if let Some(priority) = patch.priority {
            t.priority = priority;
        }
        if let Some(order) = patch.order.or(appended) {
            t.order = order;
        }
        if let Some(assignee) = patch.assignee_id {
            t.assignee_id = clean(assignee);
        }
        if let Some(due) = patch.due_date {
            t.due_date = due;
        }
        if let Some(project) = patch.project_id {
            t.project_id = project;
        }
        if let Some(parent) = patch.parent_id {
            t.parent_id = parent;
        }
        t.updated_at = Utc::now();
        Ok(t.clone())
    }

    /// Delete a task, cascading into its notes and time entries and detaching its subtasks.
    pub fn delete_task(&mut self, id: u64) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::not_found("task", id));
        }
        self.tasks.retain(|t| t.id != id);
        self.notes.retain(|n| n.task_id != id);
        self.time_entries.retain(|e| e.task_id != id);
        let now = Utc::now();
        for t in self.tasks.iter_mut() {
            if t.parent_id == Some(id) {
                t.parent_id = None;
                t.updated_at = now;
            }
        }
        Ok(())
    }

    /// Notes of a task, newest first.
    pub fn notes_for(&self, task_id: u64) -> Vec<TaskNote> {
        let mut notes: Vec<TaskNote> =
            self.notes.iter().filter(|n| n.task_id == task_id).cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        notes
    }

    pub fn add_note(&mut self, task_id: u64, text: &str) -> Result<TaskNote> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("note text is required"));
        }
        if self.get(task_id).is_none() {
            return Err(Error::not_found("task", task_id));
        }
        let note = TaskNote {
            id: self.next_id(),
            task_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.notes.push(note.clone());
        Ok(note)
    }

    pub fn delete_note(&mut self, note_id: u64) -> Result<()> {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != note_id);
        if self.notes.len() == before {
            return Err(Error::not_found("note", note_id));
        }
        Ok(())
    }

    /// Time entries of a task, newest date first, with their total.
    pub fn time_sheet(&self, task_id: u64) -> TimeSheet {
        let mut entries: Vec<TimeEntry> =
            self.time_entries.iter().filter(|e| e.task_id == task_id).cloned().collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        let total_hours = entries.iter().map(|e| e.hours).sum();
        TimeSheet {
            time_entries: entries,
            total_hours,
        }
    }

    pub fn add_time_entry(&mut self, task_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        check_hours(input.hours)?;
        if self.get(task_id).is_none() {
            return Err(Error::not_found("task", task_id));
        }
        let now = Utc::now();
        let entry = TimeEntry {
            id: self.next_id(),
            task_id,
            hours: input.hours,
            date: input.date,
            description: clean(input.description),
            created_at: now,
            updated_at: now,
        };
        self.time_entries.push(entry.clone());
        Ok(entry)
    }

    pub fn update_time_entry(&mut self, entry_id: u64, input: TimeEntryInput) -> Result<TimeEntry> {
        check_hours(input.hours)?;
        let Some(entry) = self.time_entries.iter_mut().find(|e| e.id == entry_id) else {
            return Err(Error::not_found("time entry", entry_id));
        };
        entry.hours = input.hours;
        entry.date = input.date;
        entry.description = clean(input.description);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn delete_time_entry(&mut self, entry_id: u64) -> Result<()> {
        let before = self.time_entries.len();
        self.time_entries.retain(|e| e.id != entry_id);
        if self.time_entries.len() == before {
            return Err(Error::not_found("time entry", entry_id));
        }
        Ok(())
    }

    fn summarise(&self, project: &Project) -> ProjectSummary {
        let owned = self.tasks.iter().filter(|t| t.project_id == Some(project.id));
        let (task_count, completed_count) = owned.fold((0, 0), |(all, done), t| {
            (all + 1, done + usize::from(t.status == Status::Done))
        });
        ProjectSummary {
            project: project.clone(),
            task_count,
            completed_count,
        }
    }

    /// Projects sorted by name, with derived task counts.
    pub fn list_projects(&self) -> Vec<ProjectSummary> {
        let mut projects: Vec<ProjectSummary> = self.projects.iter().map(|p| self.summarise(p)).collect();
        projects.sort_by(|a, b| {
            a.project
                .name
                .to_lowercase()
                .cmp(&b.project.name.to_lowercase())
                .then_with(|| a.project.id.cmp(&b.project.id))
        });
        projects
    }

    pub fn project_summary(&self, id: u64) -> Result<ProjectSummary> {
        self.project(id)
            .map(|p| self.summarise(p))
            .ok_or_else(|| Error::not_found("project", id))
    }

    pub fn create_project(&mut self, new: NewProject) -> Result<ProjectSummary> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::validation("project name is required"));
        }
        let now = Utc::now();
        let project = Project {
            id: self.next_id(),
            name: name.to_string(),
            description: clean(new.description),
            status: new.status.unwrap_or_default(),
            start_date: new.start_date,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };
        self.projects.push(project.clone());
        Ok(self.summarise(&project))
    }

    pub fn update_project(&mut self, id: u64, patch: ProjectPatch) -> Result<ProjectSummary> {
        if patch.is_empty() {
            return Err(Error::validation("no fields to update"));
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::validation("project name cannot be empty"));
        }
        let Some(p) = self.projects.iter_mut().find(|p| p.id == id) else {
            return Err(Error::not_found("project", id));
        };
        if let Some(name) = patch.name {
            p.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            p.description = clean(description);
        }
        if let Some(status) = patch.status {
            p.status = status;
        }
        if let Some(start) = patch.start_date {
            p.start_date = start;
        }
        if let Some(due) = patch.due_date {
            p.due_date = due;
        }
        p.updated_at = Utc::now();
        let project = p.clone();
        Ok(self.summarise(&project))
    }

    /// Delete a project. Refused while any task still references it.
    pub fn delete_project(&mut self, id: u64) -> Result<()> {
        let summary = self.project_summary(id)?;
        if summary.task_count > 0 {
            return Err(Error::validation(format!(
                "project {id} still owns {} task(s)",
                summary.task_count
            )));
        }
        self.projects.retain(|p| p.id != id);
        Ok(())
    }
}

fn check_hours(hours: f64) -> Result<()> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(Error::validation("hours must be greater than zero"));
    }
    Ok(())
}

/// Trim optional free text, treating blank input as absent.
fn clean(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = (d - today).num_days();
            if delta == 0 {
                "today".into()
            } else if delta == 1 {
                "tomorrow".into()
            } else if delta > 1 {
                format!("in {delta}d")
            } else {
                format!("{}d late", -delta)
            }
        }
    }
}

/// Parse a due date: YYYY-MM-DD, "today", "tomorrow", "in Nd" or "in Nw".
pub fn parse_due_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }
    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(n) = rest.strip_suffix('d') {
            return n.trim().parse::<i64>().ok().map(|d| today + Duration::days(d));
        }
        if let Some(n) = rest.strip_suffix('w') {
            return n.trim().parse::<i64>().ok().map(|w| today + Duration::weeks(w));
        }
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Today's date in the local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Format a task status for display.
pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::Todo => "To Do",
        Status::InProgress => "In Progress",
        Status::Done => "Done",
    }
}

/// Format a priority for display.
pub fn format_priority(p: Priority) -> &'static str {
    match p {
        Priority::Low => "Low",
        Priority::Medium => "Medium",
        Priority::High => "High",
    }
}

pub fn format_project_status(s: ProjectStatus) -> &'static str {
    match s {
        ProjectStatus::Planning => "Planning",
        ProjectStatus::Active => "Active",
        ProjectStatus::OnHold => "On Hold",
        ProjectStatus::Completed => "Completed",
        ProjectStatus::Archived => "Archived",
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_due_input() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();
        assert_eq!(parse_due_input("Today", today), Some(today));
        assert_eq!(parse_due_input("tomorrow", today), NaiveDate::from_ymd_opt(2026, 2, 28));
        assert_eq!(parse_due_input("in 3d", today), NaiveDate::from_ymd_opt(2026, 3, 2));
        assert_eq!(parse_due_input("in 1w", today), NaiveDate::from_ymd_opt(2026, 3, 6));
        assert_eq!(parse_due_input("2026-12-24", today), NaiveDate::from_ymd_opt(2026, 12, 24));
        assert_eq!(parse_due_input("someday", today), None);
    }

    fn seeded() -> Database {
        let mut db = Database::default();
        for title in ["Photograph new filament spools", "Update shipping table", "Fix STL preview"] {
            db.create_task(NewTask::titled(title)).unwrap();
        }
        db
    }

    #[test]
    fn test_create_then_get_matches() {
        let mut db = Database::default();
        let created = db
            .create_task(NewTask {
                title: "  Refresh hero banner ".into(),
                description: Some("Use the autumn palette".into()),
                priority: Some(Priority::High),
                ..Default::default()
            })
            .unwrap();
        let detail = db.task_detail(created.id).unwrap();
        assert_eq!(detail.task.title, "Refresh hero banner");
        assert_eq!(detail.task.description, created.description);
        assert_eq!(detail.task.status, Status::Todo);
        assert_eq!(detail.task.priority, Priority::High);
        assert!(detail.notes.is_empty());
        assert_eq!(detail.total_hours, 0.0);
    }

    #[test]
    fn test_create_rejects_blank_title() {
        let mut db = seeded();
        for title in ["", "   ", "\t\n"] {
            let err = db.create_task(NewTask::titled(title)).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(db.tasks.len(), 3);
    }

    #[test]
    fn test_create_appends_to_column_end() {
        let db = seeded();
        let orders: Vec<f64> = db.tasks.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![ORDER_STEP, 2.0 * ORDER_STEP, 3.0 * ORDER_STEP]);
    }

    #[test]
    fn test_update_merges_only_supplied_fields() {
        let mut db = seeded();
        let before = db.get(2).cloned().unwrap();
        let patch = TaskPatch {
            assignee_id: Some(Some("mia".into())),
            ..Default::default()
        };
        let after = db.update_task(2, patch).unwrap();
        assert_eq!(after.assignee_id.as_deref(), Some("mia"));
        assert_eq!(after.title, before.title);
        assert_eq!(after.status, before.status);
        assert!(after.updated_at >= before.updated_at);

        let cleared = db
            .update_task(2, TaskPatch { assignee_id: Some(None), ..Default::default() })
            .unwrap();
        assert_eq!(cleared.assignee_id, None);
    }

    #[test]
    fn test_update_validation() {
        let mut db = seeded();
        let err = db.update_task(1, TaskPatch::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = db
            .update_task(1, TaskPatch { title: Some(" ".into()), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = db.update_task(99, TaskPatch::status(Status::Done)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = db
            .update_task(1, TaskPatch { order: Some(f64::NAN), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_status_update_is_idempotent() {
        let mut db = seeded();
        let first = db.update_task(1, TaskPatch::status(Status::Done)).unwrap();
        let second = db.update_task(1, TaskPatch::status(Status::Done)).unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.order, second.order);
        assert_eq!(first.title, second.title);
        assert_eq!(first.priority, second.priority);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn test_delete_cascades_notes_and_time() {
        let mut db = seeded();
        for text in ["call supplier", "photos uploaded", "waiting on copy"] {
            db.add_note(1, text).unwrap();
        }
        db.add_time_entry(
            1,
            TimeEntryInput { hours: 1.5, date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), description: None },
        )
        .unwrap();
        db.add_note(2, "unrelated").unwrap();

        db.delete_task(1).unwrap();
        assert!(db.notes_for(1).is_empty());
        assert!(db.time_sheet(1).time_entries.is_empty());
        assert_eq!(db.notes_for(2).len(), 1);
        assert!(matches!(db.task_detail(1), Err(Error::NotFound(_))));
        assert!(matches!(db.delete_task(1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_hierarchy_is_one_level() {
        let mut db = seeded();
        let child = db
            .create_task(NewTask { parent_id: Some(1), ..NewTask::titled("Crop photos") })
            .unwrap();
        let err = db
            .create_task(NewTask { parent_id: Some(child.id), ..NewTask::titled("Too deep") })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Task 1 has a child, so it cannot be nested itself.
        let err = db
            .update_task(1, TaskPatch { parent_id: Some(Some(2)), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = db
            .update_task(2, TaskPatch { parent_id: Some(Some(2)), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let detail = db.task_detail(1).unwrap();
        assert_eq!(detail.children.len(), 1);

        db.delete_task(1).unwrap();
        assert_eq!(db.get(child.id).unwrap().parent_id, None);
    }

    #[test]
    fn test_list_filters_and_pages() {
        let mut db = seeded();
        db.create_task(NewTask { parent_id: Some(1), ..NewTask::titled("subtask hidden") }).unwrap();
        db.update_task(2, TaskPatch::status(Status::Done)).unwrap();

        let page = db.list_tasks(&TaskFilter::default());
        assert_eq!(page.pagination.total_tasks, 3);
        assert_eq!(page.pagination.total_pages, 1);
        // Newest first by default.
        assert_eq!(page.tasks.first().unwrap().id, 3);

        let done = db.list_tasks(&TaskFilter { status: Some(Status::Done), ..Default::default() });
        assert_eq!(done.tasks.len(), 1);
        assert_eq!(done.tasks[0].id, 2);

        let search = db.list_tasks(&TaskFilter { search: Some("stl".into()), ..Default::default() });
        assert_eq!(search.tasks.len(), 1);

        let paged = db.list_tasks(&TaskFilter {
            limit: Some(2),
            page: Some(2),
            sort_by: Some(SortKey::Title),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        });
        assert_eq!(paged.pagination.total_pages, 2);
        assert_eq!(paged.pagination.current_page, 2);
        assert_eq!(paged.tasks.len(), 1);
        assert_eq!(paged.tasks[0].title, "Update shipping table");
    }

    #[test]
    fn test_time_entries_require_positive_hours() {
        let mut db = seeded();
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        for hours in [0.0, -2.0, f64::INFINITY] {
            let err = db.add_time_entry(1, TimeEntryInput { hours, date, description: None }).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        let entry = db.add_time_entry(1, TimeEntryInput { hours: 2.0, date, description: None }).unwrap();
        db.add_time_entry(1, TimeEntryInput { hours: 0.5, date, description: Some("review".into()) }).unwrap();
        assert_eq!(db.time_sheet(1).total_hours, 2.5);

        let err = db.update_time_entry(entry.id, TimeEntryInput { hours: 0.0, date, description: None });
        assert!(matches!(err, Err(Error::Validation(_))));
        db.update_time_entry(entry.id, TimeEntryInput { hours: 3.0, date, description: None }).unwrap();
        assert_eq!(db.time_sheet(1).total_hours, 3.5);
        db.delete_time_entry(entry.id).unwrap();
        assert_eq!(db.time_sheet(1).total_hours, 0.5);
    }

    #[test]
    fn test_project_delete_refused_while_owning_tasks() {
        let mut db = Database::default();
        let project = db.create_project(NewProject { name: "Launch".into(), ..Default::default() }).unwrap();
        let id = project.project.id;
        let task = db
            .create_task(NewTask { project_id: Some(id), ..NewTask::titled("Landing page") })
            .unwrap();
        db.update_task(task.id, TaskPatch::status(Status::Done)).unwrap();

        let summary = db.project_summary(id).unwrap();
        assert_eq!((summary.task_count, summary.completed_count), (1, 1));

        assert!(matches!(db.delete_project(id), Err(Error::Validation(_))));
        assert!(db.project_summary(id).is_ok());

        db.delete_task(task.id).unwrap();
        db.delete_project(id).unwrap();
        assert!(matches!(db.project_summary(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unknown_project_rejected() {
        let mut db = Database::default();
        let err = db
            .create_task(NewTask { project_id: Some(42), ..NewTask::titled("Orphan") })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(db.tasks.is_empty());
    }

    #[test]
    fn test_delete_detaches_only_its_subtasks() {
        let mut db = seeded();
        let orphan = db.create_task(NewTask { parent_id: Some(1), ..NewTask::titled("Crop photos") }).unwrap();
        let kept = db.create_task(NewTask { parent_id: Some(2), ..NewTask::titled("Print labels") }).unwrap();

        db.delete_task(1).unwrap();
        assert_eq!(db.get(orphan.id).unwrap().parent_id, None);
        assert_eq!(db.get(kept.id).unwrap().parent_id, Some(2));
    }

    #[test]
    fn test_project_update_clears_nullable_fields() {
        let mut db = Database::default();
        let due = NaiveDate::from_ymd_opt(2026, 11, 30).unwrap();
        let created = db
            .create_project(NewProject {
                name: "Winter sale".into(),
                description: Some("Banners and mailers".into()),
                start_date: NaiveDate::from_ymd_opt(2026, 11, 1),
                due_date: Some(due),
                ..Default::default()
            })
            .unwrap();
        let id = created.project.id;

        let patch = ProjectPatch { description: Some(None), start_date: Some(None), ..Default::default() };
        let updated = db.update_project(id, patch).unwrap().project;
        assert_eq!(updated.description, None);
        assert_eq!(updated.start_date, None);
        assert_eq!(updated.due_date, Some(due));

        let moved = NaiveDate::from_ymd_opt(2026, 12, 15).unwrap();
        let patch = ProjectPatch { due_date: Some(Some(moved)), ..Default::default() };
        assert_eq!(db.update_project(id, patch).unwrap().project.due_date, Some(moved));
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut db = seeded();
        db.delete_task(3).unwrap();
        let next = db.create_task(NewTask::titled("New")).unwrap();
        assert_eq!(next.id, 4);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tasks.json");
        let mut db = seeded();
        db.add_note(1, "persist me").unwrap();
        db.save(&path).unwrap();

        let loaded = Database::load(&path).unwrap();
        assert_eq!(loaded.tasks, db.tasks);
        assert_eq!(loaded.notes, db.notes);
        assert!(Database::load(&dir.path().join("missing.json")).unwrap().tasks.is_empty());
    }

    #[test]
    fn test_format_helpers() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(today), today), "today");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2026, 1, 13), today), "in 3d");
        assert_eq!(format_due_relative(NaiveDate::from_ymd_opt(2026, 1, 8), today), "2d late");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 8), "a longe…");
    }
}
