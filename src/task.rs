//! Task data structures and their request/response shapes.
//!
//! This module defines the core `Task` record, its notes and time entries, and
//! the input types used to create, patch and query tasks. Stored records use
//! snake_case field names on the wire; request bodies and query strings use
//! camelCase, matching the admin panel's REST conventions.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::fields::*;

/// Default page size for task listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size a listing will honour.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Spacing between neighbouring `order` values in a freshly laid out column.
pub const ORDER_STEP: f64 = 1024.0;

/// A single work item on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub project_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub assignee_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// Position key within the task's status column.
    #[serde(default)]
    pub order: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Column ordering: `order` ascending, ties broken by creation time, then id.
    pub fn position_cmp(&self, other: &Task) -> Ordering {
        self.order
            .total_cmp(&other.order)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "project_id", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(default, alias = "parent_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, alias = "due_date", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, alias = "assignee_id", skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a task. Absent fields are left untouched; nullable
/// fields are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(default, alias = "assignee_id", skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, alias = "due_date", skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, alias = "project_id", skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub project_id: Option<Option<u64>>,
    #[serde(default, alias = "parent_id", skip_serializing_if = "Option::is_none", deserialize_with = "double_option")]
    pub parent_id: Option<Option<u64>>,
}

impl TaskPatch {
    /// Patch that places a task at `order` within the `status` column.
    pub fn position(status: Status, order: f64) -> Self {
        TaskPatch {
            status: Some(status),
            order: Some(order),
            ..Default::default()
        }
    }

    pub fn status(status: Status) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query parameters for task listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

impl TaskFilter {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_tasks: u64,
}

/// One page of a task listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNote {
    pub id: u64,
    pub task_id: u64,
    #[serde(rename = "note_text")]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    #[serde(default, rename = "note_text", alias = "noteText")]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    pub task_id: u64,
    pub hours: f64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a time-entry create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntryInput {
    pub hours: f64,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Time entries of one task with their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSheet {
    pub time_entries: Vec<TimeEntry>,
    pub total_hours: f64,
}

/// A task with everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub task: Task,
    pub notes: Vec<TaskNote>,
    pub children: Vec<Task>,
    pub time_entries: Vec<TimeEntry>,
    pub total_hours: f64,
}
