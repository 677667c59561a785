//! Column and card view models.
//!
//! Pure functions from the controller's cache to what the board draws. Nothing
//! here mutates the cache.

use chrono::NaiveDate;

use crate::controller::BoardController;
use crate::db::{format_due_relative, format_priority, format_status, truncate};
use crate::fields::{Priority, Status};
use crate::task::Task;

/// Width a card's description excerpt is cut to.
pub const EXCERPT_WIDTH: usize = 48;
pub const DRAG_HANDLE: &str = "⠿";
pub const EMPTY_COLUMN: &str = "No tasks";

#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub id: u64,
    pub title: String,
    pub excerpt: Option<String>,
    pub status: Status,
    pub status_label: &'static str,
    pub priority: Priority,
    pub priority_label: &'static str,
    pub due_label: Option<String>,
    pub overdue: bool,
    pub assignee_initials: Option<String>,
    pub handle: &'static str,
    /// A confirm for this task is still outstanding.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub status: Status,
    pub title: &'static str,
    pub count: usize,
    pub cards: Vec<CardView>,
    /// Set only when the column has no cards.
    pub empty_message: Option<&'static str>,
}

impl ColumnView {
    /// Drop-target identity of the column.
    pub fn drop_target(&self) -> Status {
        self.status
    }
}

/// First two characters of an assignee id, upper-cased.
pub fn initials(assignee: &str) -> Option<String> {
    let initials: String = assignee.trim().chars().take(2).flat_map(char::to_uppercase).collect();
    (!initials.is_empty()).then_some(initials)
}

pub fn card_view(task: &Task, pending: bool, today: NaiveDate) -> CardView {
    CardView {
        id: task.id,
        title: task.title.clone(),
        excerpt: task.description.as_deref().map(|d| truncate(d.trim(), EXCERPT_WIDTH)),
        status: task.status,
        status_label: format_status(task.status),
        priority: task.priority,
        priority_label: format_priority(task.priority),
        due_label: task.due_date.map(|d| format_due_relative(Some(d), today)),
        overdue: task.due_date.is_some_and(|d| d < today && task.status != Status::Done),
        assignee_initials: task.assignee_id.as_deref().and_then(initials),
        handle: DRAG_HANDLE,
        pending,
    }
}

/// Build a column from tasks already in display order.
pub fn column_view<'a>(
    status: Status,
    tasks: impl IntoIterator<Item = &'a Task>,
    is_pending: impl Fn(u64) -> bool,
    today: NaiveDate,
) -> ColumnView {
    let cards: Vec<CardView> = tasks
        .into_iter()
        .map(|t| card_view(t, is_pending(t.id), today))
        .collect();
    ColumnView {
        status,
        title: format_status(status),
        count: cards.len(),
        empty_message: cards.is_empty().then_some(EMPTY_COLUMN),
        cards,
    }
}

/// All three columns of the controller's board, left to right.
pub fn board_view(controller: &BoardController, today: NaiveDate) -> [ColumnView; 3] {
    Status::ALL.map(|status| {
        column_view(
            status,
            controller.board().tasks_in(status),
            |id| controller.is_pending(id),
            today,
        )
    })
}
