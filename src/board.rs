//! Client-side cache of tasks partitioned into status columns.
//!
//! `Board` holds plain data: every task by id plus, per status, the ids in
//! column order. It knows how to compute an `order` key for a slot but makes
//! no store calls; `BoardController` owns it and drives it.

use std::collections::HashMap;

use crate::fields::Status;
use crate::task::{Task, ORDER_STEP};

/// Smallest gap between neighbouring orders before a column is respaced.
pub const MIN_ORDER_GAP: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    tasks: HashMap<u64, Task>,
    columns: [Vec<u64>; 3],
}

impl Board {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Board::default();
        board.replace_all(tasks);
        board
    }

    /// Drop the current contents and lay out `tasks` from scratch.
    pub fn replace_all(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.tasks = tasks.into_iter().map(|t| (t.id, t)).collect();
        for status in Status::ALL {
            self.rebuild_column(status);
        }
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Ids of one column, in display order.
    pub fn column(&self, status: Status) -> &[u64] {
        &self.columns[status.index()]
    }

    pub fn tasks_in(&self, status: Status) -> Vec<&Task> {
        self.column(status).iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    /// Column and index currently holding `id`.
    pub fn position_of(&self, id: u64) -> Option<(Status, usize)> {
        let status = self.tasks.get(&id)?.status;
        let index = self.column(status).iter().position(|&t| t == id)?;
        Some((status, index))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Insert or replace a task, moving it between columns if its status changed.
    pub fn upsert(&mut self, task: Task) {
        let status = task.status;
        if let Some(old) = self.tasks.insert(task.id, task) {
            if old.status != status {
                self.rebuild_column(old.status);
            }
        }
        self.rebuild_column(status);
    }

    pub fn remove(&mut self, id: u64) -> Option<Task> {
        let task = self.tasks.remove(&id)?;
        self.rebuild_column(task.status);
        Some(task)
    }

    /// Recompute one column's id list from the task records.
    pub fn rebuild_column(&mut self, status: Status) {
        let mut members: Vec<&Task> = self.tasks.values().filter(|t| t.status == status).collect();
        members.sort_by(|a, b| a.position_cmp(b));
        self.columns[status.index()] = members.into_iter().map(|t| t.id).collect();
    }

    /// Ids of `status` in order, leaving out `id`.
    fn siblings(&self, id: u64, status: Status) -> Vec<u64> {
        self.column(status).iter().copied().filter(|&t| t != id).collect()
    }

    /// Number of slots `id` can occupy in `status`, minus one.
    pub fn max_index(&self, id: u64, status: Status) -> usize {
        self.siblings(id, status).len()
    }

    /// Order key that puts `id` at `index` of `status` once it is placed there.
    ///
    /// Returns `None` when the neighbouring orders are closer than
    /// `MIN_ORDER_GAP`; the column has to be respaced first.
    pub fn order_for_slot(&self, id: u64, status: Status, index: usize) -> Option<f64> {
        let siblings = self.siblings(id, status);
        let index = index.min(siblings.len());
        let order_at = |i: usize| siblings.get(i).and_then(|s| self.tasks.get(s)).map(|t| t.order);
        let before = index.checked_sub(1).and_then(order_at);
        let after = order_at(index);
        match (before, after) {
            (None, None) => Some(ORDER_STEP),
            (Some(b), None) => Some(b + ORDER_STEP),
            (None, Some(a)) => Some(a - ORDER_STEP),
            (Some(b), Some(a)) if a - b < MIN_ORDER_GAP => None,
            (Some(b), Some(a)) => Some(b + (a - b) / 2.0),
        }
    }

    /// Evenly spaced orders for every task of `status` except `skip`, keeping
    /// their current sequence. Only entries whose order would change are returned.
    pub fn respaced(&self, status: Status, skip: u64) -> Vec<(u64, f64)> {
        self.siblings(skip, status)
            .into_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let order = (i + 1) as f64 * ORDER_STEP;
                let current = self.tasks.get(&id)?.order;
                (current != order).then_some((id, order))
            })
            .collect()
    }
}
