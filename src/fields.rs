//! Enumerations and field types for task management.
//!
//! This module defines the structured values used to categorise tasks and
//! projects, together with the sort options accepted by task listings.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Task workflow status. Each status is one column of the board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[serde(alias = "open")]
    Todo,
    #[value(alias = "in_progress")]
    #[serde(alias = "in-progress")]
    InProgress,
    Done,
}

impl Status {
    /// All statuses in board column order.
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    /// Zero-based column index of this status.
    pub fn index(self) -> usize {
        match self {
            Status::Todo => 0,
            Status::InProgress => 1,
            Status::Done => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Status> {
        Status::ALL.get(index).copied()
    }

    /// Wire name, as used in query strings and JSON bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    #[default]
    Active,
    #[value(alias = "on_hold")]
    #[serde(alias = "on-hold")]
    OnHold,
    Completed,
    Archived,
}

/// Available sorting keys for task listings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    #[serde(alias = "createdAt")]
    CreatedAt,
    Title,
    Order,
    #[serde(alias = "dueDate")]
    DueDate,
}

/// Sort direction for task listings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}
