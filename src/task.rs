//! Task aggregate and related records.
//!
//! This module defines the core `Task` struct together with its owned
//! children (checklist entries, comments, the append-only history log)
//! and the reusable `Template` blueprint tasks can be created from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::{Priority, ReviewResult, TaskState};

/// A unit of work owned by exactly one assignee, governed by the
/// workflow engine from creation through completion or cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    /// Human-readable sequential code derived from the category ("VEN-0007").
    pub code: String,
    pub title: String,
    pub body: Option<String>,
    pub priority: Priority,
    pub state: TaskState,
    /// When true, the task must pass the review gate before completing.
    pub requires_review: bool,
    pub scheduled: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub category_id: Option<u64>,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    pub assignee: String,
    pub assignee_name: String,
    pub created_by: String,
    pub created_by_name: String,
    /// Template this task was instantiated from, kept for provenance.
    #[serde(default)]
    pub template_id: Option<u64>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Counter backing subtask ids; subtasks are never renumbered.
    #[serde(default)]
    pub next_subtask_id: u64,
    pub review_result: Option<ReviewResult>,
    pub reviewed_by: Option<String>,
    pub review_comment: Option<String>,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
    pub completed_at_utc: Option<i64>,
    pub reviewed_at_utc: Option<i64>,
}

impl Task {
    /// Look up a subtask by id.
    pub fn subtask(&self, subtask_id: u64) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == subtask_id)
    }

    /// Progress over the checklist as (done, total).
    pub fn checklist_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.completed).count();
        (done, self.subtasks.len())
    }
}

/// A checklist item belonging to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub completed_at_utc: Option<i64>,
}

/// A comment on a task. Append-only: there is no edit or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub author_name: String,
    pub content: String,
    pub at_utc: i64,
}

/// An audit record, written automatically on creation and on every
/// effective mutation. Never written for no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub description: String,
    pub actor: String,
    pub actor_name: String,
    pub at_utc: i64,
}

/// A reusable blueprint for creating tasks with predefined values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub name: String,
    /// Unique short code, compared case-insensitively.
    pub code: String,
    pub description: Option<String>,
    pub title: String,
    pub body: Option<String>,
    pub category_id: Option<u64>,
    pub priority: Priority,
    /// Due date offset applied at instantiation: due = today + N days.
    pub days_to_due: Option<i64>,
    /// Predefined checklist titles copied into every instantiated task.
    #[serde(default)]
    pub subtasks: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    /// Marks the template for recurring re-instantiation by an external
    /// trigger; the store itself only exposes `instantiate`.
    #[serde(default)]
    pub permanent: bool,
    /// Incremented on every instantiation, not on mere lookup.
    #[serde(default)]
    pub times_used: u64,
    pub created_at_utc: i64,
}

/// A category label. Soft-deactivated, never removed while referenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    /// Short code used as the task-code prefix ("VEN" -> "VEN-0007").
    pub code: Option<String>,
    pub color: Option<String>,
    pub active: bool,
}

/// A free-form tag label. Same soft-deactivation rules as categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub color: Option<String>,
    pub active: bool,
}
