//! Enumerations and field types for the task engine.
//!
//! This module defines the closed vocabularies used across the crate:
//! lifecycle states, priorities, actor roles, review outcomes, and the
//! filtering/sorting options exposed by the list command.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// `Completada` and `Cancelada` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pendiente,
    EnProgreso,
    EnRevision,
    Completada,
    Cancelada,
}

impl TaskState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completada | TaskState::Cancelada)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(format_state(*self))
    }
}

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgente,
    Alta,
    Media,
    Baja,
}

impl Priority {
    /// Sort rank, most pressing first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgente => 0,
            Priority::Alta => 1,
            Priority::Media => 2,
            Priority::Baja => 3,
        }
    }
}

/// Role of an acting identity, as resolved from the roster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Admins and super-admins share every elevated permission.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Outcome recorded by the review gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResult {
    Aprobada,
    Rechazada,
}

/// Available sorting options for task lists.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortKey {
    Due,
    Priority,
    Id,
}

/// Filtering options for tasks based on due dates.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DueFilter {
    Today,
    ThisWeek,
    Overdue,
    None,
}

/// Format a task state for display.
pub fn format_state(s: TaskState) -> &'static str {
    match s {
        TaskState::Pendiente => "pendiente",
        TaskState::EnProgreso => "en progreso",
        TaskState::EnRevision => "en revisión",
        TaskState::Completada => "completada",
        TaskState::Cancelada => "cancelada",
    }
}

/// Format a priority for display.
pub fn format_priority(p: Priority) -> &'static str {
    match p {
        Priority::Urgente => "urgente",
        Priority::Alta => "alta",
        Priority::Media => "media",
        Priority::Baja => "baja",
    }
}

/// Format a review outcome for display.
pub fn format_review(r: ReviewResult) -> &'static str {
    match r {
        ReviewResult::Aprobada => "aprobada",
        ReviewResult::Rechazada => "rechazada",
    }
}
