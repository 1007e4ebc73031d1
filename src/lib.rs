//! # Tareas - Task Lifecycle & Assignment CLI
//!
//! A file-backed task manager for small retail/sales teams: every task
//! moves through a supervised lifecycle (pendiente → en progreso →
//! en revisión → completada, with cancellation reserved for admins),
//! carries its own checklist, comments and audit history, and can be
//! assigned to one worker or fanned out to every worker of a branch.
//!
//! ## Key Features
//!
//! - **Supervised lifecycle**: explicit state machine with an optional
//!   admin review gate before completion, compare-and-set preconditions
//!   on every transition, and a full audit history per task.
//! - **Branch fan-out**: one creation request becomes one independent
//!   task per worker of a branch, each with its own checklist and
//!   lifecycle; partial failures are reported target by target.
//! - **Templates**: reusable blueprints with predefined checklists, due
//!   date offsets, usage counters, and duplication.
//! - **Categories & tags**: soft-deactivated label registries with an
//!   idempotent stock seed and per-category task codes ("VEN-0007").
//! - **Local File Storage**: one JSON database plus a JSON roster of
//!   workers and branches; all writes are atomic (temp file + rename).
//!
//! ## Quick Start
//!
//! ```bash
//! # Seed the stock categories and tags
//! tareas --actor admin category seed
//!
//! # Create a task for one worker
//! tareas --actor admin add "Reponer lineal de bebidas" --assignee luis --due mañana
//!
//! # Fan out to every worker of a branch
//! tareas --actor admin add "Inventario mensual" --branch centro --requires-review
//!
//! # The worker drives the lifecycle
//! tareas --actor luis start VEN-0001
//! tareas --actor luis subtask done VEN-0001 1
//! tareas --actor luis submit VEN-0001
//!
//! # An admin reviews
//! tareas --actor admin review VEN-0001 aprobada
//! ```
//!
//! Data is stored locally in `~/.tareas/` (`tareas.json` and
//! `roster.json`); point `--db`/`--roster` elsewhere to override.

pub mod assign;
pub mod catalog;
pub mod cli;
pub mod cmd;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod fields;
pub mod task;
pub mod template;

pub use error::{Error, Result};
