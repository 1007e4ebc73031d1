//! Assignment resolution: who ends up owning the task(s) a creation
//! request produces.
//!
//! A request targets the creator, a single user, or a whole branch. A
//! branch target fans out into one independent task per worker currently
//! assigned to that branch — each copy with its own id, code, checklist
//! and history. The fan-out is not all-or-nothing: per-worker failures
//! are collected and reported, never dropped silently, while a failure
//! to resolve the worker list itself aborts the whole operation.

use tracing::warn;

use crate::db::Database;
use crate::directory::{Actor, Directory};
use crate::engine::{self, CreateSpec};
use crate::error::Result;
use crate::task::Task;

/// Target of a creation request. Exactly one by construction.
#[derive(Debug, Clone)]
pub enum AssignmentTarget {
    /// No explicit target: the creator keeps the task.
    Creator,
    /// A single user, validated through the directory.
    User(String),
    /// Every worker currently assigned to the branch.
    Branch(String),
}

/// One worker the fan-out could not create a task for.
#[derive(Debug)]
pub struct FanOutFailure {
    pub user_id: String,
    pub reason: String,
}

/// Outcome of a creation request: the tasks created and, for branch
/// fan-outs, the targets that failed. Zero created tasks with zero
/// failures is a legitimate outcome (an empty branch), not an error.
#[derive(Debug, Default)]
pub struct FanOut {
    pub created: Vec<Task>,
    pub failed: Vec<FanOutFailure>,
}

impl FanOut {
    fn single(task: Task) -> Self {
        FanOut {
            created: vec![task],
            failed: Vec::new(),
        }
    }
}

/// Expand a creation request into one or more tasks.
///
/// The spec is validated once up front, so a branch fan-out never fails
/// halfway through on an error every copy shares.
pub fn create_assigned(
    db: &mut Database,
    actor: &Actor,
    directory: &dyn Directory,
    target: &AssignmentTarget,
    spec: &CreateSpec,
) -> Result<FanOut> {
    engine::validate_spec(db, spec)?;

    match target {
        AssignmentTarget::Creator => {
            let task = engine::create_for(db, actor, &actor.id, &actor.name, spec)?;
            Ok(FanOut::single(task))
        }
        AssignmentTarget::User(user_id) => {
            let worker = directory.worker(user_id)?;
            let task = engine::create_for(db, actor, &worker.id, &worker.name, spec)?;
            Ok(FanOut::single(task))
        }
        AssignmentTarget::Branch(branch_id) => {
            // NotFound and UpstreamUnavailable both abort here: without a
            // worker list there is nothing to fan out over.
            let workers = directory.branch_workers(branch_id)?;

            let mut out = FanOut::default();
            for worker in workers {
                match engine::create_for(db, actor, &worker.id, &worker.name, spec) {
                    Ok(task) => out.created.push(task),
                    Err(e) => out.failed.push(FanOutFailure {
                        user_id: worker.id.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
            if !out.failed.is_empty() {
                warn!(
                    sucursal = %branch_id,
                    creadas = out.created.len(),
                    fallidas = out.failed.len(),
                    "asignación por sucursal incompleta"
                );
            }
            Ok(out)
        }
    }
}
