//! External collaborators: identity resolution and the branch directory.
//!
//! The engine never owns user or branch data. It consumes two narrow
//! traits — `Identity` (who is acting, with which role) and `Directory`
//! (which workers belong to a branch) — and the CLI backs both with a
//! single JSON roster file kept next to the task database.
//!
//! Implementations signal a missing record with `Error::NotFound` and an
//! unanswerable lookup (I/O, parse) with `Error::UpstreamUnavailable`;
//! the two must never be conflated.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fields::Role;

/// The acting identity threaded explicitly through every engine call.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}

/// A worker as the directory knows them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    /// Branches this worker is currently assigned to.
    #[serde(default)]
    pub branches: Vec<String>,
}

/// A branch (sucursal) of the organisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
}

/// Resolves an actor id to an identity with a role.
pub trait Identity {
    fn resolve(&self, actor_id: &str) -> Result<Actor>;
}

/// Answers branch-roster and worker-lookup queries.
pub trait Directory {
    /// Workers currently assigned to the branch. An unknown branch is
    /// `NotFound`; an unreadable roster is `UpstreamUnavailable`.
    fn branch_workers(&self, branch_id: &str) -> Result<Vec<Worker>>;

    /// Look up a single worker for assignment and display fields.
    fn worker(&self, user_id: &str) -> Result<Worker>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    #[serde(default)]
    workers: Vec<Worker>,
    #[serde(default)]
    branches: Vec<Branch>,
}

/// File-backed roster implementing both collaborator traits.
#[derive(Debug)]
pub struct FileRoster {
    data: RosterFile,
}

impl FileRoster {
    /// Load the roster file. A missing file is an empty roster (a fresh
    /// install has no workers yet); an unreadable or malformed file is
    /// `UpstreamUnavailable`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FileRoster {
                data: RosterFile::default(),
            });
        }
        let mut buf = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut buf))
            .map_err(|e| Error::UpstreamUnavailable(format!("{}: {e}", path.display())))?;
        let data = serde_json::from_str(&buf)
            .map_err(|e| Error::UpstreamUnavailable(format!("{}: {e}", path.display())))?;
        Ok(FileRoster { data })
    }

    pub fn branches(&self) -> &[Branch] {
        &self.data.branches
    }

    pub fn workers(&self) -> &[Worker] {
        &self.data.workers
    }
}

impl Identity for FileRoster {
    fn resolve(&self, actor_id: &str) -> Result<Actor> {
        let w = self.worker(actor_id)?;
        Ok(Actor::new(w.id, w.name, w.role))
    }
}

impl Directory for FileRoster {
    fn branch_workers(&self, branch_id: &str) -> Result<Vec<Worker>> {
        if !self.data.branches.iter().any(|b| b.id == branch_id) {
            return Err(Error::not_found("sucursal", branch_id));
        }
        Ok(self
            .data
            .workers
            .iter()
            .filter(|w| w.branches.iter().any(|b| b == branch_id))
            .cloned()
            .collect())
    }

    fn worker(&self, user_id: &str) -> Result<Worker> {
        self.data
            .workers
            .iter()
            .find(|w| w.id == user_id)
            .cloned()
            .ok_or_else(|| Error::not_found("usuario", user_id))
    }
}
