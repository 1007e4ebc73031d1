use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed task manager for small retail teams.
/// Storage defaults to ~/.tareas/tareas.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "tareas", version, about = "Gestión de tareas, asignaciones y revisiones")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to the roster file listing workers and branches.
    #[arg(long, global = true)]
    pub roster: Option<PathBuf>,

    /// Acting user id; falls back to $TAREAS_ACTOR.
    #[arg(long, global = true)]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
