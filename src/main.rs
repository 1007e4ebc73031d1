use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tareas::cli::Cli;
use tareas::cmd::{self, Commands};
use tareas::db::Database;

fn main() {
    // Diagnostics go to stderr and are opt-in via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine the data directory.
    let base_dir = if let Some(db_path) = cli.db.as_ref() {
        db_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .to_path_buf()
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let dir = PathBuf::from(home).join(".tareas");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("Failed to create data directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
        dir
    };

    let db_path = cli.db.unwrap_or_else(|| base_dir.join("tareas.json"));
    let roster_path = cli.roster.unwrap_or_else(|| base_dir.join("roster.json"));
    let actor = cli
        .actor
        .or_else(|| std::env::var("TAREAS_ACTOR").ok());
    let actor = actor.as_deref();

    let mut db = Database::load(&db_path);

    match cli.command {
        Commands::Add {
            title, template, desc, category, tags, due, scheduled, priority,
            requires_review, subtasks, assignee, branch,
        } => cmd::cmd_add(
            &mut db, &db_path, &roster_path, actor, title, template, desc, category,
            tags, due, scheduled, priority, requires_review, subtasks, assignee, branch,
        ),

        Commands::List {
            all, state, priority, category, tags, assignee, due, from, to, search,
            sort, limit, offset,
        } => cmd::cmd_list(
            &db, all, state, priority, category, tags, assignee, due, from, to,
            search, sort, limit, offset,
        ),

        Commands::View { id } => cmd::cmd_view(&db, id),

        Commands::Update {
            id, title, desc, category, tags, due, scheduled, priority, requires_review,
            clear_due, clear_scheduled, clear_category, clear_desc,
        } => cmd::cmd_update(
            &mut db, &db_path, &roster_path, actor, id, title, desc, category, tags,
            due, scheduled, priority, requires_review, clear_due, clear_scheduled,
            clear_category, clear_desc,
        ),

        Commands::Start { id, expect } => cmd::cmd_transition(
            &mut db, &db_path, &roster_path, actor, id,
            tareas::fields::TaskState::EnProgreso, expect,
        ),

        Commands::Pause { id, expect } => cmd::cmd_transition(
            &mut db, &db_path, &roster_path, actor, id,
            tareas::fields::TaskState::Pendiente, expect,
        ),

        Commands::Submit { id, expect } => cmd::cmd_transition(
            &mut db, &db_path, &roster_path, actor, id,
            tareas::fields::TaskState::EnRevision, expect,
        ),

        Commands::Complete { id, expect } => cmd::cmd_transition(
            &mut db, &db_path, &roster_path, actor, id,
            tareas::fields::TaskState::Completada, expect,
        ),

        Commands::Cancel { id, expect } => cmd::cmd_transition(
            &mut db, &db_path, &roster_path, actor, id,
            tareas::fields::TaskState::Cancelada, expect,
        ),

        Commands::Review { id, result, comment } => {
            cmd::cmd_review(&mut db, &db_path, &roster_path, actor, id, result, comment)
        }

        Commands::Delete { id } => cmd::cmd_delete(&mut db, &db_path, &roster_path, actor, id),

        Commands::Subtask { action } => {
            cmd::cmd_subtask(&mut db, &db_path, &roster_path, actor, action)
        }

        Commands::Comment { id, text } => {
            cmd::cmd_comment(&mut db, &db_path, &roster_path, actor, id, text)
        }

        Commands::Stats => cmd::cmd_stats(&db),

        Commands::Template { action } => {
            cmd::cmd_template(&mut db, &db_path, &roster_path, actor, action)
        }

        Commands::Category { action } => {
            cmd::cmd_category(&mut db, &db_path, &roster_path, actor, action)
        }

        Commands::Tag { action } => cmd::cmd_tag(&mut db, &db_path, &roster_path, actor, action),

        Commands::Completions { shell } => cmd::cmd_completions(shell),
    }
}
