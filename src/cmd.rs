//! Command implementations for the CLI interface.
//!
//! This module contains all the command handlers that implement the
//! subcommands: task creation and assignment, lifecycle transitions,
//! the review gate, checklist and comment management, statistics, and
//! template/category/tag administration.

use clap::Subcommand;
use clap_complete::{generate, Shell};

use std::path::Path;

use chrono::{Local, TimeZone, Utc};

use crate::assign::{self, AssignmentTarget, FanOut};
use crate::catalog::{self, Removal};
use crate::db::*;
use crate::directory::{Actor, FileRoster, Identity};
use crate::engine::{self, CreateSpec, TaskFilter, TaskPatch};
use crate::error::Result;
use crate::fields::*;
use crate::task::Task;
use crate::template::{self, TemplatePatch, TemplateSpec};

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task, optionally assigned to a user or a whole branch.
    Add {
        /// Short title for the task.
        title: String,
        /// Start from a template (id, code or name).
        #[arg(long)]
        template: Option<String>,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Category (id, code or name).
        #[arg(long)]
        category: Option<String>,
        /// Tag (id or name). May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Due date: YYYY-MM-DD, "hoy", "mañana", or "en Nd".
        #[arg(long)]
        due: Option<String>,
        /// Scheduled date, same formats as --due.
        #[arg(long)]
        scheduled: Option<String>,
        /// Priority: urgente | alta | media | baja.
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Require an admin review before the task can complete.
        #[arg(long)]
        requires_review: bool,
        /// Checklist item. May be repeated.
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
        /// Assign to a single user id.
        #[arg(long, conflicts_with = "branch")]
        assignee: Option<String>,
        /// Assign one copy to every worker of this branch id.
        #[arg(long)]
        branch: Option<String>,
    },

    /// List tasks with optional filters.
    List {
        /// Include completed and cancelled tasks.
        #[arg(long)]
        all: bool,
        /// Filter by state.
        #[arg(long, value_enum)]
        state: Option<TaskState>,
        /// Filter by priority.
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Filter by category (id, code or name).
        #[arg(long)]
        category: Option<String>,
        /// Filter by tag. May be repeated; every tag must match.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Filter by assignee user id.
        #[arg(long)]
        assignee: Option<String>,
        /// Due filter: today | this-week | overdue | none.
        #[arg(long, value_enum)]
        due: Option<DueFilter>,
        /// Only tasks due on or after this date.
        #[arg(long)]
        from: Option<String>,
        /// Only tasks due on or before this date.
        #[arg(long)]
        to: Option<String>,
        /// Free-text search over title, description and code.
        #[arg(long)]
        search: Option<String>,
        /// Sort key.
        #[arg(long, value_enum, default_value_t = SortKey::Due)]
        sort: SortKey,
        /// Limit number of rows printed.
        #[arg(long)]
        limit: Option<usize>,
        /// Skip this many rows first.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// View a single task by id, code or title.
    View {
        /// Task id, code or title.
        id: String,
    },

    /// Update fields on a task.
    Update {
        /// Task id, code or title.
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Category (id, code or name).
        #[arg(long)]
        category: Option<String>,
        /// Replace the tag set. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        scheduled: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Turn the review requirement on or off.
        #[arg(long)]
        requires_review: Option<bool>,
        /// Clear the due date.
        #[arg(long)]
        clear_due: bool,
        /// Clear the scheduled date.
        #[arg(long)]
        clear_scheduled: bool,
        /// Clear the category.
        #[arg(long)]
        clear_category: bool,
        /// Clear the description.
        #[arg(long)]
        clear_desc: bool,
    },

    /// Start a task (pendiente -> en-progreso).
    Start {
        id: String,
        /// Expected current state; the command fails if it moved.
        #[arg(long, value_enum)]
        expect: Option<TaskState>,
    },

    /// Pause a task back to pendiente. Checklist and comments persist.
    Pause {
        id: String,
        #[arg(long, value_enum)]
        expect: Option<TaskState>,
    },

    /// Submit a task for review (en-progreso -> en-revision).
    Submit {
        id: String,
        #[arg(long, value_enum)]
        expect: Option<TaskState>,
    },

    /// Complete a task that needs no review.
    Complete {
        id: String,
        #[arg(long, value_enum)]
        expect: Option<TaskState>,
    },

    /// Cancel a task (admin only, any non-terminal state).
    Cancel {
        id: String,
        #[arg(long, value_enum)]
        expect: Option<TaskState>,
    },

    /// Record a review verdict on a task in en-revision (admin only).
    Review {
        id: String,
        /// Verdict: aprobada | rechazada.
        #[arg(value_enum)]
        result: ReviewResult,
        /// Optional review comment.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Delete a task permanently (admin only).
    Delete {
        id: String,
    },

    /// Manage a task's checklist.
    Subtask {
        #[command(subcommand)]
        action: SubtaskAction,
    },

    /// Add a comment to a task.
    Comment {
        id: String,
        text: String,
    },

    /// Show aggregate task counters.
    Stats,

    /// Manage task templates.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Manage categories.
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Manage tags.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SubtaskAction {
    /// Add a checklist item to a task.
    Add {
        /// Task id, code or title.
        task: String,
        /// Checklist item title.
        title: String,
        /// Optional item description.
        #[arg(long)]
        desc: Option<String>,
    },
    /// Mark a checklist item completed.
    Done {
        task: String,
        /// Subtask id as shown by `view`.
        subtask: u64,
    },
    /// Mark a checklist item not completed again.
    Undo {
        task: String,
        subtask: u64,
    },
    /// Remove a checklist item.
    Rm {
        task: String,
        subtask: u64,
    },
}

#[derive(Subcommand)]
pub enum TemplateAction {
    /// List all templates.
    List,
    /// Create a new template (admin only).
    Create {
        /// Template name.
        name: String,
        /// Unique short code.
        code: String,
        /// Default task title; defaults to the template name.
        #[arg(long)]
        title: Option<String>,
        /// Template description.
        #[arg(long)]
        desc: Option<String>,
        /// Default task body.
        #[arg(long)]
        body: Option<String>,
        /// Default category (id, code or name).
        #[arg(long)]
        category: Option<String>,
        /// Default priority.
        #[arg(long, value_enum, default_value_t = Priority::Media)]
        priority: Priority,
        /// Days until due, applied at instantiation.
        #[arg(long)]
        days_to_due: Option<i64>,
        /// Predefined checklist item. May be repeated.
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
        /// Predefined tag (id or name). May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Mark the template for recurring daily assignment.
        #[arg(long)]
        permanent: bool,
    },
    /// Update a template (admin only).
    Update {
        /// Template id, code or name.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long)]
        days_to_due: Option<i64>,
        /// Replace the predefined checklist. May be repeated.
        #[arg(long = "subtask")]
        subtasks: Vec<String>,
        /// Replace the predefined tag set. May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        permanent: Option<bool>,
        #[arg(long)]
        clear_days_to_due: bool,
        #[arg(long)]
        clear_category: bool,
    },
    /// Delete a template (admin only).
    Delete {
        id: String,
    },
    /// Duplicate a template as a new editable record (admin only).
    Duplicate {
        id: String,
    },
    /// Instantiate a template into one or more tasks.
    Use {
        /// Template id, code or name.
        id: String,
        /// Override the task title.
        #[arg(long)]
        title: Option<String>,
        /// Override the due date.
        #[arg(long)]
        due: Option<String>,
        /// Scheduled date.
        #[arg(long)]
        scheduled: Option<String>,
        /// Require an admin review before completion.
        #[arg(long)]
        requires_review: bool,
        /// Assign to a single user id.
        #[arg(long, conflicts_with = "branch")]
        assignee: Option<String>,
        /// Assign one copy to every worker of this branch id.
        #[arg(long)]
        branch: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CategoryAction {
    /// List categories (active only unless --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Create a category (admin only).
    Add {
        name: String,
        /// Short code used as the task-code prefix.
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Update a category (admin only).
    Update {
        /// Category id, code or name.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Reactivate the category.
        #[arg(long, conflicts_with = "deactivate")]
        activate: bool,
        /// Deactivate the category.
        #[arg(long)]
        deactivate: bool,
    },
    /// Delete a category; referenced categories are deactivated instead.
    Rm {
        id: String,
    },
    /// Seed the stock categories and tags. Idempotent.
    Seed,
}

#[derive(Subcommand)]
pub enum TagAction {
    /// List tags (active only unless --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Create a tag (admin only).
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Update a tag (admin only).
    Update {
        /// Tag id or name.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "deactivate")]
        activate: bool,
        #[arg(long)]
        deactivate: bool,
    },
    /// Delete a tag; referenced tags are deactivated instead.
    Rm {
        id: String,
    },
}

/// Unwrap an engine result or print the error and exit.
fn ok_or_exit<T>(res: Result<T>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Load the roster file or exit.
pub fn load_roster(path: &Path) -> FileRoster {
    ok_or_exit(FileRoster::load(path))
}

/// Resolve the acting identity from the roster or exit.
pub fn resolve_actor(roster: &FileRoster, actor_id: Option<&str>) -> Actor {
    let Some(id) = actor_id else {
        eprintln!("Falta el usuario que actúa: usa --actor o exporta TAREAS_ACTOR.");
        std::process::exit(1);
    };
    ok_or_exit(roster.resolve(id))
}

fn save_or_exit(db: &Database, db_path: &Path) {
    if let Err(e) = db.save(db_path) {
        eprintln!("Failed to save DB: {e}");
        std::process::exit(1);
    }
}

fn parse_date_or_exit(field: &str, s: &str) -> chrono::NaiveDate {
    match parse_due_input(s) {
        Some(d) => d,
        None => {
            eprintln!("Fecha no reconocida para {field}. Usa YYYY-MM-DD, 'hoy', 'mañana' o 'en Nd'.");
            std::process::exit(1);
        }
    }
}

fn resolve_tags_or_exit(db: &Database, tags: &[String]) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::new();
    for t in tags {
        let id = ok_or_exit(resolve_tag_identifier(t, db));
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn tag_names(db: &Database, ids: &[u64]) -> String {
    let names: Vec<String> = ids
        .iter()
        .filter_map(|id| db.tag(*id).map(|t| t.name.clone()))
        .collect();
    names.join(",")
}

/// Print the outcome of a creation request, including the empty-branch
/// warning and any per-worker failures.
fn report_fanout(out: &FanOut, branch: Option<&str>) {
    if let Some(b) = branch {
        if out.created.is_empty() && out.failed.is_empty() {
            println!("Advertencia: la sucursal '{b}' no tiene trabajadores asignados; no se creó ninguna tarea.");
            return;
        }
    }
    for t in &out.created {
        println!("Creada {} ({}) para {}", t.code, t.id, t.assignee_name);
    }
    for f in &out.failed {
        eprintln!("No se pudo asignar a '{}': {}", f.user_id, f.reason);
    }
}

/// Add a new task, expanding a branch target into one task per worker.
pub fn cmd_add(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    title: String,
    template: Option<String>,
    desc: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
    due: Option<String>,
    scheduled: Option<String>,
    priority: Option<Priority>,
    requires_review: bool,
    subtasks: Vec<String>,
    assignee: Option<String>,
    branch: Option<String>,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);

    let category_id = category.map(|c| ok_or_exit(resolve_category_identifier(&c, db)));
    let tag_ids = resolve_tags_or_exit(db, &tags);
    let due = due.map(|s| parse_date_or_exit("--due", &s));
    let scheduled = scheduled.map(|s| parse_date_or_exit("--scheduled", &s));

    // Template defaults first, explicit flags on top.
    let mut spec = if let Some(tpl) = template {
        let tid = ok_or_exit(resolve_template_identifier(&tpl, db));
        let today = Local::now().date_naive();
        ok_or_exit(template::instantiate(db, tid, today))
    } else {
        CreateSpec::new("")
    };
    spec.title = title;
    if desc.is_some() {
        spec.body = desc;
    }
    if let Some(cid) = category_id {
        spec.category_id = Some(cid);
    }
    if !tag_ids.is_empty() {
        spec.tag_ids = tag_ids;
    }
    if let Some(d) = due {
        spec.due = Some(d);
    }
    if let Some(s) = scheduled {
        spec.scheduled = Some(s);
    }
    if let Some(p) = priority {
        spec.priority = p;
    }
    if requires_review {
        spec.requires_review = true;
    }
    spec.subtasks.extend(subtasks);

    let target = match (assignee, &branch) {
        (Some(user), None) => AssignmentTarget::User(user),
        (None, Some(b)) => AssignmentTarget::Branch(b.clone()),
        (None, None) => AssignmentTarget::Creator,
        (Some(_), Some(_)) => {
            eprintln!("Error: --assignee y --branch son excluyentes.");
            std::process::exit(1);
        }
    };

    let out = ok_or_exit(assign::create_assigned(db, &actor, &roster, &target, &spec));
    report_fanout(&out, branch.as_deref());
    save_or_exit(db, db_path);
}

/// List tasks with optional filtering, sorting and pagination.
pub fn cmd_list(
    db: &Database,
    all: bool,
    state: Option<TaskState>,
    priority: Option<Priority>,
    category: Option<String>,
    tags: Vec<String>,
    assignee: Option<String>,
    due: Option<DueFilter>,
    from: Option<String>,
    to: Option<String>,
    search: Option<String>,
    sort: SortKey,
    limit: Option<usize>,
    offset: usize,
) {
    let category_id = category.map(|c| ok_or_exit(resolve_category_identifier(&c, db)));
    let tag_ids = resolve_tags_or_exit(db, &tags);
    let filter = TaskFilter {
        state,
        priority,
        category_id,
        tag_ids,
        assignee,
        due,
        from: from.map(|s| parse_date_or_exit("--from", &s)),
        to: to.map(|s| parse_date_or_exit("--to", &s)),
        search,
        include_closed: all,
        sort,
        limit,
        offset,
    };
    let page = engine::list(db, &filter);
    print_table(db, &page.tasks);
    if page.tasks.len() < page.total {
        println!("({} de {} tareas)", page.tasks.len(), page.total);
    }
}

/// Print tasks in a formatted table.
pub fn print_table(db: &Database, tasks: &[Task]) {
    println!(
        "{:<5} {:<10} {:<12} {:<8} {:<10} {:<14} {}",
        "ID", "Código", "Estado", "Prio", "Vence", "Asignado", "Título [etiquetas]"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        let tags = tag_names(db, &t.tag_ids);
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{tags}]")
        };
        println!(
            "{:<5} {:<10} {:<12} {:<8} {:<10} {:<14} {}{}",
            t.id,
            t.code,
            format_state(t.state),
            format_priority(t.priority),
            format_due_relative(t.due, today),
            truncate(&t.assignee_name, 14),
            t.title,
            tags
        );
    }
}

/// View detailed information about a specific task.
pub fn cmd_view(db: &Database, id: String) {
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));
    let Some(task) = db.get(task_id) else {
        eprintln!("Tarea {} no encontrada.", task_id);
        std::process::exit(1);
    };
    let today = Local::now().date_naive();

    println!("ID:            {}", task.id);
    println!("Código:        {}", task.code);
    println!("Título:        {}", task.title);
    println!("Estado:        {}", format_state(task.state));
    println!("Prioridad:     {}", format_priority(task.priority));
    println!(
        "Requiere rev.: {}",
        if task.requires_review { "sí" } else { "no" }
    );
    let category = task
        .category_id
        .and_then(|cid| db.category(cid))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "-".into());
    println!("Categoría:     {}", category);
    let tags = tag_names(db, &task.tag_ids);
    println!("Etiquetas:     {}", if tags.is_empty() { "-".into() } else { tags });
    println!("Asignado a:    {} ({})", task.assignee_name, task.assignee);
    println!("Creada por:    {} ({})", task.created_by_name, task.created_by);
    println!(
        "Programada:    {}",
        task.scheduled.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    );
    println!(
        "Vence:         {}",
        match task.due {
            Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!("Creada UTC:    {}", format_ts(task.created_at_utc));
    if let Some(ts) = task.completed_at_utc {
        println!("Completada:    {}", format_ts(ts));
    }
    if let Some(result) = task.review_result {
        println!(
            "Revisión:      {} por {}{}",
            format_review(result),
            task.reviewed_by.as_deref().unwrap_or("-"),
            task.review_comment
                .as_deref()
                .map(|c| format!(" — {c}"))
                .unwrap_or_default()
        );
    }
    if let Some(body) = &task.body {
        println!("Descripción:\n{body}");
    }

    if !task.subtasks.is_empty() {
        let (done, total) = task.checklist_progress();
        println!("\nChecklist ({done}/{total}):");
        for s in &task.subtasks {
            let mark = if s.completed { "x" } else { " " };
            println!("  [{mark}] {} {}", s.id, s.title);
            if let Some(d) = &s.description {
                println!("        {d}");
            }
        }
    }

    if !task.comments.is_empty() {
        println!("\nComentarios:");
        for c in &task.comments {
            println!("  {} — {}: {}", format_ts(c.at_utc), c.author_name, c.content);
        }
    }

    println!("\nHistorial:");
    for h in &task.history {
        println!("  {} — {} ({})", format_ts(h.at_utc), h.description, h.actor_name);
    }
}

/// Update an existing task's fields.
pub fn cmd_update(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    id: String,
    title: Option<String>,
    desc: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
    due: Option<String>,
    scheduled: Option<String>,
    priority: Option<Priority>,
    requires_review: Option<bool>,
    clear_due: bool,
    clear_scheduled: bool,
    clear_category: bool,
    clear_desc: bool,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));

    let patch = TaskPatch {
        title,
        body: desc,
        priority,
        requires_review,
        scheduled: scheduled.map(|s| parse_date_or_exit("--scheduled", &s)),
        due: due.map(|s| parse_date_or_exit("--due", &s)),
        category_id: category.map(|c| ok_or_exit(resolve_category_identifier(&c, db))),
        tag_ids: if tags.is_empty() {
            None
        } else {
            Some(resolve_tags_or_exit(db, &tags))
        },
        clear_body: clear_desc,
        clear_scheduled,
        clear_due,
        clear_category,
    };
    let task = ok_or_exit(engine::update(db, &actor, task_id, &patch));
    save_or_exit(db, db_path);
    println!("Actualizada {}", task.code);
}

/// Shared handler for the transition verbs. The expected state defaults
/// to the state on disk right now, making the precondition explicit when
/// the caller pins it with --expect.
pub fn cmd_transition(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    id: String,
    target: TaskState,
    expect: Option<TaskState>,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));
    let expected = match expect {
        Some(s) => s,
        None => ok_or_exit(db.require(task_id)).state,
    };
    let task = ok_or_exit(engine::transition(db, &actor, task_id, target, expected));
    save_or_exit(db, db_path);
    println!("Tarea {}: {}", task.code, format_state(task.state));
}

/// Record a review verdict.
pub fn cmd_review(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    id: String,
    result: ReviewResult,
    comment: Option<String>,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));
    let task = ok_or_exit(engine::review(db, &actor, task_id, result, comment));
    save_or_exit(db, db_path);
    println!(
        "Revisión {} en {} — estado: {}",
        format_review(result),
        task.code,
        format_state(task.state)
    );
}

/// Delete a task permanently.
pub fn cmd_delete(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    id: String,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));
    let removed = ok_or_exit(engine::delete(db, &actor, task_id));
    save_or_exit(db, db_path);
    println!("Eliminada {}", removed.code);
}

/// Handle checklist subcommands.
pub fn cmd_subtask(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    action: SubtaskAction,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    match action {
        SubtaskAction::Add { task, title, desc } => {
            let task_id = ok_or_exit(resolve_task_identifier(&task, db));
            let t = ok_or_exit(engine::add_subtask(db, &actor, task_id, &title, desc));
            save_or_exit(db, db_path);
            let (done, total) = t.checklist_progress();
            println!("Subtarea añadida a {} ({done}/{total})", t.code);
        }
        SubtaskAction::Done { task, subtask } => {
            let task_id = ok_or_exit(resolve_task_identifier(&task, db));
            let t = ok_or_exit(engine::toggle_subtask(db, &actor, task_id, subtask, true));
            save_or_exit(db, db_path);
            let (done, total) = t.checklist_progress();
            println!("Subtarea {subtask} completada ({done}/{total})");
        }
        SubtaskAction::Undo { task, subtask } => {
            let task_id = ok_or_exit(resolve_task_identifier(&task, db));
            let t = ok_or_exit(engine::toggle_subtask(db, &actor, task_id, subtask, false));
            save_or_exit(db, db_path);
            let (done, total) = t.checklist_progress();
            println!("Subtarea {subtask} reabierta ({done}/{total})");
        }
        SubtaskAction::Rm { task, subtask } => {
            let task_id = ok_or_exit(resolve_task_identifier(&task, db));
            let t = ok_or_exit(engine::remove_subtask(db, &actor, task_id, subtask));
            save_or_exit(db, db_path);
            println!("Subtarea {subtask} eliminada de {}", t.code);
        }
    }
}

/// Append a comment to a task.
pub fn cmd_comment(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    id: String,
    text: String,
) {
    let roster = load_roster(roster_path);
    let actor = resolve_actor(&roster, actor_id);
    let task_id = ok_or_exit(resolve_task_identifier(&id, db));
    let task = ok_or_exit(engine::add_comment(db, &actor, task_id, &text));
    save_or_exit(db, db_path);
    println!("Comentario añadido a {}", task.code);
}

/// Show aggregate counters.
pub fn cmd_stats(db: &Database) {
    let stats = engine::statistics(db, Local::now().date_naive());
    println!("Tareas:       {}", stats.total);
    println!("  pendientes:  {}", stats.pendientes);
    println!("  en progreso: {}", stats.en_progreso);
    println!("  en revisión: {}", stats.en_revision);
    println!("  completadas: {}", stats.completadas);
    println!("  canceladas:  {}", stats.canceladas);
    println!("Vencidas:     {}", stats.vencidas);
    println!("Urgentes:     {}", stats.urgentes);
}

/// Handle template management commands.
pub fn cmd_template(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    action: TemplateAction,
) {
    match action {
        TemplateAction::List => {
            if db.templates.is_empty() {
                println!("No hay plantillas.");
                return;
            }
            println!(
                "{:<5} {:<10} {:<20} {:<8} {:<6} {:<10} {}",
                "ID", "Código", "Nombre", "Prio", "Días", "Usos", "Permanente"
            );
            for t in &db.templates {
                println!(
                    "{:<5} {:<10} {:<20} {:<8} {:<6} {:<10} {}",
                    t.id,
                    t.code,
                    truncate(&t.name, 20),
                    format_priority(t.priority),
                    t.days_to_due.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                    t.times_used,
                    if t.permanent { "sí" } else { "no" }
                );
            }
        }

        TemplateAction::Create {
            name,
            code,
            title,
            desc,
            body,
            category,
            priority,
            days_to_due,
            subtasks,
            tags,
            permanent,
        } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let category_id = category.map(|c| ok_or_exit(resolve_category_identifier(&c, db)));
            let tag_ids = resolve_tags_or_exit(db, &tags);
            let spec = TemplateSpec {
                title: title.unwrap_or_else(|| name.clone()),
                name,
                code,
                description: desc,
                body,
                category_id,
                priority,
                days_to_due,
                subtasks,
                tag_ids,
                permanent,
            };
            let t = ok_or_exit(template::create_template(db, &actor, &spec));
            save_or_exit(db, db_path);
            println!("Creada plantilla '{}' ({})", t.name, t.code);
        }

        TemplateAction::Update {
            id,
            name,
            code,
            title,
            desc,
            body,
            category,
            priority,
            days_to_due,
            subtasks,
            tags,
            permanent,
            clear_days_to_due,
            clear_category,
        } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let template_id = ok_or_exit(resolve_template_identifier(&id, db));
            let patch = TemplatePatch {
                name,
                code,
                title,
                description: desc,
                body,
                category_id: category.map(|c| ok_or_exit(resolve_category_identifier(&c, db))),
                priority,
                days_to_due,
                subtasks: if subtasks.is_empty() { None } else { Some(subtasks) },
                tag_ids: if tags.is_empty() {
                    None
                } else {
                    Some(resolve_tags_or_exit(db, &tags))
                },
                permanent,
                clear_days_to_due,
                clear_category,
            };
            let t = ok_or_exit(template::update_template(db, &actor, template_id, &patch));
            save_or_exit(db, db_path);
            println!("Actualizada plantilla '{}'", t.name);
        }

        TemplateAction::Delete { id } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let template_id = ok_or_exit(resolve_template_identifier(&id, db));
            let t = ok_or_exit(template::delete_template(db, &actor, template_id));
            save_or_exit(db, db_path);
            println!("Eliminada plantilla '{}'", t.name);
        }

        TemplateAction::Duplicate { id } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let template_id = ok_or_exit(resolve_template_identifier(&id, db));
            let copy = ok_or_exit(template::duplicate(db, &actor, template_id));
            save_or_exit(db, db_path);
            println!("Duplicada como '{}' ({})", copy.name, copy.code);
        }

        TemplateAction::Use {
            id,
            title,
            due,
            scheduled,
            requires_review,
            assignee,
            branch,
        } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let template_id = ok_or_exit(resolve_template_identifier(&id, db));

            let today = Local::now().date_naive();
            let mut spec = ok_or_exit(template::instantiate(db, template_id, today));
            if let Some(t) = title {
                spec.title = t;
            }
            if let Some(d) = due {
                spec.due = Some(parse_date_or_exit("--due", &d));
            }
            if let Some(s) = scheduled {
                spec.scheduled = Some(parse_date_or_exit("--scheduled", &s));
            }
            if requires_review {
                spec.requires_review = true;
            }

            let target = match (assignee, &branch) {
                (Some(user), None) => AssignmentTarget::User(user),
                (None, Some(b)) => AssignmentTarget::Branch(b.clone()),
                (None, None) => AssignmentTarget::Creator,
                (Some(_), Some(_)) => {
                    eprintln!("Error: --assignee y --branch son excluyentes.");
                    std::process::exit(1);
                }
            };
            let out = ok_or_exit(assign::create_assigned(db, &actor, &roster, &target, &spec));
            report_fanout(&out, branch.as_deref());
            save_or_exit(db, db_path);
        }
    }
}

/// Handle category management commands.
pub fn cmd_category(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    action: CategoryAction,
) {
    match action {
        CategoryAction::List { all } => {
            println!("{:<5} {:<8} {:<20} {:<9} {}", "ID", "Código", "Nombre", "Color", "Activa");
            for c in &db.categories {
                if !all && !c.active {
                    continue;
                }
                println!(
                    "{:<5} {:<8} {:<20} {:<9} {}",
                    c.id,
                    c.code.as_deref().unwrap_or("-"),
                    truncate(&c.name, 20),
                    c.color.as_deref().unwrap_or("-"),
                    if c.active { "sí" } else { "no" }
                );
            }
        }
        CategoryAction::Add { name, code, color } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let c = ok_or_exit(catalog::add_category(db, &actor, &name, code, color));
            save_or_exit(db, db_path);
            println!("Creada categoría '{}' ({})", c.name, c.id);
        }
        CategoryAction::Update {
            id,
            name,
            code,
            color,
            activate,
            deactivate,
        } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let cat_id = ok_or_exit(resolve_category_identifier(&id, db));
            let active = if activate {
                Some(true)
            } else if deactivate {
                Some(false)
            } else {
                None
            };
            let c = ok_or_exit(catalog::update_category(
                db, &actor, cat_id, name, code, color, active,
            ));
            save_or_exit(db, db_path);
            println!("Actualizada categoría '{}'", c.name);
        }
        CategoryAction::Rm { id } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let cat_id = ok_or_exit(resolve_category_identifier(&id, db));
            let refs = catalog::category_references(db, cat_id);
            match ok_or_exit(catalog::remove_category(db, &actor, cat_id)) {
                Removal::Removed => println!("Categoría eliminada."),
                Removal::Deactivated => println!(
                    "Categoría desactivada: sigue referenciada por {refs} registro(s)."
                ),
            }
            save_or_exit(db, db_path);
        }
        CategoryAction::Seed => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let inserted = ok_or_exit(catalog::seed_defaults(db, &actor));
            save_or_exit(db, db_path);
            println!("Etiquetas predeterminadas: {inserted} nuevas.");
        }
    }
}

/// Handle tag management commands.
pub fn cmd_tag(
    db: &mut Database,
    db_path: &Path,
    roster_path: &Path,
    actor_id: Option<&str>,
    action: TagAction,
) {
    match action {
        TagAction::List { all } => {
            println!("{:<5} {:<20} {:<9} {}", "ID", "Nombre", "Color", "Activa");
            for t in &db.tags {
                if !all && !t.active {
                    continue;
                }
                println!(
                    "{:<5} {:<20} {:<9} {}",
                    t.id,
                    truncate(&t.name, 20),
                    t.color.as_deref().unwrap_or("-"),
                    if t.active { "sí" } else { "no" }
                );
            }
        }
        TagAction::Add { name, color } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let t = ok_or_exit(catalog::add_tag(db, &actor, &name, color));
            save_or_exit(db, db_path);
            println!("Creada etiqueta '{}' ({})", t.name, t.id);
        }
        TagAction::Update {
            id,
            name,
            color,
            activate,
            deactivate,
        } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let tag_id = ok_or_exit(resolve_tag_identifier(&id, db));
            let active = if activate {
                Some(true)
            } else if deactivate {
                Some(false)
            } else {
                None
            };
            let t = ok_or_exit(catalog::update_tag(db, &actor, tag_id, name, color, active));
            save_or_exit(db, db_path);
            println!("Actualizada etiqueta '{}'", t.name);
        }
        TagAction::Rm { id } => {
            let roster = load_roster(roster_path);
            let actor = resolve_actor(&roster, actor_id);
            let tag_id = ok_or_exit(resolve_tag_identifier(&id, db));
            let refs = catalog::tag_references(db, tag_id);
            match ok_or_exit(catalog::remove_tag(db, &actor, tag_id)) {
                Removal::Removed => println!("Etiqueta eliminada."),
                Removal::Deactivated => println!(
                    "Etiqueta desactivada: sigue referenciada por {refs} registro(s)."
                ),
            }
            save_or_exit(db, db_path);
        }
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}
