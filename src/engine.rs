//! Workflow engine: task creation, the lifecycle state machine, the
//! review gate, checklist/comment operations and list/statistics queries.
//!
//! Every mutating operation takes the acting identity explicitly, checks
//! permissions in exactly one place, appends exactly one history entry
//! per effective change, and bumps `updated_at_utc`. State transitions
//! carry an expected-current-state precondition: a stale caller gets
//! `Conflict`, never a silent overwrite.

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::db::{start_end_of_this_week, Database};
use crate::directory::Actor;
use crate::error::{Error, Result};
use crate::fields::{
    format_review, format_state, DueFilter, Priority, ReviewResult, SortKey, TaskState,
};
use crate::task::{Comment, HistoryEntry, Subtask, Task};

/// Current UTC timestamp in epoch seconds.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Everything needed to create one task. The assignment resolver expands
/// one spec into one task per target; each copy is fully independent.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub title: String,
    pub body: Option<String>,
    pub priority: Priority,
    pub requires_review: bool,
    pub scheduled: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub category_id: Option<u64>,
    pub tag_ids: Vec<u64>,
    /// Checklist titles materialised as subtasks on creation.
    pub subtasks: Vec<String>,
    /// Provenance when instantiated from a template.
    pub template_id: Option<u64>,
}

impl CreateSpec {
    pub fn new(title: impl Into<String>) -> Self {
        CreateSpec {
            title: title.into(),
            body: None,
            priority: Priority::Media,
            requires_review: false,
            scheduled: None,
            due: None,
            category_id: None,
            tag_ids: Vec::new(),
            subtasks: Vec::new(),
            template_id: None,
        }
    }
}

/// Fields that `update` may patch. `clear_*` flags reset optional fields,
/// mirroring the CLI's `--clear-due`-style switches.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<Priority>,
    pub requires_review: Option<bool>,
    pub scheduled: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub category_id: Option<u64>,
    pub tag_ids: Option<Vec<u64>>,
    pub clear_body: bool,
    pub clear_scheduled: bool,
    pub clear_due: bool,
    pub clear_category: bool,
}

/// List filters. `total` on the resulting page counts matches before
/// pagination is applied.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub priority: Option<Priority>,
    pub category_id: Option<u64>,
    pub tag_ids: Vec<u64>,
    pub assignee: Option<String>,
    pub due: Option<DueFilter>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub search: Option<String>,
    /// Include terminal tasks (hidden by default, like the classic list).
    pub include_closed: bool,
    pub sort: SortKey,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Default for TaskFilter {
    fn default() -> Self {
        TaskFilter {
            state: None,
            priority: None,
            category_id: None,
            tag_ids: Vec::new(),
            assignee: None,
            due: None,
            from: None,
            to: None,
            search: None,
            include_closed: false,
            sort: SortKey::Due,
            limit: None,
            offset: 0,
        }
    }
}

/// One page of list results plus the pre-pagination match count.
#[derive(Debug)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
}

/// Aggregate counters for the stats command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub pendientes: usize,
    pub en_progreso: usize,
    pub en_revision: usize,
    pub completadas: usize,
    pub canceladas: usize,
    /// Non-terminal tasks whose due date has passed.
    pub vencidas: usize,
    /// Non-terminal tasks with Priority::Urgente.
    pub urgentes: usize,
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Admin-or-super-admin gate shared by the registries and stores.
pub fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden(action.to_string()))
    }
}

/// Owner-or-admin gate for the day-to-day task operations.
fn require_owner_or_admin(actor: &Actor, assignee: &str, action: &str) -> Result<()> {
    if actor.role.is_admin() || actor.id == assignee {
        Ok(())
    } else {
        Err(Error::forbidden(action.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Validate the target-independent parts of a creation spec. The
/// assignment resolver calls this once before fanning out.
pub fn validate_spec(db: &Database, spec: &CreateSpec) -> Result<()> {
    if spec.title.trim().is_empty() {
        return Err(Error::InvalidArgument("el título es obligatorio".into()));
    }
    if let (Some(s), Some(d)) = (spec.scheduled, spec.due) {
        if d < s {
            return Err(Error::InvalidArgument(
                "la fecha límite no puede ser anterior a la fecha programada".into(),
            ));
        }
    }
    if let Some(cid) = spec.category_id {
        if db.category(cid).is_none() {
            return Err(Error::not_found("categoría", cid));
        }
    }
    for &tid in &spec.tag_ids {
        if db.tag(tid).is_none() {
            return Err(Error::not_found("etiqueta", tid));
        }
    }
    Ok(())
}

/// Create one task owned by the given assignee. Initial state is always
/// Pendiente; one "creada" history entry is written.
pub fn create_for(
    db: &mut Database,
    actor: &Actor,
    assignee_id: &str,
    assignee_name: &str,
    spec: &CreateSpec,
) -> Result<Task> {
    validate_spec(db, spec)?;
    if assignee_id.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "el asignado no tiene identificador".into(),
        ));
    }

    let now = now_ts();
    let id = db.alloc_task_id();
    let code = db.next_code(spec.category_id);

    let mut task = Task {
        id,
        code: code.clone(),
        title: spec.title.trim().to_string(),
        body: spec.body.clone(),
        priority: spec.priority,
        state: TaskState::Pendiente,
        requires_review: spec.requires_review,
        scheduled: spec.scheduled,
        due: spec.due,
        category_id: spec.category_id,
        tag_ids: spec.tag_ids.clone(),
        assignee: assignee_id.to_string(),
        assignee_name: assignee_name.to_string(),
        created_by: actor.id.clone(),
        created_by_name: actor.name.clone(),
        template_id: spec.template_id,
        subtasks: Vec::new(),
        comments: Vec::new(),
        history: Vec::new(),
        next_subtask_id: 0,
        review_result: None,
        reviewed_by: None,
        review_comment: None,
        created_at_utc: now,
        updated_at_utc: now,
        completed_at_utc: None,
        reviewed_at_utc: None,
    };
    for title in &spec.subtasks {
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        task.next_subtask_id += 1;
        task.subtasks.push(Subtask {
            id: task.next_subtask_id,
            title: title.to_string(),
            description: None,
            completed: false,
            completed_at_utc: None,
        });
    }
    push_history(&mut task, actor, "creada", now);

    info!(task = id, code = %code, asignado = %assignee_id, "tarea creada");
    db.tasks.push(task.clone());
    Ok(task)
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Apply a state transition under a compare-and-set precondition.
///
/// `expected` is the state the caller last observed: when it no longer
/// matches, the call fails with `Conflict` and the task is untouched.
pub fn transition(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    target: TaskState,
    expected: TaskState,
) -> Result<Task> {
    let (state, requires_review, assignee, code) = {
        let t = db.require(id)?;
        (t.state, t.requires_review, t.assignee.clone(), t.code.clone())
    };
    if state != expected {
        return Err(Error::Conflict(format!(
            "la tarea {} está {}, se esperaba {}",
            code,
            format_state(state),
            format_state(expected)
        )));
    }

    let description = match (state, target) {
        (TaskState::Pendiente, TaskState::EnProgreso) => {
            require_owner_or_admin(actor, &assignee, "iniciar la tarea")?;
            "iniciada"
        }
        (TaskState::EnProgreso, TaskState::Pendiente) => {
            require_owner_or_admin(actor, &assignee, "pausar la tarea")?;
            "pausada"
        }
        (TaskState::EnProgreso, TaskState::EnRevision) => {
            require_owner_or_admin(actor, &assignee, "enviar la tarea a revisión")?;
            if !requires_review {
                return Err(Error::InvalidArgument(
                    "la tarea no requiere revisión".into(),
                ));
            }
            "enviada a revisión"
        }
        (TaskState::EnProgreso, TaskState::Completada) => {
            require_owner_or_admin(actor, &assignee, "completar la tarea")?;
            if requires_review {
                return Err(Error::InvalidArgument(
                    "la tarea requiere revisión antes de completarse".into(),
                ));
            }
            "completada"
        }
        // From review, the outcome carries review semantics; route through
        // the gate so the review fields are recorded consistently.
        (TaskState::EnRevision, TaskState::Completada) => {
            return review(db, actor, id, ReviewResult::Aprobada, None);
        }
        (TaskState::EnRevision, TaskState::EnProgreso) => {
            return review(db, actor, id, ReviewResult::Rechazada, None);
        }
        (from, TaskState::Cancelada) if !from.is_terminal() => {
            require_admin(actor, "cancelar la tarea")?;
            "cancelada"
        }
        (from, to) => {
            return Err(Error::invalid_state(
                format!("pasar a {}", format_state(to)),
                from,
            ));
        }
    };

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    t.state = target;
    if target == TaskState::Completada {
        t.completed_at_utc = Some(now);
    }
    t.updated_at_utc = now;
    push_history(t, actor, description, now);
    info!(task = id, estado = format_state(target), "transición aplicada");
    Ok(t.clone())
}

/// Review-gate verdict on a task sitting in EnRevision. Admin only.
///
/// Aprobada completes the task; Rechazada returns it to EnProgreso with
/// all prior work (checklist, comments, history) intact.
pub fn review(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    result: ReviewResult,
    comment: Option<String>,
) -> Result<Task> {
    require_admin(actor, "revisar la tarea")?;
    let state = db.require(id)?.state;
    if state != TaskState::EnRevision {
        return Err(Error::invalid_state("revisar la tarea", state));
    }

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    t.review_result = Some(result);
    t.reviewed_by = Some(actor.id.clone());
    t.review_comment = comment.clone();
    t.reviewed_at_utc = Some(now);
    let description = match result {
        ReviewResult::Aprobada => {
            t.state = TaskState::Completada;
            t.completed_at_utc = Some(now);
            "revisión aprobada".to_string()
        }
        ReviewResult::Rechazada => {
            t.state = TaskState::EnProgreso;
            match &comment {
                Some(c) => format!("revisión rechazada: {c}"),
                None => "revisión rechazada".to_string(),
            }
        }
    };
    t.updated_at_utc = now;
    push_history(t, actor, &description, now);
    info!(task = id, resultado = format_review(result), "revisión registrada");
    Ok(t.clone())
}

// ---------------------------------------------------------------------------
// Edits, checklist, comments
// ---------------------------------------------------------------------------

/// Patch editable fields. Forbidden on terminal tasks; no-op patches
/// return the task without writing history.
pub fn update(db: &mut Database, actor: &Actor, id: u64, patch: &TaskPatch) -> Result<Task> {
    let (state, assignee) = {
        let t = db.require(id)?;
        (t.state, t.assignee.clone())
    };
    if state.is_terminal() {
        return Err(Error::invalid_state("editar la tarea", state));
    }
    require_owner_or_admin(actor, &assignee, "editar la tarea")?;

    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument("el título es obligatorio".into()));
        }
    }
    if let Some(cid) = patch.category_id {
        if db.category(cid).is_none() {
            return Err(Error::not_found("categoría", cid));
        }
    }
    if let Some(tids) = &patch.tag_ids {
        for &tid in tids {
            if db.tag(tid).is_none() {
                return Err(Error::not_found("etiqueta", tid));
            }
        }
    }

    // Date ordering is validated against the post-patch values.
    {
        let t = db.require(id)?;
        let scheduled = if patch.clear_scheduled {
            None
        } else {
            patch.scheduled.or(t.scheduled)
        };
        let due = if patch.clear_due { None } else { patch.due.or(t.due) };
        if let (Some(s), Some(d)) = (scheduled, due) {
            if d < s {
                return Err(Error::InvalidArgument(
                    "la fecha límite no puede ser anterior a la fecha programada".into(),
                ));
            }
        }
    }

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    let mut changed: Vec<&str> = Vec::new();
    if let Some(title) = &patch.title {
        t.title = title.trim().to_string();
        changed.push("título");
    }
    if patch.clear_body {
        t.body = None;
        changed.push("descripción");
    } else if let Some(body) = &patch.body {
        t.body = Some(body.clone());
        changed.push("descripción");
    }
    if let Some(p) = patch.priority {
        t.priority = p;
        changed.push("prioridad");
    }
    if let Some(r) = patch.requires_review {
        t.requires_review = r;
        changed.push("revisión requerida");
    }
    if patch.clear_scheduled {
        t.scheduled = None;
        changed.push("fecha programada");
    } else if let Some(s) = patch.scheduled {
        t.scheduled = Some(s);
        changed.push("fecha programada");
    }
    if patch.clear_due {
        t.due = None;
        changed.push("fecha límite");
    } else if let Some(d) = patch.due {
        t.due = Some(d);
        changed.push("fecha límite");
    }
    if patch.clear_category {
        t.category_id = None;
        changed.push("categoría");
    } else if let Some(cid) = patch.category_id {
        t.category_id = Some(cid);
        changed.push("categoría");
    }
    if let Some(tids) = &patch.tag_ids {
        t.tag_ids = tids.clone();
        changed.push("etiquetas");
    }

    if changed.is_empty() {
        return Ok(t.clone());
    }
    t.updated_at_utc = now;
    let description = format!("editada ({})", changed.join(", "));
    push_history(t, actor, &description, now);
    Ok(t.clone())
}

/// Append a checklist item. Rejected once the task is terminal.
pub fn add_subtask(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    title: &str,
    description: Option<String>,
) -> Result<Task> {
    if title.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "el título de la subtarea es obligatorio".into(),
        ));
    }
    let (state, assignee) = {
        let t = db.require(id)?;
        (t.state, t.assignee.clone())
    };
    if state.is_terminal() {
        return Err(Error::invalid_state("añadir una subtarea", state));
    }
    require_owner_or_admin(actor, &assignee, "añadir una subtarea")?;

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    t.next_subtask_id += 1;
    let title = title.trim().to_string();
    t.subtasks.push(Subtask {
        id: t.next_subtask_id,
        title: title.clone(),
        description,
        completed: false,
        completed_at_utc: None,
    });
    t.updated_at_utc = now;
    push_history(t, actor, &format!("subtarea añadida: {title}"), now);
    Ok(t.clone())
}

/// Set a checklist item's completion flag. Idempotent: setting the value
/// it already has returns the task unchanged and writes no history.
pub fn toggle_subtask(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    subtask_id: u64,
    completed: bool,
) -> Result<Task> {
    let (state, assignee) = {
        let t = db.require(id)?;
        (t.state, t.assignee.clone())
    };
    if state.is_terminal() {
        return Err(Error::invalid_state("actualizar la subtarea", state));
    }
    require_owner_or_admin(actor, &assignee, "actualizar la subtarea")?;

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    let Some(pos) = t.subtasks.iter().position(|s| s.id == subtask_id) else {
        return Err(Error::not_found("subtarea", subtask_id));
    };
    if t.subtasks[pos].completed == completed {
        return Ok(t.clone());
    }
    t.subtasks[pos].completed = completed;
    t.subtasks[pos].completed_at_utc = completed.then_some(now);
    let description = if completed {
        format!("subtarea completada: {}", t.subtasks[pos].title)
    } else {
        format!("subtarea reabierta: {}", t.subtasks[pos].title)
    };
    t.updated_at_utc = now;
    push_history(t, actor, &description, now);
    Ok(t.clone())
}

/// Remove a checklist item. Rejected once the task is terminal.
pub fn remove_subtask(db: &mut Database, actor: &Actor, id: u64, subtask_id: u64) -> Result<Task> {
    let (state, assignee) = {
        let t = db.require(id)?;
        (t.state, t.assignee.clone())
    };
    if state.is_terminal() {
        return Err(Error::invalid_state("eliminar la subtarea", state));
    }
    require_owner_or_admin(actor, &assignee, "eliminar la subtarea")?;

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    let Some(pos) = t.subtasks.iter().position(|s| s.id == subtask_id) else {
        return Err(Error::not_found("subtarea", subtask_id));
    };
    let removed = t.subtasks.remove(pos);
    t.updated_at_utc = now;
    push_history(t, actor, &format!("subtarea eliminada: {}", removed.title), now);
    Ok(t.clone())
}

/// Append a comment. Comments are append-only and rejected once the task
/// is terminal.
pub fn add_comment(db: &mut Database, actor: &Actor, id: u64, content: &str) -> Result<Task> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::InvalidArgument(
            "el comentario no puede estar vacío".into(),
        ));
    }
    let (state, assignee) = {
        let t = db.require(id)?;
        (t.state, t.assignee.clone())
    };
    if state.is_terminal() {
        return Err(Error::invalid_state("comentar la tarea", state));
    }
    require_owner_or_admin(actor, &assignee, "comentar la tarea")?;

    let now = now_ts();
    let Some(t) = db.get_mut(id) else {
        return Err(Error::not_found("tarea", id));
    };
    t.comments.push(Comment {
        author: actor.id.clone(),
        author_name: actor.name.clone(),
        content: content.to_string(),
        at_utc: now,
    });
    t.updated_at_utc = now;
    push_history(t, actor, "comentario añadido", now);
    Ok(t.clone())
}

/// Hard-delete a task. Admin only, allowed from any state.
pub fn delete(db: &mut Database, actor: &Actor, id: u64) -> Result<Task> {
    require_admin(actor, "eliminar la tarea")?;
    let Some(pos) = db.tasks.iter().position(|t| t.id == id) else {
        return Err(Error::not_found("tarea", id));
    };
    Ok(db.tasks.remove(pos))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List tasks with optional filtering, sorting and pagination.
pub fn list(db: &Database, filter: &TaskFilter) -> TaskPage {
    let today = chrono::Local::now().date_naive();
    let (week_start, week_end) = start_end_of_this_week(today);
    let search = filter.search.as_ref().map(|s| s.to_lowercase());

    let mut matches: Vec<&Task> = db
        .tasks
        .iter()
        .filter(|t| {
            if !filter.include_closed && filter.state.is_none() && t.state.is_terminal() {
                return false;
            }
            if let Some(s) = filter.state {
                if t.state != s {
                    return false;
                }
            }
            if let Some(p) = filter.priority {
                if t.priority != p {
                    return false;
                }
            }
            if let Some(cid) = filter.category_id {
                if t.category_id != Some(cid) {
                    return false;
                }
            }
            for tid in &filter.tag_ids {
                if !t.tag_ids.contains(tid) {
                    return false;
                }
            }
            if let Some(a) = &filter.assignee {
                if &t.assignee != a {
                    return false;
                }
            }
            if let Some(df) = filter.due {
                match df {
                    DueFilter::Today => {
                        if t.due != Some(today) {
                            return false;
                        }
                    }
                    DueFilter::ThisWeek => match t.due {
                        Some(d) if d >= week_start && d <= week_end => {}
                        _ => return false,
                    },
                    DueFilter::Overdue => match t.due {
                        Some(d) if d < today => {}
                        _ => return false,
                    },
                    DueFilter::None => {
                        if t.due.is_some() {
                            return false;
                        }
                    }
                }
            }
            if let Some(from) = filter.from {
                match t.due {
                    Some(d) if d >= from => {}
                    _ => return false,
                }
            }
            if let Some(to) = filter.to {
                match t.due {
                    Some(d) if d <= to => {}
                    _ => return false,
                }
            }
            if let Some(q) = &search {
                let in_title = t.title.to_lowercase().contains(q);
                let in_body = t
                    .body
                    .as_ref()
                    .is_some_and(|b| b.to_lowercase().contains(q));
                let in_code = t.code.to_lowercase().contains(q);
                if !in_title && !in_body && !in_code {
                    return false;
                }
            }
            true
        })
        .collect();

    match filter.sort {
        SortKey::Due => matches.sort_by_key(|t| (t.due.unwrap_or(NaiveDate::MAX), t.id)),
        SortKey::Priority => matches.sort_by_key(|t| (t.priority.rank(), t.id)),
        SortKey::Id => matches.sort_by_key(|t| t.id),
    }

    let total = matches.len();
    let tasks: Vec<Task> = matches
        .into_iter()
        .skip(filter.offset)
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    TaskPage { tasks, total }
}

/// Aggregate counters across the whole task collection.
pub fn statistics(db: &Database, today: NaiveDate) -> TaskStats {
    let mut stats = TaskStats::default();
    for t in &db.tasks {
        stats.total += 1;
        match t.state {
            TaskState::Pendiente => stats.pendientes += 1,
            TaskState::EnProgreso => stats.en_progreso += 1,
            TaskState::EnRevision => stats.en_revision += 1,
            TaskState::Completada => stats.completadas += 1,
            TaskState::Cancelada => stats.canceladas += 1,
        }
        if !t.state.is_terminal() {
            if let Some(d) = t.due {
                if d < today {
                    stats.vencidas += 1;
                }
            }
            if t.priority == Priority::Urgente {
                stats.urgentes += 1;
            }
        }
    }
    stats
}

fn push_history(task: &mut Task, actor: &Actor, description: &str, now: i64) {
    task.history.push(HistoryEntry {
        description: description.to_string(),
        actor: actor.id.clone(),
        actor_name: actor.name.clone(),
        at_utc: now,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Role;

    fn admin() -> Actor {
        Actor::new("adm", "Marta Admin", Role::Admin)
    }

    fn owner() -> Actor {
        Actor::new("u1", "Luis Vendedor", Role::User)
    }

    fn other_user() -> Actor {
        Actor::new("u2", "Pepe Ajeno", Role::User)
    }

    fn create(db: &mut Database, spec: CreateSpec) -> Task {
        create_for(db, &admin(), "u1", "Luis Vendedor", &spec).unwrap()
    }

    fn force_state(db: &mut Database, id: u64, state: TaskState) {
        db.get_mut(id).unwrap().state = state;
    }

    #[test]
    fn create_validates_title_and_dates() {
        let mut db = Database::default();
        let err = create_for(&mut db, &admin(), "u1", "Luis", &CreateSpec::new("   "));
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let mut spec = CreateSpec::new("entrega");
        spec.scheduled = NaiveDate::from_ymd_opt(2026, 3, 10);
        spec.due = NaiveDate::from_ymd_opt(2026, 3, 5);
        let err = create_for(&mut db, &admin(), "u1", "Luis", &spec);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let mut spec = CreateSpec::new("inventario");
        spec.category_id = Some(99);
        let err = create_for(&mut db, &admin(), "u1", "Luis", &spec);
        assert!(matches!(err, Err(Error::NotFound { .. })));
    }

    #[test]
    fn creation_seeds_checklist_and_history() {
        let mut db = Database::default();
        let mut spec = CreateSpec::new("apertura de tienda");
        spec.subtasks = vec!["abrir caja".into(), "  ".into(), "revisar stock".into()];
        let t = create(&mut db, spec);
        assert_eq!(t.state, TaskState::Pendiente);
        assert_eq!(t.subtasks.len(), 2);
        assert_eq!(t.subtasks[0].id, 1);
        assert_eq!(t.subtasks[1].id, 2);
        assert_eq!(t.history.len(), 1);
        assert_eq!(t.history[0].description, "creada");
        assert_eq!(t.history[0].actor, "adm");
    }

    #[test]
    fn illegal_transitions_fail_invalid_state_and_leave_task_unchanged() {
        let all = [
            TaskState::Pendiente,
            TaskState::EnProgreso,
            TaskState::EnRevision,
            TaskState::Completada,
            TaskState::Cancelada,
        ];
        // Legal (from, to) pairs for the generic transition operation.
        let legal = |from: TaskState, to: TaskState| -> bool {
            matches!(
                (from, to),
                (TaskState::Pendiente, TaskState::EnProgreso)
                    | (TaskState::EnProgreso, TaskState::Pendiente)
                    | (TaskState::EnProgreso, TaskState::EnRevision)
                    | (TaskState::EnProgreso, TaskState::Completada)
                    | (TaskState::EnRevision, TaskState::Completada)
                    | (TaskState::EnRevision, TaskState::EnProgreso)
            ) || (to == TaskState::Cancelada && !from.is_terminal())
        };

        for from in all {
            for to in all {
                if legal(from, to) || from == to {
                    continue;
                }
                let mut db = Database::default();
                let t = create(&mut db, CreateSpec::new("fija"));
                force_state(&mut db, t.id, from);
                let before = db.get(t.id).unwrap().clone();
                let err = transition(&mut db, &admin(), t.id, to, from);
                assert!(
                    matches!(err, Err(Error::InvalidState { .. })),
                    "{from:?} -> {to:?} should be InvalidState"
                );
                let after = db.get(t.id).unwrap();
                assert_eq!(after.state, before.state);
                assert_eq!(after.history.len(), before.history.len());
            }
        }
    }

    #[test]
    fn stale_expected_state_conflicts() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("venta"));
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();

        // A second caller still believes the task is pendiente.
        let err = transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente);
        assert!(matches!(err, Err(Error::Conflict(_))));
        assert_eq!(db.get(t.id).unwrap().state, TaskState::EnProgreso);
    }

    #[test]
    fn owner_restriction_on_start_and_admin_override() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("conteo"));
        let err = transition(
            &mut db,
            &other_user(),
            t.id,
            TaskState::EnProgreso,
            TaskState::Pendiente,
        );
        assert!(matches!(err, Err(Error::Forbidden { .. })));

        // Admin may drive any task.
        transition(&mut db, &admin(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
    }

    #[test]
    fn cancel_is_admin_only_and_terminal() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("pedido"));
        let err = transition(&mut db, &owner(), t.id, TaskState::Cancelada, TaskState::Pendiente);
        assert!(matches!(err, Err(Error::Forbidden { .. })));

        let cancelled =
            transition(&mut db, &admin(), t.id, TaskState::Cancelada, TaskState::Pendiente)
                .unwrap();
        assert_eq!(cancelled.state, TaskState::Cancelada);

        let err = transition(
            &mut db,
            &admin(),
            t.id,
            TaskState::EnProgreso,
            TaskState::Cancelada,
        );
        assert!(matches!(err, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn review_gate_blocks_direct_completion() {
        let mut db = Database::default();
        let mut spec = CreateSpec::new("cierre de caja");
        spec.requires_review = true;
        let t = create(&mut db, spec);
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();

        let err = transition(
            &mut db,
            &owner(),
            t.id,
            TaskState::Completada,
            TaskState::EnProgreso,
        );
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        assert_eq!(db.get(t.id).unwrap().state, TaskState::EnProgreso);
    }

    #[test]
    fn tasks_without_review_cannot_enter_revision() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("reponer estantes"));
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        let err = transition(
            &mut db,
            &owner(),
            t.id,
            TaskState::EnRevision,
            TaskState::EnProgreso,
        );
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn full_review_cycle_reject_then_approve() {
        let mut db = Database::default();
        let mut spec = CreateSpec::new("auditoría semanal");
        spec.requires_review = true;
        spec.priority = Priority::Alta;
        let t = create(&mut db, spec);

        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::EnRevision, TaskState::EnProgreso).unwrap();

        // Owner cannot review their own submission.
        let err = review(&mut db, &owner(), t.id, ReviewResult::Aprobada, None);
        assert!(matches!(err, Err(Error::Forbidden { .. })));

        let rejected = review(
            &mut db,
            &admin(),
            t.id,
            ReviewResult::Rechazada,
            Some("faltan fotos".into()),
        )
        .unwrap();
        assert_eq!(rejected.state, TaskState::EnProgreso);
        assert_eq!(rejected.review_result, Some(ReviewResult::Rechazada));
        assert_eq!(rejected.review_comment.as_deref(), Some("faltan fotos"));
        assert!(rejected.completed_at_utc.is_none());

        transition(&mut db, &owner(), t.id, TaskState::EnRevision, TaskState::EnProgreso).unwrap();
        let approved = review(&mut db, &admin(), t.id, ReviewResult::Aprobada, None).unwrap();
        assert_eq!(approved.state, TaskState::Completada);
        assert_eq!(approved.review_result, Some(ReviewResult::Aprobada));
        assert!(approved.completed_at_utc.is_some());
        assert!(approved.reviewed_at_utc.is_some());
        assert_eq!(approved.reviewed_by.as_deref(), Some("adm"));
    }

    #[test]
    fn review_outside_revision_is_invalid_state() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("sin revisión"));
        let err = review(&mut db, &admin(), t.id, ReviewResult::Aprobada, None);
        assert!(matches!(err, Err(Error::InvalidState { .. })));
    }

    #[test]
    fn generic_transition_from_revision_records_review_fields() {
        let mut db = Database::default();
        let mut spec = CreateSpec::new("promo mensual");
        spec.requires_review = true;
        let t = create(&mut db, spec);
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::EnRevision, TaskState::EnProgreso).unwrap();

        let done = transition(
            &mut db,
            &admin(),
            t.id,
            TaskState::Completada,
            TaskState::EnRevision,
        )
        .unwrap();
        assert_eq!(done.state, TaskState::Completada);
        assert_eq!(done.review_result, Some(ReviewResult::Aprobada));
    }

    #[test]
    fn subtask_toggle_is_idempotent() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("checklist"));
        let t = add_subtask(&mut db, &owner(), t.id, "barrer", None).unwrap();
        let sid = t.subtasks[0].id;

        let first = toggle_subtask(&mut db, &owner(), t.id, sid, true).unwrap();
        let after_first = first.history.len();
        let second = toggle_subtask(&mut db, &owner(), t.id, sid, true).unwrap();
        assert!(second.subtasks[0].completed);
        assert_eq!(second.history.len(), after_first, "no-op must not write history");

        let reopened = toggle_subtask(&mut db, &owner(), t.id, sid, false).unwrap();
        assert!(!reopened.subtasks[0].completed);
        assert!(reopened.subtasks[0].completed_at_utc.is_none());
        assert_eq!(reopened.history.len(), after_first + 1);
    }

    #[test]
    fn checklist_and_comments_are_guarded_on_terminal_tasks() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("cerrada"));
        let t = add_subtask(&mut db, &owner(), t.id, "paso", None).unwrap();
        let sid = t.subtasks[0].id;
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::Completada, TaskState::EnProgreso).unwrap();

        assert!(matches!(
            add_subtask(&mut db, &owner(), t.id, "otro", None),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            toggle_subtask(&mut db, &owner(), t.id, sid, true),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            remove_subtask(&mut db, &owner(), t.id, sid),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            add_comment(&mut db, &owner(), t.id, "tarde"),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            update(&mut db, &owner(), t.id, &TaskPatch::default()),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn comments_require_content_and_record_author() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("con comentarios"));
        assert!(matches!(
            add_comment(&mut db, &owner(), t.id, "   "),
            Err(Error::InvalidArgument(_))
        ));
        let t = add_comment(&mut db, &owner(), t.id, "  primer avance  ").unwrap();
        assert_eq!(t.comments.len(), 1);
        assert_eq!(t.comments[0].content, "primer avance");
        assert_eq!(t.comments[0].author_name, "Luis Vendedor");
    }

    #[test]
    fn pause_preserves_checklist_and_comments() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("pausable"));
        add_subtask(&mut db, &owner(), t.id, "medir", None).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        add_comment(&mut db, &owner(), t.id, "a medias").unwrap();

        let paused =
            transition(&mut db, &owner(), t.id, TaskState::Pendiente, TaskState::EnProgreso)
                .unwrap();
        assert_eq!(paused.state, TaskState::Pendiente);
        assert_eq!(paused.subtasks.len(), 1);
        assert_eq!(paused.comments.len(), 1);
    }

    #[test]
    fn update_patches_fields_and_validates() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("editable"));

        let patch = TaskPatch {
            title: Some("editada ya".into()),
            priority: Some(Priority::Urgente),
            due: NaiveDate::from_ymd_opt(2026, 9, 1),
            ..TaskPatch::default()
        };
        let updated = update(&mut db, &owner(), t.id, &patch).unwrap();
        assert_eq!(updated.title, "editada ya");
        assert_eq!(updated.priority, Priority::Urgente);
        assert!(updated
            .history
            .last()
            .unwrap()
            .description
            .starts_with("editada ("));

        let bad = TaskPatch {
            scheduled: NaiveDate::from_ymd_opt(2026, 9, 10),
            ..TaskPatch::default()
        };
        assert!(matches!(
            update(&mut db, &owner(), t.id, &bad),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn delete_is_admin_only_and_hard() {
        let mut db = Database::default();
        let t = create(&mut db, CreateSpec::new("borrable"));
        assert!(matches!(
            delete(&mut db, &owner(), t.id),
            Err(Error::Forbidden { .. })
        ));
        delete(&mut db, &admin(), t.id).unwrap();
        assert!(db.get(t.id).is_none());
        assert!(matches!(
            delete(&mut db, &admin(), t.id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn list_filters_and_paginates() {
        let mut db = Database::default();
        for i in 0..5 {
            let mut spec = CreateSpec::new(format!("tarea {i}"));
            if i % 2 == 0 {
                spec.priority = Priority::Urgente;
            }
            create(&mut db, spec);
        }
        let page = list(
            &db,
            &TaskFilter {
                priority: Some(Priority::Urgente),
                ..TaskFilter::default()
            },
        );
        assert_eq!(page.total, 3);

        let page = list(
            &db,
            &TaskFilter {
                limit: Some(2),
                offset: 2,
                sort: SortKey::Id,
                ..TaskFilter::default()
            },
        );
        assert_eq!(page.total, 5);
        assert_eq!(page.tasks.len(), 2);
        assert_eq!(page.tasks[0].title, "tarea 2");

        let page = list(
            &db,
            &TaskFilter {
                search: Some("TAREA 4".into()),
                ..TaskFilter::default()
            },
        );
        assert_eq!(page.total, 1);
    }

    #[test]
    fn statistics_counts_states_overdue_and_urgent() {
        let mut db = Database::default();
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();

        let mut spec = CreateSpec::new("vencida urgente");
        spec.priority = Priority::Urgente;
        spec.due = NaiveDate::from_ymd_opt(2026, 8, 1);
        create(&mut db, spec);

        let t = create(&mut db, CreateSpec::new("terminada"));
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::Completada, TaskState::EnProgreso).unwrap();

        let mut spec = CreateSpec::new("en revisión");
        spec.requires_review = true;
        let t = create(&mut db, spec);
        transition(&mut db, &owner(), t.id, TaskState::EnProgreso, TaskState::Pendiente).unwrap();
        transition(&mut db, &owner(), t.id, TaskState::EnRevision, TaskState::EnProgreso).unwrap();

        let stats = statistics(&db, today);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pendientes, 1);
        assert_eq!(stats.en_revision, 1);
        assert_eq!(stats.completadas, 1);
        assert_eq!(stats.vencidas, 1);
        assert_eq!(stats.urgentes, 1);
    }
}
