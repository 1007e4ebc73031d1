//! End-to-end lifecycle scenarios driven through the public engine API,
//! persisting the database between steps the way the CLI does.

use chrono::NaiveDate;

use tareas::db::Database;
use tareas::directory::Actor;
use tareas::engine::{self, CreateSpec};
use tareas::error::Error;
use tareas::fields::{Priority, ReviewResult, Role, TaskState};

fn admin() -> Actor {
    Actor::new("marta", "Marta Admin", Role::Admin)
}

fn worker() -> Actor {
    Actor::new("luis", "Luis Vendedor", Role::User)
}

#[test]
fn reviewed_task_full_cycle_survives_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tareas.json");

    // An admin creates a reviewed, high-priority task for Luis.
    let mut db = Database::default();
    let mut spec = CreateSpec::new("Cierre de caja semanal");
    spec.requires_review = true;
    spec.priority = Priority::Alta;
    spec.subtasks = vec!["contar efectivo".into(), "archivar tickets".into()];
    let task = engine::create_for(&mut db, &admin(), "luis", "Luis Vendedor", &spec).unwrap();
    let id = task.id;
    db.save(&path).unwrap();

    // Luis starts working and checks items off.
    let mut db = Database::load(&path);
    engine::transition(&mut db, &worker(), id, TaskState::EnProgreso, TaskState::Pendiente)
        .unwrap();
    engine::toggle_subtask(&mut db, &worker(), id, 1, true).unwrap();
    engine::toggle_subtask(&mut db, &worker(), id, 2, true).unwrap();
    engine::transition(&mut db, &worker(), id, TaskState::EnRevision, TaskState::EnProgreso)
        .unwrap();
    db.save(&path).unwrap();

    // The admin rejects the first submission.
    let mut db = Database::load(&path);
    let rejected = engine::review(
        &mut db,
        &admin(),
        id,
        ReviewResult::Rechazada,
        Some("falta la firma".into()),
    )
    .unwrap();
    assert_eq!(rejected.state, TaskState::EnProgreso);
    assert!(rejected.completed_at_utc.is_none());
    // Prior work is untouched by the rejection.
    assert!(rejected.subtasks.iter().all(|s| s.completed));
    db.save(&path).unwrap();

    // Second round: resubmit and approve.
    let mut db = Database::load(&path);
    engine::transition(&mut db, &worker(), id, TaskState::EnRevision, TaskState::EnProgreso)
        .unwrap();
    let approved = engine::review(&mut db, &admin(), id, ReviewResult::Aprobada, None).unwrap();
    assert_eq!(approved.state, TaskState::Completada);
    assert!(approved.completed_at_utc.is_some());
    assert_eq!(approved.review_result, Some(ReviewResult::Aprobada));
    db.save(&path).unwrap();

    // The whole trail survives persistence.
    let db = Database::load(&path);
    let t = db.get(id).unwrap();
    assert_eq!(t.state, TaskState::Completada);
    assert_eq!(t.reviewed_by.as_deref(), Some("marta"));
    let descriptions: Vec<&str> = t.history.iter().map(|h| h.description.as_str()).collect();
    assert!(descriptions.contains(&"creada"));
    assert!(descriptions.contains(&"iniciada"));
    assert!(descriptions.contains(&"enviada a revisión"));
    assert!(descriptions
        .iter()
        .any(|d| d.starts_with("revisión rechazada")));
    assert!(descriptions.contains(&"revisión aprobada"));
}

#[test]
fn concurrent_transitions_one_wins_one_conflicts() {
    let mut db = Database::default();
    let task = engine::create_for(
        &mut db,
        &admin(),
        "luis",
        "Luis Vendedor",
        &CreateSpec::new("Reponer lineal"),
    )
    .unwrap();

    // Both callers observed pendiente; only the first CAS succeeds.
    engine::transition(&mut db, &worker(), task.id, TaskState::EnProgreso, TaskState::Pendiente)
        .unwrap();
    let second = engine::transition(
        &mut db,
        &admin(),
        task.id,
        TaskState::Cancelada,
        TaskState::Pendiente,
    );
    assert!(matches!(second, Err(Error::Conflict(_))));
    assert_eq!(db.get(task.id).unwrap().state, TaskState::EnProgreso);
}

#[test]
fn idempotent_toggle_survives_reload_without_history_noise() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tareas.json");

    let mut db = Database::default();
    let mut spec = CreateSpec::new("Limpieza de vitrinas");
    spec.subtasks = vec!["cristales".into()];
    let task = engine::create_for(&mut db, &admin(), "luis", "Luis Vendedor", &spec).unwrap();
    engine::toggle_subtask(&mut db, &worker(), task.id, 1, true).unwrap();
    db.save(&path).unwrap();

    // A retried CLI call sets the same value again after a reload.
    let mut db = Database::load(&path);
    let before = db.get(task.id).unwrap().history.len();
    let t = engine::toggle_subtask(&mut db, &worker(), task.id, 1, true).unwrap();
    assert!(t.subtasks[0].completed);
    assert_eq!(t.history.len(), before);
}

#[test]
fn scheduling_constraint_is_checked_at_creation() {
    let mut db = Database::default();
    let mut spec = CreateSpec::new("Promoción de otoño");
    spec.scheduled = NaiveDate::from_ymd_opt(2026, 10, 10);
    spec.due = NaiveDate::from_ymd_opt(2026, 10, 1);
    let err = engine::create_for(&mut db, &admin(), "luis", "Luis", &spec);
    assert!(matches!(err, Err(Error::InvalidArgument(_))));

    spec.due = NaiveDate::from_ymd_opt(2026, 10, 20);
    engine::create_for(&mut db, &admin(), "luis", "Luis", &spec).unwrap();
}

#[test]
fn terminal_states_reject_every_followup() {
    let mut db = Database::default();
    let task = engine::create_for(
        &mut db,
        &admin(),
        "luis",
        "Luis Vendedor",
        &CreateSpec::new("Puntual"),
    )
    .unwrap();
    engine::transition(&mut db, &admin(), task.id, TaskState::Cancelada, TaskState::Pendiente)
        .unwrap();

    assert!(matches!(
        engine::transition(&mut db, &admin(), task.id, TaskState::EnProgreso, TaskState::Cancelada),
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        engine::add_subtask(&mut db, &admin(), task.id, "tarde", None),
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        engine::add_comment(&mut db, &admin(), task.id, "tarde"),
        Err(Error::InvalidState { .. })
    ));
}
