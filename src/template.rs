//! Template store: reusable task blueprints.
//!
//! Instantiating a template yields a `CreateSpec` ready for the
//! assignment resolver: field defaults copied, the due date computed
//! from the template's day offset, and the usage counter bumped. The
//! counter is an auxiliary side effect — its failure is logged, never
//! allowed to sink the instantiation itself.

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::db::Database;
use crate::directory::Actor;
use crate::engine::{now_ts, require_admin, CreateSpec};
use crate::error::{Error, Result};
use crate::fields::Priority;
use crate::task::Template;

/// Input for creating a template.
#[derive(Debug, Clone)]
pub struct TemplateSpec {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub title: String,
    pub body: Option<String>,
    pub category_id: Option<u64>,
    pub priority: Priority,
    pub days_to_due: Option<i64>,
    pub subtasks: Vec<String>,
    pub tag_ids: Vec<u64>,
    pub permanent: bool,
}

/// Editable template fields; `None` leaves a field untouched.
#[derive(Debug, Default, Clone)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub category_id: Option<u64>,
    pub priority: Option<Priority>,
    pub days_to_due: Option<i64>,
    pub subtasks: Option<Vec<String>>,
    pub tag_ids: Option<Vec<u64>>,
    pub permanent: Option<bool>,
    pub clear_days_to_due: bool,
    pub clear_category: bool,
}

fn code_taken(db: &Database, code: &str, except: Option<u64>) -> bool {
    db.templates
        .iter()
        .any(|t| Some(t.id) != except && t.code.eq_ignore_ascii_case(code))
}

fn validate_refs(db: &Database, category_id: Option<u64>, tag_ids: &[u64]) -> Result<()> {
    if let Some(cid) = category_id {
        if db.category(cid).is_none() {
            return Err(Error::not_found("categoría", cid));
        }
    }
    for &tid in tag_ids {
        if db.tag(tid).is_none() {
            return Err(Error::not_found("etiqueta", tid));
        }
    }
    Ok(())
}

/// Create a template. Admin only; the code must be unique
/// (case-insensitive) across the store.
pub fn create_template(db: &mut Database, actor: &Actor, spec: &TemplateSpec) -> Result<Template> {
    require_admin(actor, "crear una plantilla")?;
    if spec.name.trim().is_empty() || spec.title.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "la plantilla necesita nombre y título".into(),
        ));
    }
    let code = spec.code.trim();
    if code.is_empty() {
        return Err(Error::InvalidArgument(
            "el código de la plantilla es obligatorio".into(),
        ));
    }
    if code_taken(db, code, None) {
        return Err(Error::Conflict(format!(
            "ya existe una plantilla con código '{code}'"
        )));
    }
    if spec.days_to_due.is_some_and(|d| d < 0) {
        return Err(Error::InvalidArgument(
            "los días para vencimiento no pueden ser negativos".into(),
        ));
    }
    validate_refs(db, spec.category_id, &spec.tag_ids)?;

    let template = Template {
        id: db.alloc_template_id(),
        name: spec.name.trim().to_string(),
        code: code.to_string(),
        description: spec.description.clone(),
        title: spec.title.trim().to_string(),
        body: spec.body.clone(),
        category_id: spec.category_id,
        priority: spec.priority,
        days_to_due: spec.days_to_due,
        subtasks: spec
            .subtasks
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        tag_ids: spec.tag_ids.clone(),
        permanent: spec.permanent,
        times_used: 0,
        created_at_utc: now_ts(),
    };
    db.templates.push(template.clone());
    Ok(template)
}

/// Patch an existing template. Admin only.
pub fn update_template(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    patch: &TemplatePatch,
) -> Result<Template> {
    require_admin(actor, "editar la plantilla")?;
    db.template(id)
        .ok_or_else(|| Error::not_found("plantilla", id))?;

    if let Some(code) = &patch.code {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidArgument(
                "el código de la plantilla es obligatorio".into(),
            ));
        }
        if code_taken(db, code, Some(id)) {
            return Err(Error::Conflict(format!(
                "ya existe una plantilla con código '{code}'"
            )));
        }
    }
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "el nombre de la plantilla es obligatorio".into(),
            ));
        }
    }
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "el título de la plantilla es obligatorio".into(),
            ));
        }
    }
    if patch.days_to_due.is_some_and(|d| d < 0) {
        return Err(Error::InvalidArgument(
            "los días para vencimiento no pueden ser negativos".into(),
        ));
    }
    validate_refs(
        db,
        patch.category_id,
        patch.tag_ids.as_deref().unwrap_or(&[]),
    )?;

    let Some(t) = db.template_mut(id) else {
        return Err(Error::not_found("plantilla", id));
    };
    if let Some(name) = &patch.name {
        t.name = name.trim().to_string();
    }
    if let Some(code) = &patch.code {
        t.code = code.trim().to_string();
    }
    if let Some(d) = &patch.description {
        t.description = Some(d.clone());
    }
    if let Some(title) = &patch.title {
        t.title = title.trim().to_string();
    }
    if let Some(body) = &patch.body {
        t.body = Some(body.clone());
    }
    if patch.clear_category {
        t.category_id = None;
    } else if let Some(cid) = patch.category_id {
        t.category_id = Some(cid);
    }
    if let Some(p) = patch.priority {
        t.priority = p;
    }
    if patch.clear_days_to_due {
        t.days_to_due = None;
    } else if let Some(d) = patch.days_to_due {
        t.days_to_due = Some(d);
    }
    if let Some(subs) = &patch.subtasks {
        t.subtasks = subs
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(tids) = &patch.tag_ids {
        t.tag_ids = tids.clone();
    }
    if let Some(p) = patch.permanent {
        t.permanent = p;
    }
    Ok(t.clone())
}

/// Hard-delete a template. Tasks keep their provenance reference.
pub fn delete_template(db: &mut Database, actor: &Actor, id: u64) -> Result<Template> {
    require_admin(actor, "eliminar la plantilla")?;
    let Some(pos) = db.templates.iter().position(|t| t.id == id) else {
        return Err(Error::not_found("plantilla", id));
    };
    Ok(db.templates.remove(pos))
}

/// Deep-copy a template into a new, independently editable record with a
/// fresh usage counter and a uniquified code.
pub fn duplicate(db: &mut Database, actor: &Actor, id: u64) -> Result<Template> {
    require_admin(actor, "duplicar la plantilla")?;
    let original = db
        .template(id)
        .ok_or_else(|| Error::not_found("plantilla", id))?
        .clone();

    let mut code = format!("{}-copia", original.code);
    let mut n = 2;
    while code_taken(db, &code, None) {
        code = format!("{}-copia-{n}", original.code);
        n += 1;
    }

    let copy = Template {
        id: db.alloc_template_id(),
        name: format!("{} (copia)", original.name),
        code,
        times_used: 0,
        created_at_utc: now_ts(),
        ..original
    };
    db.templates.push(copy.clone());
    Ok(copy)
}

/// Expand a template into a creation spec.
///
/// `due` is computed as `today + days_to_due` when the template defines
/// the offset; callers overriding the due date simply replace it on the
/// returned spec. Bumps `times_used` — instantiation, not lookup, is the
/// observable usage.
pub fn instantiate(db: &mut Database, id: u64, today: NaiveDate) -> Result<CreateSpec> {
    let t = db
        .template(id)
        .ok_or_else(|| Error::not_found("plantilla", id))?;

    let spec = CreateSpec {
        title: t.title.clone(),
        body: t.body.clone(),
        priority: t.priority,
        requires_review: false,
        scheduled: None,
        due: t.days_to_due.map(|n| today + Duration::days(n)),
        category_id: t.category_id,
        tag_ids: t.tag_ids.clone(),
        subtasks: t.subtasks.clone(),
        template_id: Some(t.id),
    };

    // Usage counting is auxiliary: losing it must not lose the spec.
    match db.template_mut(id) {
        Some(t) => t.times_used += 1,
        None => warn!(plantilla = id, "no se pudo registrar el uso de la plantilla"),
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Role;

    fn admin() -> Actor {
        Actor::new("adm", "Marta Admin", Role::Admin)
    }

    fn spec(name: &str, code: &str) -> TemplateSpec {
        TemplateSpec {
            name: name.into(),
            code: code.into(),
            description: None,
            title: format!("plantilla {name}"),
            body: None,
            category_id: None,
            priority: Priority::Media,
            days_to_due: None,
            subtasks: Vec::new(),
            tag_ids: Vec::new(),
            permanent: false,
        }
    }

    #[test]
    fn codes_are_unique_case_insensitive() {
        let mut db = Database::default();
        create_template(&mut db, &admin(), &spec("apertura", "APE")).unwrap();
        let err = create_template(&mut db, &admin(), &spec("otra", "ape"));
        assert!(matches!(err, Err(Error::Conflict(_))));
    }

    #[test]
    fn mutation_is_admin_only() {
        let mut db = Database::default();
        let user = Actor::new("u1", "Luis", Role::User);
        assert!(matches!(
            create_template(&mut db, &user, &spec("x", "X")),
            Err(Error::Forbidden { .. })
        ));
    }

    #[test]
    fn instantiate_computes_due_and_counts_usage() {
        let mut db = Database::default();
        let mut s = spec("auditoría", "AUD");
        s.days_to_due = Some(7);
        s.subtasks = vec!["contar caja".into(), "firmar acta".into()];
        let t = create_template(&mut db, &admin(), &s).unwrap();
        assert_eq!(t.times_used, 0);

        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let created = instantiate(&mut db, t.id, today).unwrap();
        assert_eq!(created.due, NaiveDate::from_ymd_opt(2024, 1, 8));
        assert_eq!(created.subtasks.len(), 2);
        assert_eq!(created.template_id, Some(t.id));
        assert_eq!(db.template(t.id).unwrap().times_used, 1);

        instantiate(&mut db, t.id, today).unwrap();
        assert_eq!(db.template(t.id).unwrap().times_used, 2);
    }

    #[test]
    fn instantiate_without_offset_leaves_due_unset() {
        let mut db = Database::default();
        let t = create_template(&mut db, &admin(), &spec("libre", "LIB")).unwrap();
        let created =
            instantiate(&mut db, t.id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert_eq!(created.due, None);
    }

    #[test]
    fn duplicate_resets_counter_and_uniquifies_code() {
        let mut db = Database::default();
        let mut s = spec("cierre", "CIE");
        s.subtasks = vec!["apagar luces".into()];
        let t = create_template(&mut db, &admin(), &s).unwrap();
        instantiate(&mut db, t.id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();

        let copy = duplicate(&mut db, &admin(), t.id).unwrap();
        assert_ne!(copy.id, t.id);
        assert_eq!(copy.code, "CIE-copia");
        assert_eq!(copy.times_used, 0);
        assert_eq!(copy.subtasks, vec!["apagar luces".to_string()]);

        let copy2 = duplicate(&mut db, &admin(), t.id).unwrap();
        assert_eq!(copy2.code, "CIE-copia-2");

        // Editing the copy leaves the original untouched.
        let patch = TemplatePatch {
            title: Some("otro título".into()),
            ..TemplatePatch::default()
        };
        update_template(&mut db, &admin(), copy.id, &patch).unwrap();
        assert_eq!(db.template(t.id).unwrap().title, "plantilla cierre");
    }

    #[test]
    fn delete_removes_the_template() {
        let mut db = Database::default();
        let t = create_template(&mut db, &admin(), &spec("efímera", "EFI")).unwrap();
        delete_template(&mut db, &admin(), t.id).unwrap();
        assert!(db.template(t.id).is_none());
        assert!(matches!(
            instantiate(&mut db, t.id, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            Err(Error::NotFound { .. })
        ));
    }
}
