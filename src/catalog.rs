//! Category and tag registries.
//!
//! Flat label tables with soft-deactivation: a label referenced by any
//! task or template is never physically removed — deleting it flips
//! `active` off instead, so historical references keep resolving. A
//! one-shot idempotent seeding operation installs the stock retail
//! labels on a fresh database.

use crate::db::Database;
use crate::directory::Actor;
use crate::engine::require_admin;
use crate::error::{Error, Result};
use crate::task::{Category, Tag};

/// Stock categories for a fresh install: (name, code, color).
const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Ventas", "VEN", "#2563eb"),
    ("Inventario", "INV", "#16a34a"),
    ("Administración", "ADM", "#9333ea"),
    ("Limpieza", "LIM", "#f59e0b"),
    ("General", "TAR", "#6b7280"),
];

/// Stock tags: (name, color).
const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("urgente", "#dc2626"),
    ("seguimiento", "#0ea5e9"),
    ("equipo", "#10b981"),
];

/// What `remove_category`/`remove_tag` actually did.
#[derive(Debug, PartialEq, Eq)]
pub enum Removal {
    /// Nothing referenced the label; it is gone.
    Removed,
    /// The label is referenced, so it was deactivated instead.
    Deactivated,
}

/// Create a category. Admin only; codes are unique case-insensitively.
pub fn add_category(
    db: &mut Database,
    actor: &Actor,
    name: &str,
    code: Option<String>,
    color: Option<String>,
) -> Result<Category> {
    require_admin(actor, "crear una categoría")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "el nombre de la categoría es obligatorio".into(),
        ));
    }
    let code = code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty());
    if let Some(c) = &code {
        if category_code_taken(db, c, None) {
            return Err(Error::Conflict(format!(
                "ya existe una categoría con código '{c}'"
            )));
        }
    }
    let cat = Category {
        id: db.alloc_label_id(),
        name: name.to_string(),
        code,
        color,
        active: true,
    };
    db.categories.push(cat.clone());
    Ok(cat)
}

/// Patch a category's name/code/color or reactivate it. Admin only.
pub fn update_category(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    name: Option<String>,
    code: Option<String>,
    color: Option<String>,
    active: Option<bool>,
) -> Result<Category> {
    require_admin(actor, "editar la categoría")?;
    db.category(id)
        .ok_or_else(|| Error::not_found("categoría", id))?;

    let code = code.map(|c| c.trim().to_uppercase());
    if let Some(c) = &code {
        if !c.is_empty() && category_code_taken(db, c, Some(id)) {
            return Err(Error::Conflict(format!(
                "ya existe una categoría con código '{c}'"
            )));
        }
    }

    let Some(cat) = db.category_mut(id) else {
        return Err(Error::not_found("categoría", id));
    };
    if let Some(n) = name {
        let n = n.trim().to_string();
        if n.is_empty() {
            return Err(Error::InvalidArgument(
                "el nombre de la categoría es obligatorio".into(),
            ));
        }
        cat.name = n;
    }
    if let Some(c) = code {
        cat.code = if c.is_empty() { None } else { Some(c) };
    }
    if let Some(c) = color {
        cat.color = if c.is_empty() { None } else { Some(c) };
    }
    if let Some(a) = active {
        cat.active = a;
    }
    Ok(cat.clone())
}

/// Delete a category: hard-removed only when nothing references it,
/// soft-deactivated otherwise. Reads against dangling ids never fail.
pub fn remove_category(db: &mut Database, actor: &Actor, id: u64) -> Result<Removal> {
    require_admin(actor, "eliminar la categoría")?;
    db.category(id)
        .ok_or_else(|| Error::not_found("categoría", id))?;

    if category_references(db, id) > 0 {
        if let Some(cat) = db.category_mut(id) {
            cat.active = false;
        }
        return Ok(Removal::Deactivated);
    }
    db.categories.retain(|c| c.id != id);
    Ok(Removal::Removed)
}

/// Number of tasks and templates referencing the category.
pub fn category_references(db: &Database, id: u64) -> usize {
    let in_tasks = db.tasks.iter().filter(|t| t.category_id == Some(id)).count();
    let in_templates = db
        .templates
        .iter()
        .filter(|t| t.category_id == Some(id))
        .count();
    in_tasks + in_templates
}

/// Create a tag. Admin only; names are unique case-insensitively.
pub fn add_tag(
    db: &mut Database,
    actor: &Actor,
    name: &str,
    color: Option<String>,
) -> Result<Tag> {
    require_admin(actor, "crear una etiqueta")?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "el nombre de la etiqueta es obligatorio".into(),
        ));
    }
    if tag_name_taken(db, name, None) {
        return Err(Error::Conflict(format!(
            "ya existe una etiqueta llamada '{name}'"
        )));
    }
    let tag = Tag {
        id: db.alloc_label_id(),
        name: name.to_string(),
        color,
        active: true,
    };
    db.tags.push(tag.clone());
    Ok(tag)
}

/// Patch a tag's name/color or reactivate it. Admin only.
pub fn update_tag(
    db: &mut Database,
    actor: &Actor,
    id: u64,
    name: Option<String>,
    color: Option<String>,
    active: Option<bool>,
) -> Result<Tag> {
    require_admin(actor, "editar la etiqueta")?;
    db.tag(id).ok_or_else(|| Error::not_found("etiqueta", id))?;

    if let Some(n) = &name {
        let n = n.trim();
        if n.is_empty() {
            return Err(Error::InvalidArgument(
                "el nombre de la etiqueta es obligatorio".into(),
            ));
        }
        if tag_name_taken(db, n, Some(id)) {
            return Err(Error::Conflict(format!(
                "ya existe una etiqueta llamada '{n}'"
            )));
        }
    }

    let Some(tag) = db.tag_mut(id) else {
        return Err(Error::not_found("etiqueta", id));
    };
    if let Some(n) = name {
        tag.name = n.trim().to_string();
    }
    if let Some(c) = color {
        tag.color = if c.is_empty() { None } else { Some(c) };
    }
    if let Some(a) = active {
        tag.active = a;
    }
    Ok(tag.clone())
}

/// Delete a tag under the same referenced-label rules as categories.
pub fn remove_tag(db: &mut Database, actor: &Actor, id: u64) -> Result<Removal> {
    require_admin(actor, "eliminar la etiqueta")?;
    db.tag(id).ok_or_else(|| Error::not_found("etiqueta", id))?;

    if tag_references(db, id) > 0 {
        if let Some(tag) = db.tag_mut(id) {
            tag.active = false;
        }
        return Ok(Removal::Deactivated);
    }
    db.tags.retain(|t| t.id != id);
    Ok(Removal::Removed)
}

/// Number of tasks and templates referencing the tag.
pub fn tag_references(db: &Database, id: u64) -> usize {
    let in_tasks = db.tasks.iter().filter(|t| t.tag_ids.contains(&id)).count();
    let in_templates = db
        .templates
        .iter()
        .filter(|t| t.tag_ids.contains(&id))
        .count();
    in_tasks + in_templates
}

/// Seed the stock categories and tags. Idempotent: existing codes and
/// names are skipped, so re-running never duplicates. Returns how many
/// labels were inserted.
pub fn seed_defaults(db: &mut Database, actor: &Actor) -> Result<usize> {
    require_admin(actor, "inicializar las etiquetas predeterminadas")?;
    let mut inserted = 0;
    for &(name, code, color) in DEFAULT_CATEGORIES {
        if category_code_taken(db, code, None) {
            continue;
        }
        let id = db.alloc_label_id();
        db.categories.push(Category {
            id,
            name: name.to_string(),
            code: Some(code.to_string()),
            color: Some(color.to_string()),
            active: true,
        });
        inserted += 1;
    }
    for &(name, color) in DEFAULT_TAGS {
        if tag_name_taken(db, name, None) {
            continue;
        }
        let id = db.alloc_label_id();
        db.tags.push(Tag {
            id,
            name: name.to_string(),
            color: Some(color.to_string()),
            active: true,
        });
        inserted += 1;
    }
    Ok(inserted)
}

fn category_code_taken(db: &Database, code: &str, except: Option<u64>) -> bool {
    db.categories.iter().any(|c| {
        Some(c.id) != except
            && c.code
                .as_deref()
                .is_some_and(|existing| existing.eq_ignore_ascii_case(code))
    })
}

fn tag_name_taken(db: &Database, name: &str, except: Option<u64>) -> bool {
    db.tags
        .iter()
        .any(|t| Some(t.id) != except && t.name.eq_ignore_ascii_case(name))
}
