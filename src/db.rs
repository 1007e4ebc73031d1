//! Database operations and utility functions for the task engine.
//!
//! This module provides the `Database` struct holding every collection
//! (tasks, templates, categories, tags) plus the id and code sequences,
//! along with date parsing/formatting helpers shared by the CLI layer.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Category, Tag, Task, Template};

/// In-memory database for tasks, templates and label registries.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Monotonic id counters per collection.
    #[serde(default)]
    pub next_task_id: u64,
    #[serde(default)]
    pub next_template_id: u64,
    #[serde(default)]
    pub next_label_id: u64,
    /// Per-prefix counters backing the human-readable task codes.
    #[serde(default)]
    pub code_seqs: BTreeMap<String, u64>,
}

impl Database {
    /// Load database from JSON file, creating a new empty database if the
    /// file doesn't exist.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Database::default();
        }
        let mut buf = String::new();
        match File::open(path).and_then(|mut f| f.read_to_string(&mut buf)) {
            Ok(_) => match serde_json::from_str(&buf) {
                Ok(db) => db,
                Err(e) => {
                    eprintln!("Error parsing DB, starting fresh: {e}");
                    Database::default()
                }
            },
            Err(e) => {
                eprintln!("Error reading DB, starting fresh: {e}");
                Database::default()
            }
        }
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        // Atomic-ish write via temp + rename.
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Allocate the next task id.
    pub fn alloc_task_id(&mut self) -> u64 {
        // Older databases carry no counter; derive it from the data.
        if self.next_task_id == 0 {
            self.next_task_id = self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        }
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    /// Allocate the next template id.
    pub fn alloc_template_id(&mut self) -> u64 {
        if self.next_template_id == 0 {
            self.next_template_id = self.templates.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        }
        let id = self.next_template_id;
        self.next_template_id += 1;
        id
    }

    /// Allocate the next label (category/tag) id. Both registries share
    /// one sequence so ids stay unambiguous in error messages.
    pub fn alloc_label_id(&mut self) -> u64 {
        if self.next_label_id == 0 {
            let max_cat = self.categories.iter().map(|c| c.id).max().unwrap_or(0);
            let max_tag = self.tags.iter().map(|t| t.id).max().unwrap_or(0);
            self.next_label_id = max_cat.max(max_tag) + 1;
        }
        let id = self.next_label_id;
        self.next_label_id += 1;
        id
    }

    /// Produce the next human-readable task code for a category prefix,
    /// e.g. "VEN-0007". Tasks without a coded category fall back to "TAR".
    pub fn next_code(&mut self, category_id: Option<u64>) -> String {
        let prefix = category_id
            .and_then(|cid| self.category(cid))
            .and_then(|c| c.code.clone())
            .unwrap_or_else(|| "TAR".to_string());
        let seq = self.code_seqs.entry(prefix.clone()).or_insert(0);
        *seq += 1;
        format!("{}-{:04}", prefix, seq)
    }

    /// Get a task by id.
    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Get a mutable reference to a task by id.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Get a task by id, or a `NotFound` error.
    pub fn require(&self, id: u64) -> Result<&Task> {
        self.get(id).ok_or_else(|| Error::not_found("tarea", id))
    }

    /// Get a template by id.
    pub fn template(&self, id: u64) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Get a mutable template by id.
    pub fn template_mut(&mut self, id: u64) -> Option<&mut Template> {
        self.templates.iter_mut().find(|t| t.id == id)
    }

    /// Get a category by id.
    pub fn category(&self, id: u64) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Get a mutable category by id.
    pub fn category_mut(&mut self, id: u64) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == id)
    }

    /// Get a tag by id.
    pub fn tag(&self, id: u64) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    /// Get a mutable tag by id.
    pub fn tag_mut(&mut self, id: u64) -> Option<&mut Tag> {
        self.tags.iter_mut().find(|t| t.id == id)
    }
}

/// Parse human-readable due date input.
///
/// Supports:
/// - "hoy"/"today", "mañana"/"tomorrow"
/// - "in 3d" / "en 3d", "in 2w" / "en 2w"
/// - "YYYY-MM-DD" format
pub fn parse_due_input(s: &str) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();
    let today = Local::now().date_naive();

    match s.as_str() {
        "hoy" | "today" => return Some(today),
        "mañana" | "manana" | "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }

    // "in X" / "en X" patterns
    let rest = s.strip_prefix("in ").or_else(|| s.strip_prefix("en "));
    if let Some(rest) = rest {
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return Some(today + Duration::days(days));
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return Some(today + Duration::weeks(weeks));
            }
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Calculate the start and end dates of the current ISO week (Monday to Sunday).
pub fn start_end_of_this_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    // ISO week: Monday start.
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday);
    let end = start + Duration::days(6);
    (start, end)
}

/// Format a due date relative to today ("hoy", "mañana", "en 3d", "2d tarde").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = d - today;
            if delta.num_days() == 0 {
                "hoy".into()
            } else if delta.num_days() == 1 {
                "mañana".into()
            } else if delta.num_days() > 1 {
                format!("en {}d", delta.num_days())
            } else {
                format!("{}d tarde", -delta.num_days())
            }
        }
    }
}

/// Resolve a task identifier (numeric id, code like "VEN-0007", or exact
/// title) to a task id. Ambiguous titles ask for the id instead.
pub fn resolve_task_identifier(identifier: &str, db: &Database) -> Result<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return if db.get(id).is_some() {
            Ok(id)
        } else {
            Err(Error::not_found("tarea", id))
        };
    }

    if let Some(t) = db
        .tasks
        .iter()
        .find(|t| t.code.eq_ignore_ascii_case(identifier))
    {
        return Ok(t.id);
    }

    let matches: Vec<&Task> = db
        .tasks
        .iter()
        .filter(|t| t.title.to_lowercase() == identifier.to_lowercase())
        .collect();
    match matches.len() {
        0 => Err(Error::not_found("tarea", identifier)),
        1 => Ok(matches[0].id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|t| t.code.clone()).collect();
            Err(Error::InvalidArgument(format!(
                "varias tareas se llaman '{identifier}' ({}); usa el código",
                ids.join(", ")
            )))
        }
    }
}

/// Resolve a template identifier (numeric id, code, or exact name).
pub fn resolve_template_identifier(identifier: &str, db: &Database) -> Result<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return if db.template(id).is_some() {
            Ok(id)
        } else {
            Err(Error::not_found("plantilla", id))
        };
    }
    if let Some(t) = db
        .templates
        .iter()
        .find(|t| t.code.eq_ignore_ascii_case(identifier))
    {
        return Ok(t.id);
    }
    db.templates
        .iter()
        .find(|t| t.name.to_lowercase() == identifier.to_lowercase())
        .map(|t| t.id)
        .ok_or_else(|| Error::not_found("plantilla", identifier))
}

/// Resolve a category identifier (numeric id, code, or exact name).
pub fn resolve_category_identifier(identifier: &str, db: &Database) -> Result<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return if db.category(id).is_some() {
            Ok(id)
        } else {
            Err(Error::not_found("categoría", id))
        };
    }
    if let Some(c) = db.categories.iter().find(|c| {
        c.code
            .as_deref()
            .is_some_and(|code| code.eq_ignore_ascii_case(identifier))
    }) {
        return Ok(c.id);
    }
    db.categories
        .iter()
        .find(|c| c.name.to_lowercase() == identifier.to_lowercase())
        .map(|c| c.id)
        .ok_or_else(|| Error::not_found("categoría", identifier))
}

/// Resolve a tag identifier (numeric id or exact name).
pub fn resolve_tag_identifier(identifier: &str, db: &Database) -> Result<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return if db.tag(id).is_some() {
            Ok(id)
        } else {
            Err(Error::not_found("etiqueta", id))
        };
    }
    db.tags
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(identifier))
        .map(|t| t.id)
        .ok_or_else(|| Error::not_found("etiqueta", identifier))
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Priority, TaskState};

    fn sample_task(db: &mut Database, title: &str) -> u64 {
        let id = db.alloc_task_id();
        let code = db.next_code(None);
        db.tasks.push(Task {
            id,
            code,
            title: title.to_string(),
            body: None,
            priority: Priority::Media,
            state: TaskState::Pendiente,
            requires_review: false,
            scheduled: None,
            due: None,
            category_id: None,
            tag_ids: Vec::new(),
            assignee: "u1".into(),
            assignee_name: "U. Uno".into(),
            created_by: "u1".into(),
            created_by_name: "U. Uno".into(),
            template_id: None,
            subtasks: Vec::new(),
            comments: Vec::new(),
            history: Vec::new(),
            next_subtask_id: 0,
            review_result: None,
            reviewed_by: None,
            review_comment: None,
            created_at_utc: 0,
            updated_at_utc: 0,
            completed_at_utc: None,
            reviewed_at_utc: None,
        });
        id
    }

    #[test]
    fn task_ids_are_monotonic() {
        let mut db = Database::default();
        let a = sample_task(&mut db, "a");
        let b = sample_task(&mut db, "b");
        assert_eq!(b, a + 1);
    }

    #[test]
    fn codes_increment_per_prefix() {
        let mut db = Database::default();
        let cat = db.alloc_label_id();
        db.categories.push(Category {
            id: cat,
            name: "Ventas".into(),
            code: Some("VEN".into()),
            color: None,
            active: true,
        });
        assert_eq!(db.next_code(Some(cat)), "VEN-0001");
        assert_eq!(db.next_code(Some(cat)), "VEN-0002");
        assert_eq!(db.next_code(None), "TAR-0001");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tareas.json");
        let mut db = Database::default();
        sample_task(&mut db, "persistida");
        db.save(&path).unwrap();

        let loaded = Database::load(&path);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].title, "persistida");
        assert_eq!(loaded.next_task_id, db.next_task_id);
    }

    #[test]
    fn parse_due_handles_relative_forms() {
        let today = Local::now().date_naive();
        assert_eq!(parse_due_input("hoy"), Some(today));
        assert_eq!(parse_due_input("in 3d"), Some(today + Duration::days(3)));
        assert_eq!(parse_due_input("en 2w"), Some(today + Duration::weeks(2)));
        assert_eq!(
            parse_due_input("2026-01-15"),
            NaiveDate::from_ymd_opt(2026, 1, 15)
        );
        assert_eq!(parse_due_input("nonsense"), None);
    }
}
