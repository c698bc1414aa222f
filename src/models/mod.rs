use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category sentinel for notes that were never filed.
pub(crate) const UNCATEGORIZED: &str = "Uncategorized";

/// Select value that maps to [`NoteFilter::All`].
pub(crate) const FILTER_ALL: &str = "all";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Note {
    pub id: String,
    pub content: String,

    /// Category id, or [`UNCATEGORIZED`].
    pub category: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Category {
    pub id: String,
    pub name: String,
}

/// Authenticated identity of the current client.
///
/// Passed explicitly into the repository and the workspace; there is no
/// ambient auth object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Session {
    pub uid: String,
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at_ms: i64,
}

impl Session {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Record shape stored under `notes/{uid}/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct NoteRecord {
    pub content: String,
    pub category: String,
}

/// Record shape stored under `categories/{uid}/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct CategoryRecord {
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum NoteFilter {
    #[default]
    All,
    Category(String),
}

impl NoteFilter {
    pub fn from_select_value(value: &str) -> Self {
        if value == FILTER_ALL || value.trim().is_empty() {
            Self::All
        } else {
            Self::Category(value.to_string())
        }
    }

    pub fn select_value(&self) -> String {
        match self {
            Self::All => FILTER_ALL.to_string(),
            Self::Category(id) => id.clone(),
        }
    }

    /// Category a note written under this filter is filed in.
    pub fn resolve_category(&self) -> String {
        match self {
            Self::All => UNCATEGORIZED.to_string(),
            Self::Category(id) => id.clone(),
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        match self {
            Self::All => true,
            Self::Category(id) => &note.category == id,
        }
    }
}

pub(crate) fn filter_notes(notes: &[Note], filter: &NoteFilter) -> Vec<Note> {
    notes.iter().filter(|n| filter.matches(n)).cloned().collect()
}

pub(crate) fn category_label(categories: &[Category], category_id: &str) -> String {
    categories
        .iter()
        .find(|c| c.id == category_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

/// Map a `notes/{uid}` subtree into notes, in store key order.
pub(crate) fn notes_from_snapshot(data: &Value) -> Vec<Note> {
    let Some(children) = data.as_object() else {
        return vec![];
    };

    let mut out: Vec<Note> = Vec::with_capacity(children.len());
    for (id, item) in children {
        if id.trim().is_empty() || !item.is_object() {
            continue;
        }

        let get_s = |k: &str| item.get(k).and_then(|v| v.as_str()).map(|s| s.to_string());

        let category = get_s("category")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        out.push(Note {
            id: id.clone(),
            content: get_s("content").unwrap_or_default(),
            category,
        });
    }

    out
}

/// Map a `categories/{uid}` subtree into categories, dropping unnamed entries.
pub(crate) fn categories_from_snapshot(data: &Value) -> Vec<Category> {
    let Some(children) = data.as_object() else {
        return vec![];
    };

    children
        .iter()
        .filter_map(|(id, item)| {
            let name = item.get("name").and_then(|v| v.as_str())?;
            if id.trim().is_empty() || name.trim().is_empty() {
                return None;
            }
            Some(Category {
                id: id.clone(),
                name: name.to_string(),
            })
        })
        .collect()
}
