//! Interaction state of the note workspace.
//!
//! `Workspace` never talks to the store itself. User actions return an
//! [`Intent`] that the page executes asynchronously, and the outcome is fed
//! back through the `*_settled` methods.

use crate::models::{filter_notes, Category, Note, NoteFilter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Intent {
    AddNote { content: String, filter: NoteFilter },
    UpdateNote {
        note_id: String,
        content: String,
        filter: NoteFilter,
    },
    DeleteNote(String),
    AddCategory(String),
    Copy(String),
}

/// The single row currently in editing mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EditState {
    pub note_id: String,
    pub buffer: String,
    /// An update for this row is in flight.
    pub saving: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum DeleteConfirm {
    #[default]
    Idle,
    Confirming(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NoticeLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Notice {
    /// Increases with every notice raised, so identical texts stay distinct.
    pub seq: u64,
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Workspace {
    pub notes: Vec<Note>,
    pub categories: Vec<Category>,
    pub filter: NoteFilter,
    pub draft: String,
    pub adding: bool,
    pub new_category: String,
    pub adding_category: bool,
    pub editing: Option<EditState>,
    pub delete: DeleteConfirm,
    pub scratch: String,
    pub notice: Option<Notice>,
    notice_seq: u64,
}

impl Workspace {
    pub fn replace_notes(&mut self, notes: Vec<Note>) {
        self.notes = notes;
        // The row being edited was deleted elsewhere.
        if let Some(edit) = &self.editing {
            if !self.notes.iter().any(|n| n.id == edit.note_id) {
                self.editing = None;
            }
        }
    }

    pub fn replace_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories;
    }

    pub fn visible_notes(&self) -> Vec<Note> {
        filter_notes(&self.notes, &self.filter)
    }

    pub fn select_filter(&mut self, filter: NoteFilter) {
        self.filter = filter;
    }

    pub fn is_editing(&self, note_id: &str) -> bool {
        self.editing.as_ref().is_some_and(|e| e.note_id == note_id)
    }

    pub fn submit_draft(&mut self) -> Option<Intent> {
        if self.adding || self.draft.trim().is_empty() {
            return None;
        }
        self.adding = true;
        Some(Intent::AddNote {
            content: self.draft.clone(),
            filter: self.filter.clone(),
        })
    }

    /// The draft is cleared only once the store accepted it.
    pub fn draft_settled(&mut self, result: Result<(), String>) {
        self.adding = false;
        match result {
            Ok(()) => self.draft.clear(),
            Err(e) => self.error(format!("Could not add the note: {e}")),
        }
    }

    pub fn begin_edit(&mut self, note_id: &str) {
        let Some(note) = self.notes.iter().find(|n| n.id == note_id) else {
            return;
        };
        self.editing = Some(EditState {
            note_id: note.id.clone(),
            buffer: note.content.clone(),
            saving: false,
        });
    }

    pub fn set_edit_buffer(&mut self, text: String) {
        if let Some(edit) = self.editing.as_mut() {
            edit.buffer = text;
        }
    }

    /// A blank buffer is discarded silently; otherwise the row stays in
    /// editing mode until [`Workspace::edit_settled`].
    pub fn save_edit(&mut self) -> Option<Intent> {
        let edit = self.editing.as_mut()?;
        if edit.saving {
            return None;
        }
        if edit.buffer.trim().is_empty() {
            self.editing = None;
            return None;
        }
        edit.saving = true;
        Some(Intent::UpdateNote {
            note_id: edit.note_id.clone(),
            content: edit.buffer.clone(),
            filter: self.filter.clone(),
        })
    }

    pub fn edit_settled(&mut self, note_id: &str, result: Result<(), String>) {
        match result {
            Ok(()) => {
                if self.is_editing(note_id) {
                    self.editing = None;
                }
            }
            Err(e) => {
                if let Some(edit) = self.editing.as_mut().filter(|e| e.note_id == note_id) {
                    edit.saving = false;
                }
                self.error(format!("Could not save the note: {e}"));
            }
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn request_delete(&mut self, note_id: &str) {
        self.delete = DeleteConfirm::Confirming(note_id.to_string());
    }

    pub fn cancel_delete(&mut self) {
        self.delete = DeleteConfirm::Idle;
    }

    /// Returns to idle whatever the delete's outcome will be.
    pub fn confirm_delete(&mut self) -> Option<Intent> {
        match std::mem::take(&mut self.delete) {
            DeleteConfirm::Confirming(id) => Some(Intent::DeleteNote(id)),
            DeleteConfirm::Idle => None,
        }
    }

    pub fn delete_settled(&mut self, result: Result<(), String>) {
        if let Err(e) = result {
            self.error(format!("Could not delete the note: {e}"));
        }
    }

    pub fn submit_category(&mut self) -> Option<Intent> {
        let name = self.new_category.trim();
        if self.adding_category || name.is_empty() {
            return None;
        }
        let intent = Intent::AddCategory(name.to_string());
        self.adding_category = true;
        Some(intent)
    }

    pub fn category_settled(&mut self, result: Result<(), String>) {
        self.adding_category = false;
        match result {
            Ok(()) => self.new_category.clear(),
            Err(e) => self.error(format!("Could not add the category: {e}")),
        }
    }

    pub fn copy_note(&self, note_id: &str) -> Option<Intent> {
        self.notes
            .iter()
            .find(|n| n.id == note_id)
            .map(|n| Intent::Copy(n.content.clone()))
    }

    pub fn copy_scratch(&self) -> Option<Intent> {
        if self.scratch.is_empty() {
            None
        } else {
            Some(Intent::Copy(self.scratch.clone()))
        }
    }

    pub fn copy_settled(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => self.info("Copied to clipboard."),
            Err(e) => self.error(format!("Copy failed: {e}")),
        }
    }

    /// Stage a note's text in the scratch buffer for further editing.
    pub fn stage_from_note(&mut self, note_id: &str) {
        if let Some(note) = self.notes.iter().find(|n| n.id == note_id) {
            self.scratch = note.content.clone();
        }
    }

    fn notify(&mut self, level: NoticeLevel, text: String) {
        self.notice_seq += 1;
        self.notice = Some(Notice {
            seq: self.notice_seq,
            level,
            text,
        });
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.notify(NoticeLevel::Info, text.into());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.notify(NoticeLevel::Error, text.into());
    }

    /// Clear the notice only if it is still the one numbered `seq`.
    pub fn expire_notice(&mut self, seq: u64) {
        if self.notice.as_ref().is_some_and(|n| n.seq == seq) {
            self.notice = None;
        }
    }
}
