//! Create/edit dialog — one text field, reused for both by presence of an edit target.

use crate::todos::model::{TodoId, TodoPatch};

/// What saving the dialog asks the store to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogAction {
    Create { title: String },
    Edit { id: TodoId, data: TodoPatch },
}

/// Dialog state.
#[derive(Debug, Clone, Default)]
pub struct TodoDialog {
    open: bool,
    edit_target: Option<TodoId>,
    text: String,
}

impl TodoDialog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_create(&mut self) {
        self.open = true;
        self.edit_target = None;
        self.text.clear();
    }

    /// Open for editing, prefilled with the item's current title.
    pub fn open_edit(&mut self, id: TodoId, initial: Option<&str>) {
        self.open = true;
        self.edit_target = Some(id);
        self.text = initial.unwrap_or_default().to_string();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn edit_target(&self) -> Option<TodoId> {
        self.edit_target
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn heading(&self) -> &'static str {
        if self.edit_target.is_some() {
            "Edit Todo"
        } else {
            "Create Todo"
        }
    }

    pub fn save_label(&self) -> &'static str {
        if self.edit_target.is_some() {
            "Save Changes"
        } else {
            "Create Todo"
        }
    }

    /// Close without saving; the typed text is discarded.
    pub fn close(&mut self) {
        self.open = false;
        self.text.clear();
    }

    /// Produce the store action and close. Returns `None` when the dialog is
    /// closed or the text is blank.
    pub fn save(&mut self) -> Option<DialogAction> {
        if !self.open {
            return None;
        }
        let title = self.text.trim().to_string();
        let target = self.edit_target;
        self.close();
        if title.is_empty() {
            return None;
        }
        Some(match target {
            Some(id) => DialogAction::Edit {
                id,
                data: TodoPatch::title(title),
            },
            None => DialogAction::Create { title },
        })
    }
}
