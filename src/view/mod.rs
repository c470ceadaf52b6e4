//! View layer — terminal presentation over the todo store.

pub mod command;
pub mod dialog;
pub mod render;
pub mod terminal;

pub use command::Command;
pub use dialog::{DialogAction, TodoDialog};
pub use terminal::TerminalView;

use crate::todos::model::{TodoId, TodoItem};

/// Move the item at `source` to `destination` (0-based).
///
/// Returns `None` when there is no destination or either index is out of
/// range, mirroring a drag that was dropped outside the list.
pub fn drag_reorder(
    items: &[TodoItem],
    source: usize,
    destination: Option<usize>,
) -> Option<Vec<TodoItem>> {
    let destination = destination?;
    if source >= items.len() || destination >= items.len() {
        return None;
    }
    let mut reordered = items.to_vec();
    let removed = reordered.remove(source);
    reordered.insert(destination, removed);
    Some(reordered)
}

/// Reorder the full list by dragging within a filtered view.
///
/// `visible` holds the ids on screen; `from`/`to` index into it. The dragged
/// item takes the full-list slot of the item it was dropped on.
pub fn drag_reorder_visible(
    all: &[TodoItem],
    visible: &[TodoId],
    from: usize,
    to: usize,
) -> Option<Vec<TodoItem>> {
    let position = |id: &TodoId| all.iter().position(|t| t.id == *id);
    let source = position(visible.get(from)?)?;
    let destination = position(visible.get(to)?)?;
    drag_reorder(all, source, Some(destination))
}
