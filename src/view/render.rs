//! Plain-text rendering of the filter bar, the list and the status line.

use std::fmt::Write as _;

use crate::todos::model::{Filter, Status, TodoItem};
use crate::todos::store::{FilterCounts, TodoState};

/// `[All 3]  Active 1   Completed 2` with the active filter bracketed.
pub fn filter_bar(active: Filter, counts: FilterCounts) -> String {
    Filter::ALL
        .iter()
        .map(|&filter| {
            let count = match filter {
                Filter::All => counts.all,
                Filter::Active => counts.active,
                Filter::Completed => counts.completed,
            };
            let label = format!("{} {count}", capitalize(filter.as_str()));
            if filter == active {
                format!("[{label}]")
            } else {
                format!(" {label} ")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One row per item: display position, id, checkbox, title.
pub fn todo_table(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "  (nothing here)".to_string();
    }
    let id_width = items
        .iter()
        .map(|t| t.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max(2);

    let mut out = String::new();
    let _ = writeln!(out, "  #  {:>id_width$}  Todo", "ID");
    for (pos, item) in items.iter().enumerate() {
        let check = if item.completed { "x" } else { " " };
        let _ = writeln!(
            out,
            "{:>3}  {:>id_width$}  [{check}] {}",
            pos + 1,
            item.id,
            item.title
        );
    }
    out.truncate(out.trim_end().len());
    out
}

/// Loading / error line, if there is anything to say.
pub fn status_line(state: &TodoState) -> Option<String> {
    if state.get_status == Status::Pending {
        return Some("Loading todos...".to_string());
    }
    if state.add_status == Status::Pending {
        return Some("Adding todo...".to_string());
    }
    let failed = [state.get_status, state.add_status, state.change_status]
        .contains(&Status::Failed);
    match (&state.error, failed) {
        (Some(error), true) => Some(format!("! {error}")),
        _ => None,
    }
}

/// Whole screen for the current state.
pub fn screen(state: &TodoState) -> String {
    let mut out = String::from("To-Do List\n");
    let _ = writeln!(out, "{}", filter_bar(state.active_filter, state.counts()));
    if let Some(status) = status_line(state) {
        let _ = writeln!(out, "{status}");
    }
    out.push_str(&todo_table(&state.filtered()));
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
