//! Terminal commands understood by the REPL.

use crate::todos::model::{Filter, TodoId};

/// Parsed user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the list.
    List,
    /// Create; without a title the dialog opens and the next line is the title.
    Add { title: Option<String> },
    /// Edit; without a title the dialog opens prefilled.
    Edit { id: TodoId, title: Option<String> },
    Toggle { id: TodoId },
    Delete { id: TodoId },
    Filter { filter: Filter },
    ClearCompleted,
    /// Drag the row at `from` (displayed position, 1-based) to `to`.
    Move { from: usize, to: usize },
    Refresh,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                 show todos
  add [title]          create a todo
  edit <id> [title]    change a todo's title
  toggle <id>          mark done / not done
  rm <id>              delete a todo
  filter <f>           all | active | completed
  clear                remove completed todos
  move <from> <to>     reorder by displayed position
  refresh              reload from the server
  help                 this text
  quit";

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let rest_opt = (!rest.is_empty()).then(|| rest.to_string());

        match word.to_ascii_lowercase().as_str() {
            "list" | "ls" => Ok(Command::List),
            "add" | "new" => Ok(Command::Add { title: rest_opt }),
            "edit" => {
                let (id, title) = match rest.split_once(char::is_whitespace) {
                    Some((id, title)) => (id, Some(title.trim().to_string())),
                    None => (rest, None),
                };
                Ok(Command::Edit {
                    id: parse_id(id)?,
                    title: title.filter(|t| !t.is_empty()),
                })
            }
            "toggle" | "done" => Ok(Command::Toggle { id: parse_id(rest)? }),
            "rm" | "delete" => Ok(Command::Delete { id: parse_id(rest)? }),
            "filter" => {
                // unrecognized filters fall back to the full list
                let filter = rest.parse().unwrap_or_default();
                Ok(Command::Filter { filter })
            }
            "clear" => Ok(Command::ClearCompleted),
            "move" | "mv" => {
                let mut parts = rest.split_whitespace();
                let from = parse_position(parts.next())?;
                let to = parse_position(parts.next())?;
                Ok(Command::Move { from, to })
            }
            "refresh" | "fetch" => Ok(Command::Refresh),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command: {other} (try `help`)")),
        }
    }
}

fn parse_id(s: &str) -> Result<TodoId, String> {
    s.parse().map_err(|_| format!("invalid todo id: {s:?}"))
}

fn parse_position(s: Option<&str>) -> Result<usize, String> {
    match s.and_then(|s| s.parse::<usize>().ok()) {
        Some(pos) if pos > 0 => Ok(pos),
        _ => Err("positions start at 1".to_string()),
    }
}
