//! Terminal view — stdin/stdout REPL over the store.
//!
//! Input lines become store operations; every store event re-renders the
//! screen. Asynchronous operations are dispatched on their own task so the
//! prompt never waits on the network.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt, stream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::command::{Command, HELP};
use super::dialog::{DialogAction, TodoDialog};
use super::{drag_reorder_visible, render};
use crate::error;
use crate::todos::model::TodoId;
use crate::todos::store::TodoStore;

type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// What the REPL does after handling a line.
#[derive(Debug)]
pub enum Flow {
    Continue,
    /// An asynchronous operation was dispatched.
    Dispatched(JoinHandle<()>),
    Quit,
}

/// Line-oriented front end for a [`TodoStore`].
pub struct TerminalView {
    store: Arc<TodoStore>,
    user_id: i64,
    dialog: TodoDialog,
}

impl TerminalView {
    pub fn new(store: Arc<TodoStore>, user_id: i64) -> Self {
        Self {
            store,
            user_id,
            dialog: TodoDialog::new(),
        }
    }

    pub fn dialog(&self) -> &TodoDialog {
        &self.dialog
    }

    /// Run until `quit` or EOF on stdin.
    pub async fn run(mut self) {
        let mut events = self.store.subscribe();
        let mut lines = stdin_lines();

        self.render().await;

        loop {
            tokio::select! {
                line = lines.next() => {
                    let Some(line) = line else { break };
                    if let Flow::Quit = self.handle_line(&line).await {
                        break;
                    }
                    self.prompt();
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        debug!(?event, "Store event");
                        self.render().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "View lagged behind store events");
                        self.render().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if self.dialog.is_open() {
            return self.handle_dialog_input(line);
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(msg) => {
                if !line.trim().is_empty() {
                    eprintln!("{msg}");
                }
                return Flow::Continue;
            }
        };

        match command {
            Command::List => {
                self.render().await;
                Flow::Continue
            }
            Command::Help => {
                println!("{HELP}");
                Flow::Continue
            }
            Command::Quit => Flow::Quit,
            Command::Add { title } => {
                self.dialog.open_create();
                match title {
                    Some(title) => {
                        self.dialog.set_text(title);
                        self.save_dialog()
                    }
                    None => {
                        self.show_dialog();
                        Flow::Continue
                    }
                }
            }
            Command::Edit { id, title } => {
                let current = self.store.item(id).await.map(|t| t.title);
                self.dialog.open_edit(id, current.as_deref());
                match title {
                    Some(title) => {
                        self.dialog.set_text(title);
                        self.save_dialog()
                    }
                    None => {
                        self.show_dialog();
                        Flow::Continue
                    }
                }
            }
            Command::Toggle { id } => {
                let store = Arc::clone(&self.store);
                self.dispatch("toggle", async move { store.toggle(id).await })
            }
            Command::Delete { id } => {
                let store = Arc::clone(&self.store);
                self.dispatch("delete", async move { store.delete(id).await })
            }
            Command::Refresh => {
                let store = Arc::clone(&self.store);
                self.dispatch("fetch", async move { store.fetch_all().await })
            }
            Command::Filter { filter } => {
                self.store.change_filter(filter).await;
                Flow::Continue
            }
            Command::ClearCompleted => {
                if let Err(e) = self.store.clear_completed().await {
                    warn!(error = %e, "Clear completed could not be mirrored");
                }
                Flow::Continue
            }
            Command::Move { from, to } => {
                self.move_visible(from - 1, to - 1).await;
                Flow::Continue
            }
        }
    }

    fn handle_dialog_input(&mut self, line: &str) -> Flow {
        let text = line.trim();
        if text.is_empty() || text == ":close" {
            self.dialog.close();
            println!("(closed)");
            return Flow::Continue;
        }
        self.dialog.set_text(text);
        self.save_dialog()
    }

    /// Save the dialog; it closes immediately whatever the outcome.
    fn save_dialog(&mut self) -> Flow {
        let Some(action) = self.dialog.save() else {
            eprintln!("title must not be empty");
            return Flow::Continue;
        };
        let store = Arc::clone(&self.store);
        match action {
            DialogAction::Create { title } => {
                let user_id = self.user_id;
                self.dispatch("create", async move {
                    store.create(&title, user_id).await.map(|_| ())
                })
            }
            DialogAction::Edit { id, data } => {
                self.dispatch("edit", async move { store.edit(id, data).await })
            }
        }
    }

    async fn move_visible(&self, from: usize, to: usize) {
        let state = self.store.snapshot().await;
        let visible: Vec<TodoId> = state.filtered().iter().map(|t| t.id).collect();
        match drag_reorder_visible(&state.ordered(), &visible, from, to) {
            Some(reordered) => {
                if let Err(e) = self.store.reorder(reordered).await {
                    warn!(error = %e, "Reorder could not be mirrored");
                }
            }
            None => eprintln!("no todo at that position"),
        }
    }

    fn dispatch<F>(&self, op: &'static str, fut: F) -> Flow
    where
        F: Future<Output = error::Result<()>> + Send + 'static,
    {
        Flow::Dispatched(tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!(op, error = %e, "Todo operation failed");
            }
        }))
    }

    fn show_dialog(&self) {
        println!("── {} ──", self.dialog.heading());
        if !self.dialog.text().is_empty() {
            println!("current: {}", self.dialog.text());
        }
        println!("Enter title to {} (empty line closes):", self.dialog.save_label().to_lowercase());
    }

    async fn render(&self) {
        let state = self.store.snapshot().await;
        println!("\n{}\n", render::screen(&state));
        self.prompt();
    }

    fn prompt(&self) {
        if self.dialog.is_open() {
            eprint!("title> ");
        } else {
            eprint!("> ");
        }
    }
}

fn stdin_lines() -> LineStream {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    }))
}
