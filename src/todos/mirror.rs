//! Persistent mirror — the full collection as a JSON blob under a fixed key.
//!
//! The mirror is a read cache for startup, rewritten after every successful
//! mutation. It is never replayed against the remote collection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use super::model::TodoCollection;
use crate::error::MirrorError;

/// Fixed storage key of the collection.
pub const STORAGE_KEY: &str = "todos";

/// Local durable storage for the todo collection.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Load the stored collection, or an empty one if nothing was stored yet.
    async fn read(&self) -> Result<TodoCollection, MirrorError>;

    /// Replace the stored collection.
    async fn write(&self, collection: &TodoCollection) -> Result<(), MirrorError>;
}

/// Mirror stored as `<dir>/todos.json`.
pub struct FileMirror {
    path: PathBuf,
}

impl FileMirror {
    /// Mirror inside `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Mirror for FileMirror {
    async fn read(&self) -> Result<TodoCollection, MirrorError> {
        if !self.path.exists() {
            return Ok(TodoCollection::new());
        }
        let text = fs::read_to_string(&self.path).await?;
        if text.trim().is_empty() {
            return Ok(TodoCollection::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn write(&self, collection: &TodoCollection) -> Result<(), MirrorError> {
        let text = serde_json::to_string(collection)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-process mirror holding the serialized text.
#[derive(Default)]
pub struct MemoryMirror {
    text: Mutex<Option<String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the mirror with raw stored text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(Some(text.into())),
        }
    }

    /// Raw stored text, if any write has happened.
    pub fn text(&self) -> Option<String> {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Mirror for MemoryMirror {
    async fn read(&self) -> Result<TodoCollection, MirrorError> {
        match self.text() {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(TodoCollection::new()),
        }
    }

    async fn write(&self, collection: &TodoCollection) -> Result<(), MirrorError> {
        let text = serde_json::to_string(collection)?;
        *self.text.lock().unwrap_or_else(|e| e.into_inner()) = Some(text);
        Ok(())
    }
}
