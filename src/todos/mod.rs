//! Todo state synchronization.
//!
//! Core components:
//! - `model` — Todo items, patches, filters, status flags
//! - `api` — Remote collection client (`TodoApi`, reqwest-backed `HttpTodoApi`)
//! - `mirror` — Local JSON mirror of the collection (`FileMirror`, `MemoryMirror`)
//! - `store` — Normalized state container with subscribe/notify

pub mod api;
pub mod mirror;
pub mod model;
pub mod store;

pub use api::{HttpTodoApi, TodoApi};
pub use mirror::{FileMirror, MemoryMirror, Mirror};
pub use model::{Filter, Status, TodoCollection, TodoId, TodoItem, TodoPatch};
pub use store::{FilterCounts, StoreEvent, TodoState, TodoStore};
