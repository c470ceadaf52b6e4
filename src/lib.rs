//! todo-sync — a REST-backed todo list with a local JSON mirror.

pub mod config;
pub mod error;
pub mod todos;
pub mod view;
