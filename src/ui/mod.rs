//! Terminal front end: renders session snapshots and dispatches user intents

pub mod app;
pub mod conversation;

pub use app::ChatApp;
