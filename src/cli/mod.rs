//! Terminal rendering for each command

pub mod alloc;
pub mod cache;
pub mod compare;
pub mod history;
pub mod holdings;
pub mod quotes;
pub mod realtime;
pub mod search;
pub mod setup;
pub mod summary;
pub mod ui;
