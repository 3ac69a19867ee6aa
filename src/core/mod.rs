//! Domain types, arithmetic, caches, configuration and dashboard analytics

pub mod allocation;
pub mod analytics;
pub mod cache;
pub mod classify;
pub mod comparison;
pub mod config;
pub mod decimal;
pub mod error;
pub mod fund;
pub mod log;

// Re-export main types for cleaner imports
pub use error::FetchError;
pub use fund::{FundDataProvider, HistoryPeriod};
