//! Script transport: loading, pacing, gating and serialization.

pub mod limiter;
pub mod loader;
pub mod scope;
pub mod serial;

pub use limiter::{RequestLimiter, batch_process};
pub use loader::{LoaderOptions, ScriptLoader};
pub use scope::GlobalScope;
pub use serial::SerialQueue;
