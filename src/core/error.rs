use thiserror::Error;

/// Errors raised by the data acquisition layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Called outside of a Tokio runtime, so nothing can be dispatched.
    #[error("No async runtime available to dispatch {url}")]
    NoRuntimeEnvironment { url: String },

    #[error("Load timeout after {timeout_ms}ms: {url}")]
    LoadTimeout { url: String, timeout_ms: u64 },

    #[error("Load failed: {url} ({reason})")]
    LoadError { url: String, reason: String },

    #[error("Unsupported benchmark code: {0}")]
    UnsupportedBenchmark(String),

    #[error("No history data resolved for {0}")]
    NoHistory(String),
}

impl FetchError {
    pub fn load_error(url: &str, reason: impl ToString) -> Self {
        FetchError::LoadError {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::LoadTimeout { .. })
    }
}
