//! Error types for the prerender pipeline

use thiserror::Error;

/// Result type alias for prerender operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing a snapshot
///
/// Every variant is fatal for the run; the binary reports `stage()` together
/// with the message and exits with status 1.
#[derive(Error, Debug)]
pub enum Error {
    /// Output directory or entry document missing before the run started
    #[error("Output directory not ready: {0}")]
    MissingOutput(String),

    /// The static server could not bind its address
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The headless browser could not be started
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// The page failed to load
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Markup could not be read back from the page, or was not rendered
    #[error("Snapshot extraction failed: {0}")]
    Extraction(String),

    /// The entry document could not be overwritten
    #[error("Failed to write snapshot: {0}")]
    Write(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short name of the pipeline stage the error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            Error::MissingOutput(_) | Error::Config(_) => "preflight",
            Error::Bind { .. } => "server",
            Error::Launch(_) => "launch",
            Error::Navigation(_) | Error::Timeout(_) => "navigation",
            Error::Extraction(_) => "extraction",
            Error::Write(_) => "write",
            #[cfg(feature = "cdp")]
            Error::Cdp(_) => "browser",
            Error::Other(_) => "internal",
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_pipeline_order() {
        let bind = Error::Bind { addr: "127.0.0.1:4173".into(), reason: "in use".into() };
        assert_eq!(bind.stage(), "server");
        assert_eq!(Error::Timeout(30000).stage(), "navigation");
        assert_eq!(Error::Write("denied".into()).stage(), "write");
    }

    #[test]
    fn bind_message_names_address() {
        let e = Error::Bind { addr: "127.0.0.1:4173".into(), reason: "Address already in use".into() };
        assert_eq!(e.to_string(), "Failed to bind 127.0.0.1:4173: Address already in use");
    }
}
