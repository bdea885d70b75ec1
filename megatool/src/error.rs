//! Error types for the supervisor core

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the supervisor core
#[derive(Debug, Error)]
pub enum MegatoolError {
    /// Bad arguments, missing server, multiple-instance ambiguity
    #[error("{message}")]
    User {
        message: String,
        /// Follow-up command suggestion printed under the error
        hint: Option<String>,
    },

    /// A binary, config path, or registry entry that does not exist
    #[error("{0}")]
    NotFound(String),

    /// Filesystem or pipe failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The spawned server exited non-zero
    #[error("server exited with code {0}")]
    ChildFailed(i32),

    /// Malformed registry or client-config JSON
    #[error("invalid JSON in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Client or platform without a known configuration location
    #[error("{0}")]
    Unsupported(String),
}

impl MegatoolError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            hint: None,
        }
    }

    pub fn user_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Suggestion shown below the error message, if any
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::User { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ChildFailed(code) => *code,
            _ => 1,
        }
    }
}

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, MegatoolError>;

/// Attach a context message to `std::io::Error` results
pub trait IoResultExt<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| MegatoolError::io(context(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_carries_hint() {
        let err = MegatoolError::user_with_hint("no such server", "Run 'megatool ls'");
        assert_eq!(err.to_string(), "no such server");
        assert_eq!(err.hint(), Some("Run 'megatool ls'"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_child_failed_propagates_code() {
        assert_eq!(MegatoolError::ChildFailed(3).exit_code(), 3);
    }

    #[test]
    fn test_io_context() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.io_context(|| "Failed to open log".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to open log"));
        assert!(err.hint().is_none());
    }
}
