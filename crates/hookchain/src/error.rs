use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::handler::HandlerLabel;

/// Error carried by a context that was aborted with a failure.
///
/// Cloneable so that [`HookContext::error`](crate::HookContext::error) can hand
/// out copies while the context keeps its own.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum HookError {
    /// A failure declared by a hook with a plain message.
    #[error("{0}")]
    Message(String),

    /// A hook panicked while running; the dispatcher converted the panic.
    #[error("hook {label} panicked: {message}")]
    Panicked {
        /// Key, name and chain position of the hook that panicked.
        label: HandlerLabel,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A failure wrapping an arbitrary error value.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Arc::new(error))
    }

    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// Error from a compensation that failed during rollback.
#[derive(Debug, Clone, Error)]
#[error("compensation failed for hook {label}")]
pub struct CompensationError {
    /// The hook whose compensation failed.
    pub label: HandlerLabel,
    /// The underlying error.
    #[source]
    pub error: HookError,
}

/// Render a panic payload caught by `catch_unwind` as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read hook config at '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse hook config")]
    Parse(#[from] toml::de::Error),

    #[error("default registry name must not be empty")]
    EmptyRegistryName,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::HookKey;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn message_error_displays_message() {
        assert_eq!(HookError::msg("test abort").to_string(), "test abort");
    }

    #[test]
    fn source_error_is_transparent() {
        let err = HookError::new(DiskFull);
        assert_eq!(err.to_string(), "disk full");
        assert!(!err.is_panic());
    }

    #[test]
    fn panicked_error_names_the_hook() {
        let err = HookError::Panicked {
            label: HandlerLabel::new(HookKey::from("tiger"), Some("stripes".into()), 2),
            message: "boom".to_string(),
        };

        assert!(err.is_panic());
        assert_eq!(err.to_string(), "hook [tiger->stripes][2] panicked: boom");
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("static boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(literal.as_ref()), "static boom");
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[test]
    fn compensation_error_exposes_source() {
        let err = CompensationError {
            label: HandlerLabel::new(HookKey::from("bird"), None, 0),
            error: HookError::msg("undo failed"),
        };

        assert_eq!(err.to_string(), "compensation failed for hook [bird->][0]");
        let source = std::error::Error::source(&err).expect("source should be set");
        assert_eq!(source.to_string(), "undo failed");
    }
}
