//! Error types for the event bus

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Failure raised by a single handler during dispatch.
///
/// Whatever a handler fails with is normalized into one of these variants so
/// that an emission can collect failures from handlers of any shape.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Panicked(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] serde_json::Error),

    #[error("missing argument at index {0}")]
    MissingArgument(usize),

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Create a failure from any displayable message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    /// Wrap a structured error, keeping it available as the error source.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }

    /// Convert a caught panic payload into a failure.
    ///
    /// String payloads (the common case for `panic!`) are kept verbatim.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::Panicked(message)
    }

    /// The failure message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the handler panicked instead of returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

/// Event bus errors
#[derive(Debug, Error)]
pub enum EventBusError {
    /// One or more handlers failed during a single emission.
    #[error("{} handler(s) threw during \"{}\"", .errors.len(), .event)]
    HandlersFailed {
        event: String,
        errors: Vec<HandlerError>,
    },

    /// No matching emission arrived before the deadline.
    #[error("waitFor(\"{}\") timed out after {}ms", .event, .timeout.as_millis())]
    Timeout { event: String, timeout: Duration },
}

impl EventBusError {
    /// Handler failures carried by an aggregate dispatch failure, in
    /// invocation order. Empty for other variants.
    pub fn failures(&self) -> &[HandlerError] {
        match self {
            Self::HandlersFailed { errors, .. } => errors,
            Self::Timeout { .. } => &[],
        }
    }

    /// The event name this error refers to.
    pub fn event(&self) -> &str {
        match self {
            Self::HandlersFailed { event, .. } | Self::Timeout { event, .. } => event,
        }
    }

    /// Whether this is a `wait_for` deadline failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
