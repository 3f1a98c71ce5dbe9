//! Error types for the convoflow engine.
//!
//! Two families live here. Faults (`ConvoflowError` and the structs it wraps)
//! signal corruption, misconfiguration or failing application code and are
//! propagated with `?`. Contention and not-found are ordinary outcomes: their
//! structs are carried inside `FetchOutcome` / `TurnOutcome` values and never
//! raised.

use crate::conversation::ConversationId;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = ConvoflowError> = std::result::Result<T, E>;

/// The main error type for convoflow operations.
#[derive(Debug, Error)]
pub enum ConvoflowError {
    /// A stored type tag did not resolve to a registered type.
    #[error("{0}")]
    TypeResolution(#[from] TypeResolutionError),

    /// A payload or data-bag entry was malformed.
    #[error("{0}")]
    Format(#[from] FormatError),

    /// Application step code failed.
    #[error("{0}")]
    StepExecution(#[from] StepExecutionError),

    /// The step dispatcher could not locate a step to run.
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// A handler type was registered without any capability.
    #[error("{0}")]
    HandlerRegistration(#[from] HandlerRegistrationError),

    /// A handler failed while processing an event.
    #[error("Handler '{handler}' failed: {source}")]
    Handler {
        /// The handler type name.
        handler: &'static str,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// The type registry rejected a registration.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// The record store failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvoflowError {
    /// Wraps a handler failure.
    #[must_use]
    pub fn handler(handler: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Handler {
            handler,
            source: source.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TypeResolution(_) => "type_resolution",
            Self::Format(_) => "format",
            Self::StepExecution(_) => "step_execution",
            Self::Dispatch(_) => "dispatch",
            Self::HandlerRegistration(_) => "handler_registration",
            Self::Handler { .. } => "handler",
            Self::Registry(_) => "registry",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// True when the error indicates stored data this build cannot read.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::TypeResolution(_) | Self::Format(_))
    }

    /// Converts to a dictionary representation for structured logs.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Self::StepExecution(err) = self {
            map.insert("action".to_string(), serde_json::json!(err.action));
            map.insert("step".to_string(), serde_json::json!(err.step));
        }
        map
    }
}

/// A type tag that does not resolve to any registered type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unresolvable type tag '{tag}' ({context})")]
pub struct TypeResolutionError {
    /// The unknown tag.
    pub tag: String,
    /// Where the tag was encountered.
    pub context: String,
}

impl TypeResolutionError {
    /// Creates a new type resolution error.
    #[must_use]
    pub fn new(tag: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            context: context.into(),
        }
    }
}

/// Malformed serialized data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Format error: {message}")]
pub struct FormatError {
    /// The error message.
    pub message: String,
    /// The data-bag key involved, if any.
    pub key: Option<String>,
}

impl FormatError {
    /// Creates a new format error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
        }
    }

    /// Attaches the data-bag key involved.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// A stored tag that differs from the tag the caller asked for.
    #[must_use]
    pub fn tag_mismatch(key: &str, stored: &str, requested: &str) -> Self {
        Self::new(format!(
            "entry '{key}' holds '{stored}', requested as '{requested}'"
        ))
        .with_key(key)
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A failure raised by application step logic.
///
/// The original error is kept as the source, untouched.
#[derive(Debug, Error)]
#[error("Step {step} of action '{action}' failed: {source}")]
pub struct StepExecutionError {
    /// The action that owned the step.
    pub action: String,
    /// The step index.
    pub step: u32,
    /// The error returned by the step.
    #[source]
    pub source: anyhow::Error,
}

impl StepExecutionError {
    /// Creates a new step execution error.
    #[must_use]
    pub fn new(action: impl Into<String>, step: u32, source: anyhow::Error) -> Self {
        Self {
            action: action.into(),
            step,
            source,
        }
    }
}

/// The step dispatcher could not find something to run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The conversation has no active action.
    #[error("Conversation {conversation_id} has no active action")]
    NoActiveAction {
        /// The conversation.
        conversation_id: ConversationId,
    },

    /// The named action is not registered.
    #[error("Action '{action}' is not registered")]
    UnknownAction {
        /// The action name.
        action: String,
    },

    /// The cursor points past the action's steps.
    #[error("Action '{action}' has {len} steps, cursor is at {step}")]
    StepOutOfRange {
        /// The action name.
        action: String,
        /// The cursor.
        step: u32,
        /// Number of steps in the action.
        len: usize,
    },
}

/// Error raised when a handler type declares no capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Handler '{handler}' handles neither messages nor keyboard responses")]
pub struct HandlerRegistrationError {
    /// The offending handler type.
    pub handler: &'static str,
}

/// Errors raised by the type registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The tag is already bound to another type.
    #[error("Type tag '{tag}' is already registered for {existing}, cannot register {requested}")]
    TagConflict {
        /// The tag.
        tag: String,
        /// The type currently bound.
        existing: &'static str,
        /// The type being registered.
        requested: &'static str,
    },
}

/// Errors raised by a record store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A row for this conversation already exists.
    #[error("A row for conversation {conversation_id} already exists")]
    Duplicate {
        /// The conversation.
        conversation_id: ConversationId,
    },

    /// The row to update or remove does not exist.
    #[error("No row with id {id}")]
    MissingRow {
        /// The row id.
        id: i64,
    },

    /// A lease for one conversation was used to write another.
    #[error("Lease is for conversation {leased}, not {requested}")]
    LeaseMismatch {
        /// The conversation the lease locks.
        leased: ConversationId,
        /// The conversation being written.
        requested: ConversationId,
    },

    /// The backend failed.
    #[error("Record store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// The lock for a conversation was not acquired in time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Conversation {conversation_id} is busy (waited {waited:?})")]
pub struct ContentionError {
    /// The contended conversation.
    pub conversation_id: ConversationId,
    /// How long the caller waited.
    pub waited: Duration,
}

/// No row exists for a conversation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Conversation {conversation_id} not found")]
pub struct NotFoundError {
    /// The missing conversation.
    pub conversation_id: ConversationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_tag_mismatch() {
        let err = FormatError::tag_mismatch("total", "f64", "i64");
        assert_eq!(err.key.as_deref(), Some("total"));
        assert!(err.to_string().contains("'f64'"));
        assert!(err.to_string().contains("'i64'"));
    }

    #[test]
    fn test_step_execution_keeps_source() {
        let err = StepExecutionError::new("Checkout", 2, anyhow::anyhow!("card declined"));
        let wrapped: ConvoflowError = err.into();

        assert_eq!(wrapped.kind(), "step_execution");
        let source = std::error::Error::source(&wrapped).map(ToString::to_string);
        assert!(wrapped.to_string().contains("card declined"));
        assert!(source.is_some());
    }

    #[test]
    fn test_error_to_dict() {
        let err: ConvoflowError = StepExecutionError::new("Checkout", 1, anyhow::anyhow!("boom")).into();
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "step_execution");
        assert_eq!(dict.get("action").unwrap(), "Checkout");
        assert_eq!(dict.get("step").unwrap(), 1);
    }

    #[test]
    fn test_corruption_classification() {
        let err: ConvoflowError = TypeResolutionError::new("Gone", "payload").into();
        assert!(err.is_corruption());

        let err: ConvoflowError = StoreError::backend("down").into();
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::StepOutOfRange {
            action: "Checkout".to_string(),
            step: 4,
            len: 3,
        };
        assert_eq!(err.to_string(), "Action 'Checkout' has 3 steps, cursor is at 4");
    }
}
