//! Inbound tasks and the result envelope every operation returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An inbound unit of work.
///
/// A task names the handler it is meant for and carries handler-specific
/// fields alongside (`command`, `action`, `text`, ...). Tasks are built per
/// request and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Name of the handler that should execute this task.
    #[serde(default, alias = "target_agent", skip_serializing_if = "Option::is_none")]
    pub target_handler: Option<String>,
    /// Handler-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Task {
    /// Create a task addressed to `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target_handler: Some(target.into()),
            fields: Map::new(),
        }
    }

    /// Create a task with no target handler.
    pub fn untargeted() -> Self {
        Self::default()
    }

    /// Add a handler-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The target handler, treating an empty string as absent.
    pub fn target(&self) -> Option<&str> {
        self.target_handler.as_deref().filter(|t| !t.is_empty())
    }

    /// Get a field as a string, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// The tagged outcome of any gateway operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope {
    /// The operation completed.
    Success {
        /// Operation output.
        payload: Value,
    },
    /// The operation failed.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl Envelope {
    /// Build a success envelope.
    pub fn success(payload: impl Into<Value>) -> Self {
        Envelope::Success {
            payload: payload.into(),
        }
    }

    /// Build an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            message: message.into(),
        }
    }

    /// Returns true for [`Envelope::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    /// The success payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Envelope::Success { payload } => Some(payload),
            Envelope::Error { .. } => None,
        }
    }

    /// The error message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Error { message } => Some(message),
        }
    }

    /// A flat text rendering, used when recording history.
    pub fn to_text(&self) -> String {
        match self {
            Envelope::Success {
                payload: Value::String(s),
            } => s.clone(),
            Envelope::Success { payload } => payload.to_string(),
            Envelope::Error { message } => format!("Error: {message}"),
        }
    }
}
