//! Domain types shared by the backend, the run state machine and the tools

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a run as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
    /// Any status string this client does not know about
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Terminal statuses end the poll loop. `expired` is upstream's
    /// terminal failure for runs whose action deadline passed; `incomplete`
    /// ended early but still produced a (partial) message.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Incomplete | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub code: String,
    pub message: String,
}

/// One asynchronous unit of work against a thread
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    /// Present only while `status` is `requires_action`
    pub required_action: Option<PendingActionBatch>,
    pub last_error: Option<RunFailure>,
}

#[cfg(test)]
impl Run {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            status,
            required_action: None,
            last_error: None,
        }
    }

    pub fn with_actions(mut self, batch: PendingActionBatch) -> Self {
        self.required_action = Some(batch);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.last_error = Some(RunFailure {
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

/// Tool call arguments, parsed once when the run is decoded.
///
/// The dispatcher only ever sees this representation: a JSON object, or the
/// raw text together with the reason it could not be used.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    Parsed(Map<String, Value>),
    Malformed { raw: String, reason: String },
}

impl ToolArguments {
    /// Parse the wire argument string. Blank input means "no arguments".
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Parsed(Map::new());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self::Parsed(map),
            Ok(other) => Self::Malformed {
                raw: raw.to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            },
            Err(e) => Self::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// Render back to the wire string form
    pub fn to_wire(&self) -> String {
        match self {
            Self::Parsed(map) => Value::Object(map.clone()).to_string(),
            Self::Malformed { raw, .. } => raw.clone(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A single tool call the backend asks the client to execute
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: ToolArguments,
}

impl PendingAction {
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: ToolArguments,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Ordered tool calls attached to a `requires_action` run
pub type PendingActionBatch = Vec<PendingAction>;

/// Result for one tool call, submitted back to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    #[serde(rename = "tool_call_id")]
    pub call_id: String,
    pub output: String,
    #[serde(skip)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: message.into(),
            is_error: true,
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// Message in a thread
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Assistant profile available to runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assistant {
    pub id: String,
    pub name: Option<String>,
    pub model: String,
}

impl Assistant {
    /// Name for menus; unnamed assistants fall back to their id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Optional per-run overrides forwarded with create-run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub tools: Option<Vec<Value>>,
}
