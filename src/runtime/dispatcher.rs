//! Maps a pending batch to one output per call id

use crate::backend::{PendingAction, ToolArguments, ToolOutput};
use crate::tools::{Resolution, SessionScope, ToolContext, ToolError, ToolRegistry};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a timed-out tool gets to react to cancellation before it is aborted
const CANCEL_GRACE: Duration = Duration::from_millis(500);

/// Why a call produced an error output. Always rendered into the output
/// string, never propagated.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Error: could not parse arguments for '{tool}': {reason}")]
    ArgumentParse { tool: String, reason: String },
    #[error("Error: tool '{0}' not found")]
    NotFound(String),
    #[error("Error: {0}")]
    Execution(#[from] ToolError),
    #[error("Error: tool '{tool}' timed out after {after:?}")]
    TimedOut { tool: String, after: Duration },
    #[error("Error: tool '{0}' panicked")]
    Panicked(String),
}

/// Runs each action of a batch in turn
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Option<Duration>) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// One output per distinct call id, in batch order.
    ///
    /// A failing tool never stops the batch.
    pub async fn dispatch(&self, batch: &[PendingAction], scope: &SessionScope) -> Vec<ToolOutput> {
        let mut answered = HashSet::new();
        let mut outputs = Vec::with_capacity(batch.len());

        for action in batch {
            if !answered.insert(action.call_id.as_str()) {
                tracing::warn!(call_id = %action.call_id, tool = %action.tool_name, "Skipping repeated call id");
                continue;
            }

            let output = match self.dispatch_one(action, scope).await {
                Ok(text) => ToolOutput::success(action.call_id.clone(), text),
                Err(e) => {
                    tracing::warn!(
                        call_id = %action.call_id,
                        tool = %action.tool_name,
                        args = %action.arguments.to_wire(),
                        error = %e,
                        "Tool call failed"
                    );
                    ToolOutput::error(action.call_id.clone(), e.to_string())
                }
            };
            outputs.push(output);
        }

        outputs
    }

    async fn dispatch_one(
        &self,
        action: &PendingAction,
        scope: &SessionScope,
    ) -> Result<String, DispatchError> {
        let input = match &action.arguments {
            ToolArguments::Parsed(map) => Value::Object(map.clone()),
            ToolArguments::Malformed { reason, .. } => {
                return Err(DispatchError::ArgumentParse {
                    tool: action.tool_name.clone(),
                    reason: reason.clone(),
                });
            }
        };

        let resolved = match self.registry.resolve(&action.tool_name) {
            Resolution::Resolved(resolved) => resolved,
            Resolution::NotFound => return Err(DispatchError::NotFound(action.tool_name.clone())),
        };

        let cancel = CancellationToken::new();
        let mut ctx = ToolContext::new(action.call_id.clone(), cancel.clone());
        if resolved.needs_context() {
            ctx = ctx.with_session(scope.clone());
        }

        tracing::debug!(call_id = %action.call_id, tool = %action.tool_name, namespace = ?resolved.namespace, "Running tool");
        let tool = resolved.tool;
        let mut handle = tokio::spawn(async move { tool.run(input, ctx).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    if tokio::time::timeout(CANCEL_GRACE, &mut handle).await.is_err() {
                        handle.abort();
                    }
                    return Err(DispatchError::TimedOut {
                        tool: action.tool_name.clone(),
                        after: limit,
                    });
                }
            },
            None => (&mut handle).await,
        };

        match joined {
            Ok(result) => result.map_err(DispatchError::Execution),
            Err(join_error) if join_error.is_panic() => {
                Err(DispatchError::Panicked(action.tool_name.clone()))
            }
            Err(_) => Err(DispatchError::Execution(ToolError::Failed(
                "tool task was cancelled".to_string(),
            ))),
        }
    }
}
