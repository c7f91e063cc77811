//! Conversation backend abstraction
//!
//! The run executor and the session only talk to the upstream assistant
//! service through the `Backend` trait, so alternate services and the test
//! mock plug in without touching the core.

mod error;
mod openai;
mod types;

pub use error::TransportError;
#[cfg(test)]
pub use error::TransportErrorKind;
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Request/response surface of the upstream assistant API
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create an empty thread and return its id
    async fn create_thread(&self) -> Result<String, TransportError>;

    /// All messages of a thread, newest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, TransportError>;

    /// Append a message to a thread
    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, TransportError>;

    /// Start a run of `assistant_id` on `thread_id`
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        overrides: &RunOverrides,
    ) -> Result<Run, TransportError>;

    /// Observe the current state of a run
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError>;

    /// Answer a `requires_action` run with one output per call id
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TransportError>;

    /// Ask the backend to stop a run
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError>;

    /// Assistants visible to the API key
    async fn list_assistants(&self) -> Result<Vec<Assistant>, TransportError>;

    /// Replace the function tools enabled on an assistant
    async fn update_assistant_tools(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<Assistant, TransportError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: Backend + ?Sized> Backend for Arc<T> {
    async fn create_thread(&self) -> Result<String, TransportError> {
        (**self).create_thread().await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, TransportError> {
        (**self).list_messages(thread_id).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, TransportError> {
        (**self).create_message(thread_id, role, text).await
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        overrides: &RunOverrides,
    ) -> Result<Run, TransportError> {
        (**self).create_run(thread_id, assistant_id, overrides).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        (**self).get_run(thread_id, run_id).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TransportError> {
        (**self).submit_tool_outputs(thread_id, run_id, outputs).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        (**self).cancel_run(thread_id, run_id).await
    }

    async fn list_assistants(&self) -> Result<Vec<Assistant>, TransportError> {
        (**self).list_assistants().await
    }

    async fn update_assistant_tools(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<Assistant, TransportError> {
        (**self).update_assistant_tools(assistant_id, tools).await
    }
}

// ============================================================================
// Logging wrapper
// ============================================================================

/// Logs duration and outcome of every backend call
pub struct LoggingBackend<B> {
    inner: B,
}

impl<B: Backend> LoggingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

fn log_call<T>(operation: &'static str, start: Instant, result: &Result<T, TransportError>) {
    let duration_ms = start.elapsed().as_millis();
    match result {
        Ok(_) => tracing::debug!(operation, duration_ms = %duration_ms, "Backend call completed"),
        Err(e) => tracing::error!(
            operation,
            duration_ms = %duration_ms,
            error = %e.message,
            retryable = e.kind.is_retryable(),
            "Backend call failed"
        ),
    }
}

#[async_trait]
impl<B: Backend> Backend for LoggingBackend<B> {
    async fn create_thread(&self) -> Result<String, TransportError> {
        let start = Instant::now();
        let result = self.inner.create_thread().await;
        log_call("create_thread", start, &result);
        result
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, TransportError> {
        let start = Instant::now();
        let result = self.inner.list_messages(thread_id).await;
        log_call("list_messages", start, &result);
        result
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, TransportError> {
        let start = Instant::now();
        let result = self.inner.create_message(thread_id, role, text).await;
        log_call("create_message", start, &result);
        result
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        overrides: &RunOverrides,
    ) -> Result<Run, TransportError> {
        let start = Instant::now();
        let result = self.inner.create_run(thread_id, assistant_id, overrides).await;
        log_call("create_run", start, &result);
        if let Ok(run) = &result {
            tracing::info!(run_id = %run.id, thread_id, assistant_id, "Run created");
        }
        result
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        let start = Instant::now();
        let result = self.inner.get_run(thread_id, run_id).await;
        log_call("get_run", start, &result);
        result
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TransportError> {
        let start = Instant::now();
        let result = self
            .inner
            .submit_tool_outputs(thread_id, run_id, outputs)
            .await;
        log_call("submit_tool_outputs", start, &result);
        result
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        let start = Instant::now();
        let result = self.inner.cancel_run(thread_id, run_id).await;
        log_call("cancel_run", start, &result);
        result
    }

    async fn list_assistants(&self) -> Result<Vec<Assistant>, TransportError> {
        let start = Instant::now();
        let result = self.inner.list_assistants().await;
        log_call("list_assistants", start, &result);
        result
    }

    async fn update_assistant_tools(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<Assistant, TransportError> {
        let start = Instant::now();
        let result = self.inner.update_assistant_tools(assistant_id, tools).await;
        log_call("update_assistant_tools", start, &result);
        result
    }
}
