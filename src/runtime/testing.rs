//! Mock implementations for testing
//!
//! These mocks enable end-to-end run tests without real I/O.

use crate::backend::{
    Assistant, Backend, Message, MessageRole, Run, RunOverrides, RunStatus, ToolOutput,
    TransportError,
};
use crate::session::SessionCommand;
use crate::tools::{SessionScope, Tool, ToolContext, ToolError, ToolRegistry};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Mock Backend
// ============================================================================

/// One scripted `get_run` answer
struct Observation {
    run: Result<Run, TransportError>,
    /// Assistant message appended to the thread when this is observed
    reply: Option<String>,
}

/// In-memory backend with scripted run observations.
///
/// Once the script is exhausted every observation is `in_progress`.
#[allow(dead_code)]
pub struct MockBackend {
    observations: Mutex<VecDeque<Observation>>,
    /// Per thread, oldest first
    threads: Mutex<HashMap<String, Vec<Message>>>,
    assistants: Mutex<Vec<Assistant>>,
    next_id: AtomicU32,
    created_runs: Mutex<Vec<(String, String, RunOverrides)>>,
    get_run_calls: AtomicU32,
    submissions: Mutex<Vec<Vec<ToolOutput>>>,
    cancel_calls: AtomicU32,
    tool_updates: Mutex<Vec<(String, Vec<Value>)>>,
    last_run_id: Mutex<Option<String>>,
    /// Keyed by 1-based `list_assistants` call number
    assistant_errors: Mutex<HashMap<u32, TransportError>>,
    list_assistant_calls: AtomicU32,
    /// Served ahead of normal answers, one per call
    cancel_errors: Mutex<VecDeque<TransportError>>,
    thread_errors: Mutex<VecDeque<TransportError>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self {
            observations: Mutex::new(VecDeque::new()),
            threads: Mutex::new(HashMap::new()),
            assistants: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            created_runs: Mutex::new(Vec::new()),
            get_run_calls: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
            cancel_calls: AtomicU32::new(0),
            tool_updates: Mutex::new(Vec::new()),
            last_run_id: Mutex::new(None),
            assistant_errors: Mutex::new(HashMap::new()),
            list_assistant_calls: AtomicU32::new(0),
            cancel_errors: Mutex::new(VecDeque::new()),
            thread_errors: Mutex::new(VecDeque::new()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Queue the next `get_run` answer
    pub fn queue_run(&self, run: Run) {
        self.observations.lock().unwrap().push_back(Observation {
            run: Ok(run),
            reply: None,
        });
    }

    /// Queue a `completed` observation that also adds an assistant reply
    pub fn queue_completion(&self, reply: impl Into<String>) {
        self.observations.lock().unwrap().push_back(Observation {
            run: Ok(Run::new("run_mock", "thread_mock", RunStatus::Completed)),
            reply: Some(reply.into()),
        });
    }

    /// Queue a failing `get_run`
    pub fn queue_run_error(&self, error: TransportError) {
        self.observations.lock().unwrap().push_back(Observation {
            run: Err(error),
            reply: None,
        });
    }

    /// Fail the `call`-th `list_assistants` call, counting from 1
    pub fn fail_list_assistants_on(&self, call: u32, error: TransportError) {
        self.assistant_errors.lock().unwrap().insert(call, error);
    }

    /// Fail the next `cancel_run` call
    pub fn fail_cancel(&self, error: TransportError) {
        self.cancel_errors.lock().unwrap().push_back(error);
    }

    /// Fail the next `create_thread` call
    pub fn fail_create_thread(&self, error: TransportError) {
        self.thread_errors.lock().unwrap().push_back(error);
    }

    pub fn set_assistants(&self, assistants: Vec<Assistant>) {
        *self.assistants.lock().unwrap() = assistants;
    }

    /// Append a message directly, as if written by another client
    pub fn push_message(&self, thread_id: &str, role: MessageRole, text: &str) -> Message {
        let message = Message {
            id: self.next_id("msg"),
            role,
            text: text.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.threads
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }

    /// Ids of every message in the thread
    pub fn message_ids(&self, thread_id: &str) -> Vec<String> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .map(|msgs| msgs.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn thread_ids(&self) -> Vec<String> {
        self.threads.lock().unwrap().keys().cloned().collect()
    }

    pub fn created_runs(&self) -> Vec<(String, String, RunOverrides)> {
        self.created_runs.lock().unwrap().clone()
    }

    pub fn get_run_calls(&self) -> u32 {
        self.get_run_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Vec<ToolOutput>> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn tool_updates(&self) -> Vec<(String, Vec<Value>)> {
        self.tool_updates.lock().unwrap().clone()
    }

    pub fn last_run_id(&self) -> Option<String> {
        self.last_run_id.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_thread(&self) -> Result<String, TransportError> {
        if let Some(error) = self.thread_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let id = self.next_id("thread");
        self.threads.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, TransportError> {
        let threads = self.threads.lock().unwrap();
        let mut messages = threads.get(thread_id).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, TransportError> {
        Ok(self.push_message(thread_id, role, text))
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        overrides: &RunOverrides,
    ) -> Result<Run, TransportError> {
        self.created_runs.lock().unwrap().push((
            thread_id.to_string(),
            assistant_id.to_string(),
            overrides.clone(),
        ));
        let id = self.next_id("run");
        *self.last_run_id.lock().unwrap() = Some(id.clone());
        Ok(Run::new(id, thread_id, RunStatus::Queued))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        self.get_run_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.observations.lock().unwrap().pop_front();
        match next {
            Some(Observation { run, reply }) => {
                if let Some(text) = reply {
                    self.push_message(thread_id, MessageRole::Assistant, &text);
                }
                run.map(|mut r| {
                    r.id = run_id.to_string();
                    r.thread_id = thread_id.to_string();
                    r
                })
            }
            None => Ok(Run::new(run_id, thread_id, RunStatus::InProgress)),
        }
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TransportError> {
        self.submissions.lock().unwrap().push(outputs.to_vec());
        Ok(Run::new(run_id, thread_id, RunStatus::Queued))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.cancel_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Run::new(run_id, thread_id, RunStatus::Cancelling))
    }

    async fn list_assistants(&self) -> Result<Vec<Assistant>, TransportError> {
        let call = self.list_assistant_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.assistant_errors.lock().unwrap().remove(&call) {
            return Err(error);
        }
        Ok(self.assistants.lock().unwrap().clone())
    }

    async fn update_assistant_tools(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<Assistant, TransportError> {
        self.tool_updates
            .lock()
            .unwrap()
            .push((assistant_id.to_string(), tools.to_vec()));
        let known = self
            .assistants
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == assistant_id)
            .cloned();
        Ok(known.unwrap_or_else(|| Assistant {
            id: assistant_id.to_string(),
            name: None,
            model: "mock-model".to_string(),
        }))
    }
}

/// Session handles over `backend` for dispatching outside a session
pub fn scope_for(
    backend: Arc<MockBackend>,
    registry: Arc<ToolRegistry>,
) -> (SessionScope, mpsc::UnboundedReceiver<SessionCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let scope = SessionScope {
        thread_id: "thread_1".to_string(),
        assistant_id: "asst_1".to_string(),
        backend,
        registry,
        commands: tx,
    };
    (scope, rx)
}

// ============================================================================
// Test Tools
// ============================================================================

/// Returns its input object as JSON text
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> String {
        "Echoes its arguments".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        Ok(input.to_string())
    }
}

/// Always returns an error
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn description(&self) -> String {
        "Fails".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        Err(ToolError::Failed("deliberate failure".to_string()))
    }
}

/// Panics inside its task
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn description(&self) -> String {
        "Panics".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        panic!("tool blew up");
    }
}

/// Sleeps far longer than any test timeout unless cancelled
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn description(&self) -> String {
        "Sleeps".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        tokio::select! {
            () = ctx.cancel.cancelled() => Err(ToolError::Failed("cancelled".to_string())),
            () = tokio::time::sleep(Duration::from_secs(60)) => Ok("woke up".to_string()),
        }
    }
}
