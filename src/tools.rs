//! Local tools the assistant can call
//!
//! Tools are stateless singletons; per-call context arrives via `ToolContext`.

mod files;
mod python;
mod script;
mod session;
mod shell;
mod weather;

pub use files::{ReadFileTool, WriteFileTool};
pub use python::ExecPythonTool;
pub use script::ScriptTool;
pub use session::{
    EnableToolsTool, ListAssistantsTool, ListSystemToolsTool, RegisterToolTool, SwapAssistantTool,
};
pub use shell::{ExecShellTool, ShellLimits};
pub use weather::WeatherForecastTool;

use crate::backend::{Backend, TransportError};
use crate::session::SessionCommand;
use crate::store::{StoreError, ToolMetadata, ToolStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Errors raised by tool implementations
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Http(String),
    #[error("tool needs session context but none was provided")]
    MissingContext,
    #[error("registration failed: {0}")]
    Registration(String),
    #[error("backend error: {0}")]
    Backend(#[from] TransportError),
    #[error("{0}")]
    Failed(String),
}

impl From<StoreError> for ToolError {
    fn from(e: StoreError) -> Self {
        ToolError::Registration(e.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        ToolError::Http(e.to_string())
    }
}

/// Deserialize a tool's input object into its typed form
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Handles into the live chat session, for tools that act on it
#[derive(Clone)]
pub struct SessionScope {
    pub thread_id: String,
    pub assistant_id: String,
    pub backend: Arc<dyn Backend>,
    pub registry: Arc<ToolRegistry>,
    /// Changes the session applies before the next prompt
    pub commands: mpsc::UnboundedSender<SessionCommand>,
}

/// All context for one tool invocation.
///
/// Created fresh for each call.
#[derive(Clone)]
pub struct ToolContext {
    /// Cancelled when the call times out
    pub cancel: CancellationToken,
    pub call_id: String,
    session: Option<SessionScope>,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            call_id: call_id.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, scope: SessionScope) -> Self {
        self.session = Some(scope);
        self
    }

    /// Session handles; only present for tools that declare `needs_context`
    pub fn session(&self) -> Result<&SessionScope, ToolError> {
        self.session.as_ref().ok_or(ToolError::MissingContext)
    }
}

/// A callable the assistant can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Description advertised upstream when no metadata entry exists
    fn description(&self) -> String;

    /// JSON schema for the argument object
    fn input_schema(&self) -> Value;

    /// Whether the tool needs `SessionScope` handles
    fn needs_context(&self) -> bool {
        false
    }

    /// Execute with the already-parsed argument object.
    ///
    /// Long-running tools should watch `ctx.cancel`.
    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Namespace a tool was found in. Lookup order is declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Bound to the live session
    Session,
    /// Registered at runtime, file-backed
    Dynamic,
    /// Built-in defaults
    Static,
}

/// A tool found by name
#[derive(Clone)]
pub struct ResolvedTool {
    pub tool: Arc<dyn Tool>,
    pub namespace: Namespace,
}

impl ResolvedTool {
    pub fn needs_context(&self) -> bool {
        self.tool.needs_context()
    }
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("name", &self.tool.name())
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Outcome of a name lookup
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(ResolvedTool),
    NotFound,
}

#[derive(Default)]
struct DynamicTools {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Default entries overlaid with dynamic ones
    metadata: BTreeMap<String, ToolMetadata>,
}

/// Ordered lookup over the Session, Dynamic and Static namespaces
pub struct ToolRegistry {
    session: HashMap<String, Arc<dyn Tool>>,
    statics: HashMap<String, Arc<dyn Tool>>,
    dynamic: RwLock<DynamicTools>,
    store: Option<ToolStore>,
    /// Applied to script-backed tools
    limits: ShellLimits,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Empty registry without persistence
    pub fn new() -> Self {
        Self {
            session: HashMap::new(),
            statics: HashMap::new(),
            dynamic: RwLock::new(DynamicTools::default()),
            store: None,
            limits: ShellLimits::default(),
        }
    }

    /// Built-in tools plus whatever the store holds
    pub fn standard(store: ToolStore, limits: ShellLimits) -> Result<Self, StoreError> {
        let registry = Self::new()
            .with_limits(limits)
            .with_static(Arc::new(ReadFileTool))
            .with_static(Arc::new(WriteFileTool))
            .with_static(Arc::new(ExecShellTool::new(limits)))
            .with_static(Arc::new(ExecPythonTool::new(limits)))
            .with_static(Arc::new(WeatherForecastTool::default()))
            .with_session(Arc::new(ListSystemToolsTool))
            .with_session(Arc::new(ListAssistantsTool))
            .with_session(Arc::new(SwapAssistantTool))
            .with_session(Arc::new(EnableToolsTool))
            .with_session(Arc::new(RegisterToolTool));
        registry.with_store(store)
    }

    pub fn with_limits(mut self, limits: ShellLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_static(mut self, tool: Arc<dyn Tool>) -> Self {
        self.statics.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with_session(mut self, tool: Arc<dyn Tool>) -> Self {
        self.session.insert(tool.name().to_string(), tool);
        self
    }

    /// Load merged metadata and script tools from `store`, and persist future
    /// registrations there
    pub fn with_store(mut self, store: ToolStore) -> Result<Self, StoreError> {
        let limits = self.limits;
        let defaults = store.load_defaults()?;
        let dynamic = store.load_dynamic()?;

        {
            let state = self.dynamic.get_mut().unwrap_or_else(PoisonError::into_inner);
            state.metadata.extend(defaults);
            for (name, meta) in dynamic {
                if let Some(script) = meta.tool_script.clone() {
                    state
                        .tools
                        .insert(name.clone(), Arc::new(ScriptTool::new(meta.clone(), script, limits)));
                }
                state.metadata.insert(name, meta);
            }
        }

        self.store = Some(store);
        Ok(self)
    }

    /// Find a tool by name: Session, then Dynamic, then Static
    pub fn resolve(&self, name: &str) -> Resolution {
        if let Some(tool) = self.session.get(name) {
            return Resolution::Resolved(ResolvedTool {
                tool: tool.clone(),
                namespace: Namespace::Session,
            });
        }

        let dynamic = self.dynamic.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tool) = dynamic.tools.get(name) {
            return Resolution::Resolved(ResolvedTool {
                tool: tool.clone(),
                namespace: Namespace::Dynamic,
            });
        }
        drop(dynamic);

        match self.statics.get(name) {
            Some(tool) => Resolution::Resolved(ResolvedTool {
                tool: tool.clone(),
                namespace: Namespace::Static,
            }),
            None => Resolution::NotFound,
        }
    }

    /// Merged metadata entry for `name`
    pub fn metadata(&self, name: &str) -> Option<ToolMetadata> {
        self.dynamic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .metadata
            .get(name)
            .cloned()
    }

    /// Names of every tool with a metadata entry, sorted
    pub fn metadata_names(&self) -> Vec<String> {
        self.dynamic
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .metadata
            .keys()
            .cloned()
            .collect()
    }

    /// Function-tool definition to advertise upstream.
    ///
    /// Store metadata wins; tools without an entry fall back to their own
    /// description and schema. Unknown names yield `None`.
    pub fn definition(&self, name: &str) -> Option<Value> {
        let (description, parameters) = match self.metadata(name) {
            Some(meta) => (meta.tool_description.clone(), meta.parameters_schema()),
            None => match self.resolve(name) {
                Resolution::Resolved(resolved) => {
                    (resolved.tool.description(), resolved.tool.input_schema())
                }
                Resolution::NotFound => return None,
            },
        };

        Some(json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
            }
        }))
    }

    /// Register a script-backed tool.
    ///
    /// The entry is persisted before it becomes callable. An existing dynamic
    /// entry with the same name is replaced.
    pub fn register_dynamic(&self, meta: ToolMetadata) -> Result<(), ToolError> {
        let Some(script) = meta.tool_script.clone() else {
            return Err(ToolError::Registration(format!(
                "tool '{}' has no script",
                meta.tool_name
            )));
        };
        if meta.tool_name.trim().is_empty() {
            return Err(ToolError::Registration("tool name is empty".to_string()));
        }
        if self.session.contains_key(&meta.tool_name) {
            return Err(ToolError::Registration(format!(
                "'{}' is a built-in session tool",
                meta.tool_name
            )));
        }

        if let Some(store) = &self.store {
            store.append_dynamic(&meta)?;
        }

        let name = meta.tool_name.clone();
        let tool = Arc::new(ScriptTool::new(meta.clone(), script, self.limits));
        let mut state = self.dynamic.write().unwrap_or_else(PoisonError::into_inner);
        state.tools.insert(name.clone(), tool);
        state.metadata.insert(name.clone(), meta);
        drop(state);

        tracing::info!(tool = %name, "Registered dynamic tool");
        Ok(())
    }
}
