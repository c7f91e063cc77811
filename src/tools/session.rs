//! Tools that act on the live chat session

use super::{parse_input, Tool, ToolContext, ToolError};
use crate::session::SessionCommand;
use crate::store::{RequiredParams, ToolMetadata};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn no_arguments() -> Value {
    json!({"type": "object", "properties": {}})
}

/// `list_system_tools`: every known tool name with its blurb
pub struct ListSystemToolsTool;

#[async_trait]
impl Tool for ListSystemToolsTool {
    fn name(&self) -> &'static str {
        "list_system_tools"
    }

    fn description(&self) -> String {
        "Lists all available system tools with a short description of each.".to_string()
    }

    fn input_schema(&self) -> Value {
        no_arguments()
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let registry = &ctx.session()?.registry;
        let listing: Map<String, Value> = registry
            .metadata_names()
            .into_iter()
            .filter_map(|name| {
                let meta = registry.metadata(&name)?;
                Some((name, Value::String(meta.tool_meta_description)))
            })
            .collect();
        Ok(Value::Object(listing).to_string())
    }
}

/// `list_assistants`: `{name: id}` for the account
pub struct ListAssistantsTool;

#[async_trait]
impl Tool for ListAssistantsTool {
    fn name(&self) -> &'static str {
        "list_assistants"
    }

    fn description(&self) -> String {
        "Lists available assistants by name and id.".to_string()
    }

    fn input_schema(&self) -> Value {
        no_arguments()
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let assistants = ctx.session()?.backend.list_assistants().await?;
        let listing: Map<String, Value> = assistants
            .iter()
            .map(|a| (a.label().to_string(), Value::String(a.id.clone())))
            .collect();
        Ok(Value::Object(listing).to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SwapInput {
    new_assistant_id: String,
}

/// `swap_assistant {new_assistant_id}`: takes effect before the next prompt
pub struct SwapAssistantTool;

#[async_trait]
impl Tool for SwapAssistantTool {
    fn name(&self) -> &'static str {
        "swap_assistant"
    }

    fn description(&self) -> String {
        "Switches the chat to another assistant starting with the next user turn.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["new_assistant_id"],
            "properties": {"new_assistant_id": {"type": "string"}}
        })
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: SwapInput = parse_input(input)?;
        if input.new_assistant_id.trim().is_empty() {
            return Err(ToolError::InvalidInput("new_assistant_id is empty".to_string()));
        }
        let scope = ctx.session()?;
        scope
            .commands
            .send(SessionCommand::ChangeAssistant {
                assistant_id: input.new_assistant_id.clone(),
            })
            .map_err(|_| ToolError::Failed("chat session is gone".to_string()))?;
        Ok(input.new_assistant_id)
    }
}

#[derive(Debug, Deserialize)]
struct EnableInput {
    assistant_id: String,
    tool_list: Vec<String>,
}

/// `enable_tools {assistant_id, tool_list}`: replaces the assistant's tool set
pub struct EnableToolsTool;

#[async_trait]
impl Tool for EnableToolsTool {
    fn name(&self) -> &'static str {
        "enable_tools"
    }

    fn description(&self) -> String {
        "Replaces the tools enabled on an assistant with the named system tools.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["assistant_id", "tool_list"],
            "properties": {
                "assistant_id": {"type": "string"},
                "tool_list": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: EnableInput = parse_input(input)?;
        let scope = ctx.session()?;

        let mut definitions = Vec::with_capacity(input.tool_list.len());
        let mut unknown = Vec::new();
        for name in &input.tool_list {
            match scope.registry.definition(name) {
                Some(def) => definitions.push(def),
                None => unknown.push(name.as_str()),
            }
        }
        if !unknown.is_empty() {
            return Err(ToolError::InvalidInput(format!(
                "unknown tools: {}",
                unknown.join(", ")
            )));
        }

        let assistant = scope
            .backend
            .update_assistant_tools(&input.assistant_id, &definitions)
            .await?;
        Ok(format!(
            "Enabled {} tools on {}: {}",
            definitions.len(),
            assistant.label(),
            input.tool_list.join(", ")
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RegisterInput {
    tool_name: String,
    tool_script: String,
    #[serde(default)]
    tool_description: String,
    #[serde(default)]
    tool_required: RequiredParams,
    #[serde(default)]
    tool_properties: Option<Value>,
    #[serde(default)]
    tool_meta_description: String,
}

/// `tool_properties` may arrive as an object or as JSON text
fn properties_object(value: Option<Value>) -> Result<Value, ToolError> {
    match value {
        None | Some(Value::Null) => Ok(json!({})),
        Some(Value::Object(map)) => Ok(Value::Object(map)),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(json!({})),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Value::Object(map)),
            _ => Err(ToolError::InvalidInput(
                "tool_properties must be a JSON object".to_string(),
            )),
        },
        Some(_) => Err(ToolError::InvalidInput(
            "tool_properties must be a JSON object".to_string(),
        )),
    }
}

/// `register_tool {...}`: adds a script-backed tool to the Dynamic namespace
pub struct RegisterToolTool;

#[async_trait]
impl Tool for RegisterToolTool {
    fn name(&self) -> &'static str {
        "register_tool"
    }

    fn description(&self) -> String {
        "Registers a new bash-backed tool. The script receives its arguments as TOOL_ARGS \
         (JSON) and one ARG_<NAME> variable per scalar argument."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["tool_name", "tool_script", "tool_description"],
            "properties": {
                "tool_name": {"type": "string"},
                "tool_script": {"type": "string"},
                "tool_description": {"type": "string"},
                "tool_required": {"type": "array", "items": {"type": "string"}},
                "tool_properties": {"type": "object"},
                "tool_meta_description": {"type": "string"}
            }
        })
    }

    fn needs_context(&self) -> bool {
        true
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: RegisterInput = parse_input(input)?;
        let scope = ctx.session()?;

        let meta = ToolMetadata {
            tool_name: input.tool_name.trim().to_string(),
            tool_required: input.tool_required,
            tool_description: input.tool_description,
            tool_properties: properties_object(input.tool_properties)?,
            tool_meta_description: input.tool_meta_description,
            tool_script: Some(input.tool_script),
        };
        let name = meta.tool_name.clone();

        // The store write is blocking file I/O
        let registry = scope.registry.clone();
        tokio::task::spawn_blocking(move || registry.register_dynamic(meta))
            .await
            .map_err(|e| ToolError::Failed(format!("registration task failed: {e}")))??;

        tracing::info!(
            call_id = %ctx.call_id,
            thread_id = %scope.thread_id,
            assistant_id = %scope.assistant_id,
            tool = %name,
            "Tool registered by assistant"
        );
        Ok(format!("Registered tool '{name}'"))
    }
}
