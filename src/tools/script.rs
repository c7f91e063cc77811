//! Tools registered at runtime with a bash body

use super::shell::{run_bash, ShellLimits};
use super::{Tool, ToolContext, ToolError};
use crate::store::ToolMetadata;
use async_trait::async_trait;
use serde_json::Value;

/// Runs the stored script with the arguments in the environment:
/// `TOOL_ARGS` holds the whole object as JSON, and each scalar argument is
/// also exported as `ARG_<NAME>`.
pub struct ScriptTool {
    meta: ToolMetadata,
    script: String,
    limits: ShellLimits,
}

impl ScriptTool {
    pub fn new(meta: ToolMetadata, script: String, limits: ShellLimits) -> Self {
        Self {
            meta,
            script,
            limits,
        }
    }
}

fn script_env(input: &Value) -> Vec<(String, String)> {
    let mut env = vec![("TOOL_ARGS".to_string(), input.to_string())];
    if let Value::Object(map) = input {
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            env.push((format!("ARG_{}", env_name(key)), rendered));
        }
    }
    env
}

/// Uppercase, with anything outside `[A-Z0-9_]` replaced by `_`
fn env_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &str {
        &self.meta.tool_name
    }

    fn description(&self) -> String {
        self.meta.tool_description.clone()
    }

    fn input_schema(&self) -> Value {
        self.meta.parameters_schema()
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let env = script_env(&input);
        run_bash(&self.script, &env, self.limits, &ctx.cancel).await
    }
}
