//! `exec_python {cell}`

use super::shell::{run_process, ShellLimits};
use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Replies longer than this many chars are cut
const MAX_REPLY_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
struct PythonInput {
    cell: String,
}

/// Runs a cell with `python3 -c` in a fresh interpreter
pub struct ExecPythonTool {
    limits: ShellLimits,
}

impl ExecPythonTool {
    pub fn new(limits: ShellLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for ExecPythonTool {
    fn name(&self) -> &'static str {
        "exec_python"
    }

    fn description(&self) -> String {
        "Runs a Python cell and returns what it printed, including any traceback. \
         Each call starts a new interpreter."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["cell"],
            "properties": {
                "cell": {
                    "type": "string",
                    "description": "Python source to execute"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: PythonInput = parse_input(input)?;
        if input.cell.trim().is_empty() {
            return Err(ToolError::InvalidInput("cell cannot be empty".to_string()));
        }
        tracing::debug!(call_id = %ctx.call_id, "Running python cell");

        let args = ["-c", input.cell.as_str()];
        match run_process("python3", &args, &[], self.limits, &ctx.cancel).await {
            Ok(output) => Ok(clip(&output)),
            Err(ToolError::Failed(output)) => Err(ToolError::Failed(clip(&output))),
            Err(e) => Err(e),
        }
    }
}

fn clip(output: &str) -> String {
    match output.char_indices().nth(MAX_REPLY_CHARS) {
        Some((end, _)) => {
            let head = output.get(..end).unwrap_or_default();
            format!("{head}\n\n... truncated")
        }
        None => output.to_string(),
    }
}
