//! Local file tools

use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    file_name: String,
    content: String,
}

/// `read_file {file_name}`
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> String {
        "Reads a text file and returns its contents.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["file_name"],
            "properties": {
                "file_name": {"type": "string", "description": "Path of the file to read"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        let input: ReadFileInput = parse_input(input)?;
        tokio::fs::read_to_string(&input.file_name)
            .await
            .map_err(|e| ToolError::Failed(format!("cannot read {}: {e}", input.file_name)))
    }
}

/// `write_file {file_name, content}`
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> String {
        "Writes text to a file, replacing any existing contents.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["file_name", "content"],
            "properties": {
                "file_name": {"type": "string", "description": "Path of the file to write"},
                "content": {"type": "string", "description": "Full text to write"}
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<String, ToolError> {
        let input: WriteFileInput = parse_input(input)?;
        tokio::fs::write(&input.file_name, input.content.as_bytes())
            .await
            .map_err(|e| ToolError::Failed(format!("cannot write {}: {e}", input.file_name)))?;
        Ok(format!(
            "Wrote {} bytes to {}",
            input.content.len(),
            input.file_name
        ))
    }
}
