//! `OpenAI` Assistants API backend (threads, messages, runs)

use super::types::{
    Assistant, Message, MessageRole, PendingAction, Run, RunFailure, RunOverrides, RunStatus,
    ToolArguments, ToolOutput,
};
use super::{Backend, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ASSISTANTS_BETA: &str = "assistants=v2";
const PAGE_LIMIT: u32 = 100;

/// Connection settings for the upstream API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub organization: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            organization: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP implementation of `Backend`
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .bearer_auth(&self.config.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA);
        match &self.config.organization {
            Some(org) => request.header("OpenAI-Organization", org),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &body));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::decode(format!("Unexpected response body: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.send(self.client.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn create_thread(&self) -> Result<String, TransportError> {
        let thread: ThreadWire = self.post("threads", &json!({})).await?;
        Ok(thread.id)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, TransportError> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut path = format!("threads/{thread_id}/messages?order=desc&limit={PAGE_LIMIT}");
            if let Some(cursor) = &after {
                path.push_str("&after=");
                path.push_str(cursor);
            }
            let page: ListWire<MessageWire> = self.get(&path).await?;
            let has_more = page.has_more;
            after = page.last_id.clone();
            messages.extend(page.data.into_iter().map(MessageWire::into_message));
            if !has_more || after.is_none() {
                break;
            }
        }
        Ok(messages)
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        text: &str,
    ) -> Result<Message, TransportError> {
        let body = json!({ "role": role, "content": text });
        let message: MessageWire = self
            .post(&format!("threads/{thread_id}/messages"), &body)
            .await?;
        Ok(message.into_message())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        overrides: &RunOverrides,
    ) -> Result<Run, TransportError> {
        let body = CreateRunWire {
            assistant_id,
            model: overrides.model.as_deref(),
            instructions: overrides.instructions.as_deref(),
            tools: overrides.tools.as_deref(),
        };
        let run: RunWire = self.post(&format!("threads/{thread_id}/runs"), &body).await?;
        Ok(run.into_run())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        let run: RunWire = self.get(&format!("threads/{thread_id}/runs/{run_id}")).await?;
        Ok(run.into_run())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, TransportError> {
        let body = json!({ "tool_outputs": outputs });
        let run: RunWire = self
            .post(
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &body,
            )
            .await?;
        Ok(run.into_run())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, TransportError> {
        let run: RunWire = self
            .post(&format!("threads/{thread_id}/runs/{run_id}/cancel"), &json!({}))
            .await?;
        Ok(run.into_run())
    }

    async fn list_assistants(&self) -> Result<Vec<Assistant>, TransportError> {
        let page: ListWire<AssistantWire> = self
            .get(&format!("assistants?order=desc&limit={PAGE_LIMIT}"))
            .await?;
        Ok(page.data.into_iter().map(AssistantWire::into_assistant).collect())
    }

    async fn update_assistant_tools(
        &self,
        assistant_id: &str,
        tools: &[Value],
    ) -> Result<Assistant, TransportError> {
        let body = json!({ "tools": tools });
        let assistant: AssistantWire = self
            .post(&format!("assistants/{assistant_id}"), &body)
            .await?;
        Ok(assistant.into_assistant())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateRunWire<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
}

#[derive(Debug, Deserialize)]
struct ThreadWire {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListWire<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunWire {
    id: String,
    thread_id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<RequiredActionWire>,
    #[serde(default)]
    last_error: Option<RunFailure>,
}

#[derive(Debug, Deserialize)]
struct RequiredActionWire {
    submit_tool_outputs: SubmitToolOutputsWire,
}

#[derive(Debug, Deserialize)]
struct SubmitToolOutputsWire {
    tool_calls: Vec<ToolCallWire>,
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    id: String,
    function: FunctionCallWire,
}

#[derive(Debug, Deserialize)]
struct FunctionCallWire {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl RunWire {
    fn into_run(self) -> Run {
        let required_action = self.required_action.map(|action| {
            action
                .submit_tool_outputs
                .tool_calls
                .into_iter()
                .map(|call| {
                    PendingAction::new(
                        call.id,
                        call.function.name,
                        ToolArguments::parse(&call.function.arguments),
                    )
                })
                .collect()
        });
        Run {
            id: self.id,
            thread_id: self.thread_id,
            status: self.status,
            required_action,
            last_error: self.last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageWire {
    id: String,
    role: MessageRole,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    content: Vec<ContentWire>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentWire {
    Text { text: TextWire },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextWire {
    value: String,
}

impl MessageWire {
    fn into_message(self) -> Message {
        let text = self
            .content
            .into_iter()
            .filter_map(|part| match part {
                ContentWire::Text { text } => Some(text.value),
                ContentWire::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Message {
            id: self.id,
            role: self.role,
            text,
            created_at: DateTime::<Utc>::from_timestamp(self.created_at, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssistantWire {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: String,
}

impl AssistantWire {
    fn into_assistant(self) -> Assistant {
        Assistant {
            id: self.id,
            name: self.name,
            model: self.model,
        }
    }
}
