//! Environment-driven configuration

use crate::backend::OpenAiConfig;
use crate::runtime::RuntimeConfig;
use crate::state_machine::PollPolicy;
use crate::store::{self, StoreError, ToolStore};
use crate::tools::ShellLimits;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Shipped tool metadata, copied into the data dir on first start
pub const DEFAULT_TOOLS_JSON: &str = include_str!("../defaults/default_tools.json");

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("cannot determine a data directory; set ASSISTANT_DATA_DIR or HOME")]
    NoDataDir,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub organization: Option<String>,
    pub api_base: String,
    /// Holds the label map and dynamic tool metadata
    pub data_dir: PathBuf,
    pub default_tools: PathBuf,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub run_timeout: Duration,
    pub tool_timeout: Duration,
    pub cancel_on_timeout: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let data_dir = match var("ASSISTANT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(var("HOME").ok_or(ConfigError::NoDataDir)?)
                .join(".assistant-chat"),
        };
        let default_tools = var("ASSISTANT_DEFAULT_TOOLS")
            .map_or_else(|| data_dir.join("default_tools.json"), PathBuf::from);

        Ok(Self {
            api_key,
            organization: var("OPENAI_ORG_ID"),
            api_base: var("ASSISTANT_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            data_dir,
            default_tools,
            poll_interval: Duration::from_millis(parse_or(
                var("ASSISTANT_POLL_INTERVAL_MS"),
                2000,
            )),
            max_polls: parse_or(var("ASSISTANT_MAX_POLLS"), 600),
            run_timeout: Duration::from_secs(parse_or(var("ASSISTANT_RUN_TIMEOUT_SECS"), 1200)),
            tool_timeout: Duration::from_secs(parse_or(var("ASSISTANT_TOOL_TIMEOUT_SECS"), 60)),
            cancel_on_timeout: var("ASSISTANT_CANCEL_ON_TIMEOUT")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
        })
    }

    pub fn openai(&self) -> OpenAiConfig {
        let mut config = OpenAiConfig::new(self.api_key.clone());
        config.organization.clone_from(&self.organization);
        config.base_url = self.api_base.trim_end_matches('/').to_string();
        config
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            poll: PollPolicy {
                interval: self.poll_interval,
                max_polls: (self.max_polls > 0).then_some(self.max_polls),
                run_timeout: bound(self.run_timeout),
                cancel_on_timeout: self.cancel_on_timeout,
            },
            tool_timeout: bound(self.tool_timeout),
        }
    }

    /// Shell tools share the per-call tool budget
    pub fn shell_limits(&self) -> ShellLimits {
        ShellLimits {
            timeout: bound(self.tool_timeout),
            ..ShellLimits::default()
        }
    }

    pub fn labels_path(&self) -> PathBuf {
        self.data_dir.join("thread_labels.json")
    }

    pub fn tool_store(&self) -> ToolStore {
        ToolStore::new(
            self.default_tools.clone(),
            self.data_dir.join("dynamic_tools.json"),
        )
    }

    /// Write the shipped default tool document if none exists yet
    pub fn install_default_tools(&self) -> Result<(), StoreError> {
        if store::write_if_missing(&self.default_tools, DEFAULT_TOOLS_JSON)? {
            tracing::info!(path = %self.default_tools.display(), "Installed default tool metadata");
        }
        Ok(())
    }
}

/// Zero means "no limit" for every configured bound
fn bound(limit: Duration) -> Option<Duration> {
    (!limit.is_zero()).then_some(limit)
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
