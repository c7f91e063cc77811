//! Process execution for `exec_sh`, `exec_python` and script-backed tools

use super::{parse_input, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
#[allow(unused_imports)]
use std::os::unix::process::CommandExt;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

const SNIP_SIZE: usize = 4 * 1024; // 4KB each end

/// Bounds applied to every bash invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellLimits {
    /// `None` lets a command run until it exits or is cancelled
    pub timeout: Option<Duration>,
    /// Combined stdout/stderr beyond this is snipped in the middle
    pub max_output: usize,
}

impl Default for ShellLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(60)),
            max_output: 128 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecInput {
    script: String,
}

/// `exec_sh {script}`
pub struct ExecShellTool {
    limits: ShellLimits,
}

impl ExecShellTool {
    pub fn new(limits: ShellLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for ExecShellTool {
    fn name(&self) -> &'static str {
        "exec_sh"
    }

    fn description(&self) -> String {
        "Runs a bash script via bash -c and returns combined stdout/stderr. \
         State does not persist between calls."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["script"],
            "properties": {
                "script": {
                    "type": "string",
                    "description": "Bash script to execute"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<String, ToolError> {
        let input: ExecInput = parse_input(input)?;
        if input.script.trim().is_empty() {
            return Err(ToolError::InvalidInput("script cannot be empty".to_string()));
        }
        tracing::debug!(call_id = %ctx.call_id, "Running shell script");
        run_bash(&input.script, &[], self.limits, &ctx.cancel).await
    }
}

/// Run `script` under `bash -c`
pub(super) async fn run_bash(
    script: &str,
    env: &[(String, String)],
    limits: ShellLimits,
    cancel: &CancellationToken,
) -> Result<String, ToolError> {
    run_process("bash", &["-c", script], env, limits, cancel).await
}

/// Run `program` in its own process group.
///
/// The group is killed on timeout or cancellation. A non-zero exit is an
/// error carrying the output.
pub(super) async fn run_process(
    program: &str,
    args: &[&str],
    env: &[(String, String)],
    limits: ShellLimits,
    cancel: &CancellationToken,
) -> Result<String, ToolError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // New process group so the whole tree can be signalled
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).ok();
            Ok(())
        });
    }

    let child = cmd.spawn()?;
    let pid = child.id();

    tokio::select! {
        biased;

        () = cancel.cancelled() => {
            kill_process_group(pid);
            Err(ToolError::Failed("[command cancelled]".to_string()))
        }

        after = expire(limits.timeout) => {
            kill_process_group(pid);
            Err(ToolError::Failed(format!("[command timed out after {after:?}]")))
        }

        result = child.wait_with_output() => {
            let output = result?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{stdout}{stderr}");
            let formatted = truncate_output(&combined, limits.max_output);

            if output.status.success() {
                Ok(formatted)
            } else {
                let exit_code = output.status.code().unwrap_or(-1);
                Err(ToolError::Failed(format!(
                    "[command failed: exit code {exit_code}]\n{formatted}"
                )))
            }
        }
    }
}

/// Resolves once `limit` has elapsed, or never without one
async fn expire(limit: Option<Duration>) -> Duration {
    match limit {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let Ok(raw) = i32::try_from(pid) else { return };
    tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
    let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Keep the first and last `SNIP_SIZE` bytes of oversized output
fn truncate_output(output: &str, max: usize) -> String {
    if output.len() <= max {
        return output.to_string();
    }

    let head_end = floor_boundary(output, SNIP_SIZE.min(max));
    let tail_start = ceil_boundary(output, output.len().saturating_sub(SNIP_SIZE.min(max)));
    let head = output.get(..head_end).unwrap_or_default();
    let tail = output.get(tail_start..).unwrap_or_default();

    format!(
        "[output truncated in middle: got {} bytes, max is {max} bytes]\n{head}\n\n[snip]\n\n{tail}",
        output.len()
    )
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
