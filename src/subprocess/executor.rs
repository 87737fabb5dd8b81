//! Streaming Subprocess Executor (§4.3, component C3). Spawns the agent
//! child process, line-frames its stdout through the Stream Parser,
//! ring-buffers stderr, and enforces the timeout/cancel-with-grace-period
//! contract. Grounded on `subprocess/streaming/runner.rs`'s dual
//! stdout/stderr reader tasks plus `tokio::time::timeout`-and-kill shape.

use super::parser::{parse_line, ParsedEvent};
use super::types::ProgressTicker;
use crate::error::{GateError, GateErrorKind};
use crate::model::{AgentResult, BusEventPayload};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
const DEFAULT_STDOUT_TRUNCATE_BYTES: usize = 1024 * 1024;
const DEFAULT_STDERR_RING_LINES: usize = 200;

#[derive(Debug, Clone)]
pub struct SubprocessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

pub struct StreamingSubprocessExecutor {
    grace_period: Duration,
    stdout_truncate_bytes: usize,
    stderr_ring_lines: usize,
}

impl Default for StreamingSubprocessExecutor {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            stdout_truncate_bytes: DEFAULT_STDOUT_TRUNCATE_BYTES,
            stderr_ring_lines: DEFAULT_STDERR_RING_LINES,
        }
    }
}

impl StreamingSubprocessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `spec` to completion, publishing progress/output/tool events to
    /// `sink` as they arrive. `cancel` is watched for a `true` value,
    /// which triggers the same grace-period kill sequence as a timeout.
    /// `pid_tx`, if given, is fired with the child's pid as soon as spawn
    /// succeeds — callers that need the pid before completion (to register
    /// it with a [`super::registry::ProcessRegistry`]) don't otherwise have
    /// anywhere to get it from.
    pub async fn run(
        &self,
        spec: SubprocessSpec,
        sink: mpsc::UnboundedSender<BusEventPayload>,
        mut cancel: watch::Receiver<bool>,
        pid_tx: Option<oneshot::Sender<u32>>,
    ) -> Result<AgentResult, GateError> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().cloned())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GateError::with_source(GateErrorKind::SystemError, "failed to spawn agent", e))?;

        if let Some(pid_tx) = pid_tx {
            if let Some(pid) = child.id() {
                let _ = pid_tx.send(pid);
            }
        }

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let truncate_at = self.stdout_truncate_bytes;
        let stdout_sink = sink.clone();
        let stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            let mut ticker = ProgressTicker::default();
            let mut agent_output = String::new();
            let mut bytes_seen = 0usize;
            let mut truncated = false;
            let mut final_success: Option<bool> = None;

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_line(&line) {
                    ParsedEvent::ToolCall { name } => {
                        let percent = ticker.record_tool_call();
                        let _ = stdout_sink.send(BusEventPayload::ToolCall { name });
                        let _ = stdout_sink.send(BusEventPayload::Progress { percent });
                    }
                    ParsedEvent::ToolResult { name, is_error } => {
                        let _ = stdout_sink.send(BusEventPayload::ToolResult { name, is_error });
                    }
                    ParsedEvent::Output { content } => {
                        if !truncated {
                            bytes_seen += content.len();
                            if bytes_seen > truncate_at {
                                truncated = true;
                            } else {
                                if !agent_output.is_empty() {
                                    agent_output.push('\n');
                                }
                                agent_output.push_str(&content);
                            }
                        }
                        let _ = stdout_sink.send(BusEventPayload::Output { content });
                    }
                    ParsedEvent::Final { success, output } => {
                        final_success = Some(success);
                        if let Some(output) = output {
                            if !truncated && bytes_seen + output.len() <= truncate_at {
                                if !agent_output.is_empty() {
                                    agent_output.push('\n');
                                }
                                agent_output.push_str(&output);
                            }
                        }
                    }
                    ParsedEvent::System | ParsedEvent::Unknown => {}
                }
            }

            (agent_output, ticker.tool_call_count(), truncated, final_success)
        });

        let stderr_ring_lines = self.stderr_ring_lines;
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut ring: VecDeque<String> = VecDeque::with_capacity(stderr_ring_lines);
            while let Ok(Some(line)) = reader.next_line().await {
                if ring.len() == stderr_ring_lines {
                    ring.pop_front();
                }
                ring.push_back(line);
            }
            ring.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut timed_out = false;
        tokio::select! {
            _ = tokio::time::sleep(spec.timeout) => {
                timed_out = true;
            }
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    timed_out = false;
                } else {
                    // sender dropped without ever cancelling; fall through
                    // to waiting on the child below.
                }
            }
            status = child.wait() => {
                let status = status.map_err(|e| {
                    GateError::with_source(GateErrorKind::AgentCrash, "agent process wait failed", e)
                })?;
                let agent_output = stdout_task.await.map_err(|e| {
                    GateError::with_source(GateErrorKind::SystemError, "stdout reader task panicked", e)
                })?;
                let stderr_tail = stderr_task.await.map_err(|e| {
                    GateError::with_source(GateErrorKind::SystemError, "stderr reader task panicked", e)
                })?;
                let (agent_output, tool_call_count, stdout_truncated, _final_success) = agent_output;
                return Ok(AgentResult {
                    exit_code: status.code(),
                    timed_out: false,
                    tool_call_count,
                    agent_output,
                    stderr_tail,
                    stdout_truncated,
                });
            }
        }

        // Timed out or cancelled: SIGTERM, grace period, then SIGKILL.
        if let Some(pid) = child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
        let exit_code = match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                None
            }
        };

        let (agent_output, tool_call_count, stdout_truncated, _final_success) =
            stdout_task.await.unwrap_or_default();
        let stderr_tail = stderr_task.await.unwrap_or_default();

        Ok(AgentResult {
            exit_code,
            timed_out,
            tool_call_count,
            agent_output,
            stderr_tail,
            stdout_truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_trivial_command_and_captures_output() {
        let exec = StreamingSubprocessExecutor::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let spec = SubprocessSpec {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"echo '{"type":"assistant","text":"hello"}'"#.into(),
            ],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: Duration::from_secs(5),
        };
        let result = exec.run(spec, tx, cancel_rx, None).await.unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);
        assert_eq!(result.agent_output, "hello");
    }

    #[tokio::test]
    async fn kills_a_process_that_exceeds_its_timeout() {
        let exec = StreamingSubprocessExecutor::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let spec = SubprocessSpec {
            program: "sh".into(),
            args: vec!["-c".into(), "sleep 30".into()],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: Duration::from_millis(50),
        };
        let result = exec.run(spec, tx, cancel_rx, None).await.unwrap();
        assert!(result.timed_out);
    }
}
