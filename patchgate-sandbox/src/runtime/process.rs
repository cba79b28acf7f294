//! Process-based runtime

use crate::error::RunnerError;
use crate::types::{HostCommand, RunOutput};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Upper bound on captured log size; older lines are dropped first.
const MAX_LOG_BYTES: usize = 1024 * 1024;

/// How long to keep draining pipes after the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Process-based runtime - executes host programs directly
#[derive(Debug, Clone, Default)]
pub struct ProcessRuntime;

impl ProcessRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl super::HostRunner for ProcessRuntime {
    async fn run(&self, command: &HostCommand) -> Result<RunOutput, RunnerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        run_captured(cmd, &command.program, command.timeout).await
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Tail-keeping line buffer
#[derive(Default)]
struct LogBuffer {
    lines: VecDeque<String>,
    bytes: usize,
    dropped: usize,
}

impl LogBuffer {
    fn push(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line);
        while self.bytes > MAX_LOG_BYTES {
            match self.lines.pop_front() {
                Some(old) => {
                    self.bytes -= old.len() + 1;
                    self.dropped += 1;
                }
                None => break,
            }
        }
    }

    fn into_string(self) -> String {
        let mut out = String::with_capacity(self.bytes + 64);
        if self.dropped > 0 {
            out.push_str(&format!("[{} earlier lines truncated]\n", self.dropped));
        }
        for line in self.lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Forward lines from `reader` until EOF.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the read,
/// so the child never sees a closed pipe while it is still writing.
fn spawn_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    tokio::spawn(async move {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.ends_with(b"\n") {
                        buf.pop();
                        if buf.ends_with(b"\r") {
                            buf.pop();
                        }
                    }
                    // A closed receiver only means nobody is listening any more.
                    let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
    });
}

/// Spawn `cmd`, capture interleaved stdout/stderr and wait with a timeout.
///
/// On timeout the child is killed and the output is marked `timed_out`.
pub(crate) async fn run_captured(
    mut cmd: Command,
    program: &str,
    timeout: Duration,
) -> Result<RunOutput, RunnerError> {
    let start = Instant::now();

    let mut child = cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunnerError::Launch {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(stderr, tx.clone());
    }
    drop(tx);

    let mut timed_out = false;
    let exit_code = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.code().unwrap_or(-1),
        Ok(Err(e)) => return Err(RunnerError::Output(format!("wait on {program}: {e}"))),
        Err(_) => {
            tracing::warn!(program, timeout_secs = timeout.as_secs(), "Process timed out, killing");
            let _ = child.kill().await;
            timed_out = true;
            -1
        }
    };

    let mut log = LogBuffer::default();
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) => log.push(line),
            Ok(None) => break,
            Err(_) => {
                while let Ok(line) = rx.try_recv() {
                    log.push(line);
                }
                tracing::debug!(program, "Output pipes still open after exit; giving up drain");
                break;
            }
        }
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(program, exit_code, timed_out, duration_ms, "Process finished");

    Ok(RunOutput {
        exit_code,
        log: log.into_string(),
        duration_ms,
        timed_out,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runtime::HostRunner;

    fn sh(script: &str, timeout: Duration) -> HostCommand {
        HostCommand::new("/bin/sh", timeout).arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let out = ProcessRuntime::new()
            .run(&sh("echo out; echo err >&2; exit 3", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.timed_out);
        assert!(out.log.contains("out"));
        assert!(out.log.contains("err"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let out = ProcessRuntime::new()
            .run(&sh("echo started; sleep 30", Duration::from_millis(300)))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.duration_ms < 10_000);
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let err = ProcessRuntime::new()
            .run(&HostCommand::new(
                "/nonexistent/patchgate-test-binary",
                Duration::from_secs(1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_capture() {
        let script = "printf 'bad \\377 byte\\n'; sleep 0.3; \
                      i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done; \
                      echo FINISHED; exit 0";
        let out = ProcessRuntime::new()
            .run(&sh(script, Duration::from_secs(20)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
        assert!(out.log.contains("bad \u{FFFD} byte"));
        assert!(out.log.contains("line 1999"));
        assert!(out.log.contains("FINISHED"));
    }

    #[test]
    fn test_log_buffer_keeps_tail() {
        let mut buf = LogBuffer::default();
        let line = "x".repeat(1024);
        for _ in 0..(MAX_LOG_BYTES / 1024 + 10) {
            buf.push(line.clone());
        }
        buf.push("last line".to_string());
        let out = buf.into_string();
        assert!(out.starts_with('['));
        assert!(out.ends_with("last line\n"));
        assert!(out.len() <= MAX_LOG_BYTES + 64);
    }
}
