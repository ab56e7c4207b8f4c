use crate::scratch::ScratchFile;
use solaudit_core::{AnalyzerConfig, StaticReport};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-stream capture limit
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Time allowed for a killed child to be reaped
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Time allowed for pipe readers to drain after the child has exited
const READER_GRACE: Duration = Duration::from_secs(2);

/// How one invocation of the analysis tool ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed {
        stdout: String,
        stderr: String,
        /// `None` when the process was terminated by a signal
        exit_code: Option<i32>,
    },
    TimedOut {
        after: Duration,
    },
    SpawnFailed {
        cause: String,
    },
}

/// Runs the external static-analysis tool against a scratch file.
#[derive(Debug, Clone)]
pub struct StaticAnalysisRunner {
    command: String,
    args: Vec<String>,
    label: String,
    timeout: Duration,
}

impl StaticAnalysisRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            label: "Slither".to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .with_label(config.label.clone())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Analyze `scratch` within the configured timeout. Every failure becomes
    /// report text; the raw outcome is returned alongside for bookkeeping.
    pub async fn run(&self, scratch: &ScratchFile) -> (ProcessOutcome, StaticReport) {
        let outcome = self.invoke(scratch.path(), self.timeout).await;
        let report = self.report_from_outcome(&outcome);
        (outcome, report)
    }

    /// Spawn the tool as `<command> <target> <args...>` and wait at most `timeout`.
    ///
    /// On unix the tool leads its own process group, so helpers it starts are
    /// killed with it.
    pub async fn invoke(&self, target: &Path, timeout: Duration) -> ProcessOutcome {
        let start = Instant::now();

        let mut command = Command::new(&self.command);
        command
            .arg(target)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %self.command, error = %e, "Failed to start analysis tool");
                return ProcessOutcome::SpawnFailed {
                    cause: format!("could not start '{}': {}", self.command, e),
                };
            }
        };
        let group = child.id();

        // Drain both pipes concurrently so a chatty tool cannot block on a full pipe.
        let stdout_reader = child.stdout.take().map(StreamCapture::spawn);
        let stderr_reader = child.stderr.take().map(StreamCapture::spawn);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // Leftover helpers would otherwise outlive the scratch file and hold the pipes open.
                kill_group(group);
                let stdout = collect(stdout_reader, "stdout").await;
                let stderr = collect(stderr_reader, "stderr").await;
                info!(
                    command = %self.command,
                    exit_code = ?status.code(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    stdout_bytes = stdout.len(),
                    stderr_bytes = stderr.len(),
                    "Analysis tool finished"
                );
                ProcessOutcome::Completed {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                }
            }
            Ok(Err(e)) => {
                kill_group(group);
                abort(stdout_reader);
                abort(stderr_reader);
                warn!(command = %self.command, error = %e, "Waiting on analysis tool failed");
                ProcessOutcome::SpawnFailed {
                    cause: format!("failed while waiting for '{}': {}", self.command, e),
                }
            }
            Err(_elapsed) => {
                let killed = terminate(&mut child, group).await;
                abort(stdout_reader);
                abort(stderr_reader);
                warn!(
                    command = %self.command,
                    timeout_ms = timeout.as_millis() as u64,
                    killed,
                    "Analysis tool timed out and was killed"
                );
                ProcessOutcome::TimedOut { after: timeout }
            }
        }
    }

    /// Fold an outcome into report text.
    pub fn report_from_outcome(&self, outcome: &ProcessOutcome) -> StaticReport {
        let label = &self.label;
        match outcome {
            ProcessOutcome::Completed {
                stdout,
                stderr,
                exit_code,
            } => {
                let stdout = stdout.trim();
                if !stdout.is_empty() {
                    return StaticReport::new(stdout);
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    return StaticReport::new(format!("{} stderr:\n{}", label, stderr));
                }
                let status = match exit_code {
                    Some(code) => format!("status {}", code),
                    None => "a signal".to_string(),
                };
                StaticReport::new(format!(
                    "{} failed: exited with {} and produced no output",
                    label, status
                ))
            }
            ProcessOutcome::TimedOut { after } => StaticReport::new(format!(
                "{} failed: timed out after {}",
                label,
                format_duration(*after)
            )),
            ProcessOutcome::SpawnFailed { cause } => {
                StaticReport::new(format!("{} failed: {}", label, cause))
            }
        }
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// SIGKILL every process left in the tool's group. An empty group is not an error.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = group else { return };
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to signal analysis process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Kill the tool and its group, then reap it. Returns whether the reap finished in time.
async fn terminate(child: &mut Child, group: Option<u32>) -> bool {
    kill_group(group);
    // kill() signals the leader again (harmless once it is dead) and waits for it.
    matches!(
        tokio::time::timeout(REAP_GRACE, child.kill()).await,
        Ok(Ok(()))
    )
}

/// Bytes read so far from one output stream, capped at `MAX_CAPTURE_BYTES`.
#[derive(Debug, Default)]
struct Captured {
    kept: Vec<u8>,
    total: usize,
}

impl Captured {
    fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len();
        let room = MAX_CAPTURE_BYTES.saturating_sub(self.kept.len());
        self.kept.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn to_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.kept).into_owned();
        if self.total > self.kept.len() {
            text.push_str(&format!("\n...[truncated, total {} bytes]", self.total));
        }
        text
    }
}

/// A background reader whose partial output survives being aborted.
struct StreamCapture {
    buffer: Arc<Mutex<Captured>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl StreamCapture {
    fn spawn<R>(stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let handle = tokio::spawn(read_into(stream, buffer.clone()));
        Self { buffer, handle }
    }
}

fn snapshot(buffer: &Mutex<Captured>) -> String {
    // A poisoned lock still holds valid bytes.
    buffer.lock().unwrap_or_else(|e| e.into_inner()).to_text()
}

/// Read a stream to the end, appending into `buffer` as data arrives.
async fn read_into<R>(mut stream: R, buffer: Arc<Mutex<Captured>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(&chunk[..n]);
    }
}

/// Wait briefly for a reader to hit end of stream, then return whatever it captured.
async fn collect(reader: Option<StreamCapture>, stream: &str) -> String {
    let Some(StreamCapture { buffer, handle }) = reader else {
        return String::new();
    };
    let abort_handle = handle.abort_handle();

    match tokio::time::timeout(READER_GRACE, handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            warn!(stream, error = %e, "Failed to read analysis tool output");
        }
        Ok(Err(e)) => {
            warn!(stream, error = %e, "Output reader task failed");
        }
        Err(_) => {
            // A descendant outside the tool's group is still holding the pipe open.
            abort_handle.abort();
            debug!(stream, "Stopped draining analysis tool output early");
        }
    }

    snapshot(&buffer)
}

fn abort(reader: Option<StreamCapture>) {
    if let Some(capture) = reader {
        capture.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> StaticAnalysisRunner {
        StaticAnalysisRunner::new("slither", vec![], Duration::from_secs(10))
    }

    #[test]
    fn test_stdout_is_trimmed_report() {
        let report = runner().report_from_outcome(&ProcessOutcome::Completed {
            stdout: "\n  0 issues found \n".to_string(),
            stderr: "noise".to_string(),
            exit_code: Some(0),
        });
        assert_eq!(report.as_str(), "0 issues found");
    }

    #[test]
    fn test_empty_stdout_falls_back_to_prefixed_stderr() {
        let report = runner().report_from_outcome(&ProcessOutcome::Completed {
            stdout: "   ".to_string(),
            stderr: "INFO:Detectors: Reentrancy in Bank.withdraw()\n".to_string(),
            exit_code: Some(1),
        });
        assert_eq!(
            report.as_str(),
            "Slither stderr:\nINFO:Detectors: Reentrancy in Bank.withdraw()"
        );
    }

    #[test]
    fn test_silent_nonzero_exit_is_failure_text() {
        let report = runner().report_from_outcome(&ProcessOutcome::Completed {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(3),
        });
        assert_eq!(
            report.as_str(),
            "Slither failed: exited with status 3 and produced no output"
        );
    }

    #[test]
    fn test_timeout_text_is_recognizable() {
        let report = runner().report_from_outcome(&ProcessOutcome::TimedOut {
            after: Duration::from_secs(10),
        });
        assert_eq!(report.as_str(), "Slither failed: timed out after 10s");

        let report = runner().report_from_outcome(&ProcessOutcome::TimedOut {
            after: Duration::from_millis(250),
        });
        assert!(report.as_str().contains("timed out after 250ms"));
    }

    #[test]
    fn test_label_is_used_in_failure_text() {
        let report = runner()
            .with_label("Mythril")
            .report_from_outcome(&ProcessOutcome::SpawnFailed {
                cause: "no such file".to_string(),
            });
        assert_eq!(report.as_str(), "Mythril failed: no such file");
    }

    #[tokio::test]
    async fn test_missing_tool_is_spawn_failure() {
        let runner = StaticAnalysisRunner::new(
            "/nonexistent/solaudit-analyzer-tool",
            vec![],
            Duration::from_secs(5),
        );
        let outcome = runner
            .invoke(Path::new("/tmp/whatever.sol"), Duration::from_secs(5))
            .await;
        match outcome {
            ProcessOutcome::SpawnFailed { cause } => {
                assert!(cause.contains("/nonexistent/solaudit-analyzer-tool"))
            }
            other => panic!("expected spawn failure, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_is_capped() {
        let mut captured = Captured::default();
        captured.push(&vec![b'a'; MAX_CAPTURE_BYTES]);
        captured.push(b"0123456789");

        let text = captured.to_text();
        assert!(text.starts_with("aaaa"));
        assert!(text.ends_with(&format!("[truncated, total {} bytes]", MAX_CAPTURE_BYTES + 10)));
    }

    #[tokio::test]
    async fn test_output_read_before_stall_is_kept() {
        use tokio::io::AsyncWriteExt;

        // The writer half stays open, so the reader never sees end of stream.
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"0 issues found\n").await.unwrap();

        let capture = StreamCapture::spawn(reader);
        let text = collect(Some(capture), "stdout").await;
        assert_eq!(text, "0 issues found\n");
        drop(writer);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::scratch::ScratchFileManager;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn stub_tool(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("stub-analyzer.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_tool_receives_path_then_flags() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), r#"cat "$1"; echo; echo "$2 $3""#);
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec!["--print".to_string(), "human-summary".to_string()],
                Duration::from_secs(5),
            );

            let scratch = ScratchFileManager::new(dir.path(), ".sol")
                .acquire("contract C {}")
                .unwrap();
            let (_, report) = runner.run(&scratch).await;
            assert_eq!(report.as_str(), "contract C {}\n--print human-summary");
        }

        #[tokio::test]
        async fn test_stdout_report_from_process() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), r#"echo "0 issues found""#);
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec![],
                Duration::from_secs(5),
            );

            let outcome = runner.invoke(&dir.path().join("c.sol"), Duration::from_secs(5)).await;
            assert_eq!(
                outcome,
                ProcessOutcome::Completed {
                    stdout: "0 issues found\n".to_string(),
                    stderr: String::new(),
                    exit_code: Some(0),
                }
            );
        }

        #[tokio::test]
        async fn test_stderr_only_process() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), "echo 'Compilation failed' >&2; exit 1");
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec![],
                Duration::from_secs(5),
            );

            let scratch = ScratchFileManager::new(dir.path(), ".sol")
                .acquire("contract {")
                .unwrap();
            let (_, report) = runner.run(&scratch).await;
            assert_eq!(report.as_str(), "Slither stderr:\nCompilation failed");
        }

        #[tokio::test]
        async fn test_slow_tool_is_killed() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), "exec sleep 30");
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec![],
                Duration::from_secs(30),
            );

            let start = Instant::now();
            let outcome = runner
                .invoke(&dir.path().join("c.sol"), Duration::from_millis(200))
                .await;
            assert_eq!(
                outcome,
                ProcessOutcome::TimedOut {
                    after: Duration::from_millis(200)
                }
            );
            assert!(start.elapsed() < Duration::from_secs(10));
            assert!(runner
                .report_from_outcome(&outcome)
                .as_str()
                .contains("timed out"));
        }

        #[tokio::test]
        async fn test_background_helper_does_not_hide_report() {
            let dir = tempfile::tempdir().unwrap();
            let tool = stub_tool(dir.path(), "echo '0 issues found'; sleep 5 &");
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec![],
                Duration::from_secs(10),
            );

            let start = Instant::now();
            let outcome = runner.invoke(&dir.path().join("c.sol"), Duration::from_secs(10)).await;
            assert_eq!(runner.report_from_outcome(&outcome).as_str(), "0 issues found");
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_timeout_kills_whole_process_group() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("still-alive");
            let tool = stub_tool(
                dir.path(),
                &format!("(sleep 2; touch '{}'); echo done", marker.display()),
            );
            let runner = StaticAnalysisRunner::new(
                tool.to_string_lossy(),
                vec![],
                Duration::from_secs(10),
            );

            let outcome = runner
                .invoke(&dir.path().join("c.sol"), Duration::from_millis(300))
                .await;
            assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));

            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(!marker.exists(), "helper process survived the timeout");
        }
    }
}
