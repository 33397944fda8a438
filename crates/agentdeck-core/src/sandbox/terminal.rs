//! Shell command execution with time and output bounds

use crate::types::TerminalExecuteResult;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Bounds applied to every command the agent runs
#[derive(Debug, Clone, Copy)]
pub struct TerminalLimits {
    pub timeout: Duration,
    /// Cap on stdout and stderr combined; the command is killed once it is exceeded
    pub max_output_bytes: usize,
}

impl Default for TerminalLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_output_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Terminal handler running commands through `sh -c`
pub struct TerminalHandler;

impl TerminalHandler {
    /// Run `command_line` and report what happened.
    ///
    /// Never fails: spawn errors, timeouts and oversized output are all
    /// reported through the result with a non-zero exit code.
    pub async fn execute(
        limits: &TerminalLimits,
        command_line: &str,
        cwd: &Path,
    ) -> TerminalExecuteResult {
        debug!("Executing command: {} (cwd: {:?})", command_line, cwd);

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn command '{}': {}", command_line, e);
                return failed(String::new(), format!("failed to run command: {}", e));
            }
        };

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return failed(String::new(), "failed to capture command output".into());
        };

        let mut captured = Captured::default();
        let run = async {
            pump(&mut stdout, &mut stderr, limits.max_output_bytes, &mut captured).await;
            if captured.truncated {
                let _ = child.start_kill();
            }
            child.wait().await
        };

        let outcome = tokio::time::timeout(limits.timeout, run).await;
        let mut stderr = lossy(&captured.stderr);
        let exit_code = match outcome {
            Ok(_) if captured.truncated => {
                push_note(
                    &mut stderr,
                    &format!("output exceeded {} bytes; command killed", limits.max_output_bytes),
                );
                -1
            }
            Ok(Ok(status)) => status.code().unwrap_or(-1),
            Ok(Err(e)) => {
                push_note(&mut stderr, &format!("failed to wait for command: {}", e));
                -1
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", limits.timeout, command_line);
                let _ = child.start_kill();
                let _ = child.wait().await;
                push_note(
                    &mut stderr,
                    &format!("command timed out after {}s", limits.timeout.as_secs()),
                );
                -1
            }
        };

        TerminalExecuteResult {
            exit_code,
            stdout: lossy(&captured.stdout),
            stderr,
        }
    }
}

/// Output read so far; lives outside the timed future so a timeout keeps it
#[derive(Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }
}

/// Read both pipes until EOF, stopping early once their combined size passes `cap`.
async fn pump<O, E>(stdout: &mut O, stderr: &mut E, cap: usize, captured: &mut Captured)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let (mut out_open, mut err_open) = (true, true);
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read {
                Ok(0) | Err(_) => out_open = false,
                Ok(n) => {
                    let room = cap.saturating_sub(captured.len());
                    if !append_capped(&mut captured.stdout, &out_buf[..n], room) {
                        captured.truncated = true;
                        break;
                    }
                }
            },
            read = stderr.read(&mut err_buf), if err_open => match read {
                Ok(0) | Err(_) => err_open = false,
                Ok(n) => {
                    let room = cap.saturating_sub(captured.len());
                    if !append_capped(&mut captured.stderr, &err_buf[..n], room) {
                        captured.truncated = true;
                        break;
                    }
                }
            },
        }
    }
}

/// Append at most `room` bytes of `data`; false if anything had to be cut.
fn append_capped(buf: &mut Vec<u8>, data: &[u8], room: usize) -> bool {
    if data.len() > room {
        buf.extend_from_slice(&data[..room]);
        false
    } else {
        buf.extend_from_slice(data);
        true
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

fn push_note(stderr: &mut String, note: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(note);
}

fn failed(stdout: String, stderr: String) -> TerminalExecuteResult {
    TerminalExecuteResult {
        exit_code: -1,
        stdout,
        stderr,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_execute_success() {
        let dir = tempdir().unwrap();
        let result =
            TerminalHandler::execute(&TerminalLimits::default(), "echo hello", dir.path()).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr, "");
    }

    #[tokio::test]
    async fn test_failing_command_is_a_normal_result() {
        let dir = tempdir().unwrap();
        let result = TerminalHandler::execute(
            &TerminalLimits::default(),
            "echo oops >&2; exit 3",
            dir.path(),
        )
        .await;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = TerminalHandler::execute(&TerminalLimits::default(), "ls", dir.path()).await;
        assert!(result.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempdir().unwrap();
        let limits = TerminalLimits {
            timeout: Duration::from_millis(200),
            ..TerminalLimits::default()
        };
        let started = std::time::Instant::now();
        let result = TerminalHandler::execute(&limits, "sleep 30", dir.path()).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let dir = tempdir().unwrap();
        let limits = TerminalLimits {
            timeout: Duration::from_millis(500),
            ..TerminalLimits::default()
        };
        let result =
            TerminalHandler::execute(&limits, "echo started; echo warming >&2; sleep 30", dir.path())
                .await;
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout.trim(), "started");
        assert!(result.stderr.starts_with("warming\n"), "{:?}", result.stderr);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_output_cap_covers_both_streams() {
        let dir = tempdir().unwrap();
        let limits = TerminalLimits {
            timeout: Duration::from_secs(10),
            max_output_bytes: 1024,
        };
        let result = TerminalHandler::execute(&limits, "yes out & yes err >&2; wait", dir.path()).await;
        assert_eq!(result.exit_code, -1);
        let note = "output exceeded 1024 bytes; command killed";
        let stderr_bytes = result.stderr.trim_end_matches(note).trim_end_matches('\n').len();
        assert!(result.stdout.len() + stderr_bytes <= 1024);
    }

    #[tokio::test]
    async fn test_output_cap() {
        let dir = tempdir().unwrap();
        let limits = TerminalLimits {
            timeout: Duration::from_secs(10),
            max_output_bytes: 1024,
        };
        let result = TerminalHandler::execute(&limits, "yes", dir.path()).await;
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout.len(), 1024);
        assert!(result.stderr.contains("exceeded"));
    }

    #[test]
    fn test_append_capped() {
        let mut buf = Vec::new();
        assert!(append_capped(&mut buf, b"abc", 5));
        assert!(!append_capped(&mut buf, b"defg", 2));
        assert_eq!(buf, b"abcde");
    }
}
