//! Shell execution and application launch.

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::GatewayError;
use crate::limits::{ExecutionLimits, LimitedBuffer};
use crate::policy::CommandAuthority;

/// How command lines are handed to the platform shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell program.
    pub program: String,
    /// Arguments placed before the command line.
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string()],
            }
        }
    }
}

/// Shell execution gated by a [`CommandAuthority`], plus unchecked launch.
#[derive(Clone, Debug)]
pub struct ProcessOperations {
    authority: Arc<CommandAuthority>,
    limits: ExecutionLimits,
    shell: ShellConfig,
}

impl ProcessOperations {
    /// Create process operations with the default platform shell.
    pub fn new(authority: Arc<CommandAuthority>, limits: ExecutionLimits) -> Self {
        Self {
            authority,
            limits,
            shell: ShellConfig::default(),
        }
    }

    /// Use a different shell.
    pub fn with_shell(mut self, shell: ShellConfig) -> Self {
        self.shell = shell;
        self
    }

    /// The limits applied to every shell execution.
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Run a command line through the shell.
    ///
    /// Exit status 0 yields stdout, any other status yields stderr; both are
    /// returned as `Ok`. Only a failure to start the process, or exceeding the
    /// timeout, is an error.
    ///
    /// Output is read incrementally and anything past `max_output_bytes` is
    /// discarded as it arrives. On Unix the shell leads its own process group,
    /// and on timeout the whole group is killed.
    pub async fn run_shell(&self, command_line: &str) -> Result<String, GatewayError> {
        self.authority.ensure(command_line)?;

        let mut child = self
            .shell_command(command_line)
            .spawn()
            .map_err(|e| GatewayError::io(format!("Error executing command '{command_line}'"), e))?;
        let pid = child.id();
        let limit = usize::try_from(self.limits.max_output_bytes).unwrap_or(usize::MAX);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = async {
            let (stdout, stderr) = tokio::try_join!(drain(stdout, limit), drain(stderr, limit))?;
            let status = child.wait().await?;
            Ok::<_, io::Error>((status, stdout, stderr))
        };

        match tokio::time::timeout(self.limits.timeout, finished).await {
            Ok(Ok((status, stdout, stderr))) => {
                let buffer = if status.success() { stdout } else { stderr };
                tracing::debug!(
                    command = %command_line,
                    status = ?status.code(),
                    truncated = buffer.was_truncated(),
                    "command finished"
                );
                Ok(buffer.into_text())
            }
            Ok(Err(e)) => Err(GatewayError::io(
                format!("Error executing command '{command_line}'"),
                e,
            )),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                tracing::warn!(
                    command = %command_line,
                    timeout_ms = %self.limits.timeout.as_millis(),
                    "command timed out and was killed"
                );
                Err(GatewayError::Timeout(self.limits.timeout))
            }
        }
    }

    fn shell_command(&self, command_line: &str) -> Command {
        let mut command = std::process::Command::new(&self.shell.program);
        command
            .args(&self.shell.args)
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut command = Command::from(command);
        // Reaps the shell itself if the caller drops the future early.
        command.kill_on_drop(true);
        command
    }

    /// Start an executable and return without waiting for it.
    ///
    /// No allow-list check is performed: any executable reachable by the
    /// caller can be started.
    pub async fn launch(&self, executable: &str) -> Result<String, GatewayError> {
        Command::new(executable)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| GatewayError::io(format!("Error launching {executable}"), e))?;
        tracing::info!(executable = %executable, "launched application");
        Ok(format!("Launched: {executable}"))
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// Read a pipe to the end, keeping at most `limit` bytes.
async fn drain<R>(reader: Option<R>, limit: usize) -> io::Result<LimitedBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LimitedBuffer::new(limit);
    let Some(mut reader) = reader else {
        return Ok(buffer);
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buffer);
        }
        buffer.write(&chunk[..n]);
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; the group was
    // created for this child by `process_group(0)`.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::warn!(
            pgid,
            error = %io::Error::last_os_error(),
            "failed to kill process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    fn ops(timeout: Duration) -> ProcessOperations {
        let authority = CommandAuthority::new(["echo", "ls", "sleep", "false"]);
        ProcessOperations::new(
            Arc::new(authority),
            ExecutionLimits {
                timeout,
                ..ExecutionLimits::default()
            },
        )
    }

    #[tokio::test]
    async fn test_run_shell_returns_stdout() {
        let output = ops(Duration::from_secs(5))
            .run_shell("echo hello")
            .await
            .unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_shell_nonzero_exit_returns_stderr() {
        let output = ops(Duration::from_secs(5))
            .run_shell("ls /definitely-not-a-real-directory")
            .await
            .unwrap();
        assert!(!output.is_empty());
        assert!(output.contains("definitely-not-a-real-directory"));
    }

    #[tokio::test]
    async fn test_run_shell_denied_command() {
        let err = ops(Duration::from_secs(5))
            .run_shell("cat /etc/passwd")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_run_shell_timeout() {
        let err = ops(Duration::from_millis(200))
            .run_shell("sleep 5")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_run_shell_truncates_output() {
        let authority = CommandAuthority::new(["echo"]);
        let ops = ProcessOperations::new(
            Arc::new(authority),
            ExecutionLimits {
                max_output_bytes: 4,
                ..ExecutionLimits::default()
            },
        );
        let output = ops.run_shell("echo abcdefgh").await.unwrap();
        assert!(output.starts_with("abcd"));
        assert!(output.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn test_run_shell_bounds_large_output() {
        let authority = CommandAuthority::new(["echo"]);
        let ops = ProcessOperations::new(
            Arc::new(authority),
            ExecutionLimits {
                max_output_bytes: 1024,
                ..ExecutionLimits::default()
            },
        );
        // Well past the limit; the pipe must be drained without being kept.
        let output = ops
            .run_shell("echo x; head -c 8000000 /dev/zero | tr '\\0' 'z'")
            .await
            .unwrap();
        assert!(output.starts_with("x\nzzz"));
        assert!(output.ends_with("\n[output truncated]"));
        assert_eq!(output.len(), 1024 + "\n[output truncated]".len());
    }

    #[cfg(target_os = "linux")]
    fn process_running(needle: &str) -> bool {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return false;
        };
        entries.flatten().any(|entry| {
            std::fs::read(entry.path().join("cmdline"))
                .map(|raw| String::from_utf8_lossy(&raw).replace('\0', " "))
                .is_ok_and(|cmdline| cmdline.trim_end() == needle)
        })
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let err = ops(Duration::from_millis(300))
            .run_shell("echo start; sleep 37.913")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(
            !process_running("sleep 37.913"),
            "shell descendant outlived the timeout"
        );
    }

    #[tokio::test]
    async fn test_launch_is_not_allow_listed() {
        // `true` is not in the command allow-list, launch starts it anyway.
        let output = ops(Duration::from_secs(5)).launch("true").await.unwrap();
        assert_eq!(output, "Launched: true");
    }

    #[tokio::test]
    async fn test_launch_missing_executable_is_io_failure() {
        let err = ops(Duration::from_secs(5))
            .launch("steward-no-such-program")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(err.to_string().contains("steward-no-such-program"));
    }
}
