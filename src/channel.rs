//! Command channel to the monitored device.
//!
//! Every collector talks to the device through a [`CommandChannel`]: a text
//! command goes in, the captured standard output comes back. An empty string
//! is the only failure signal; callers never see exit codes.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll interval while waiting for an adb child process to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Executes shell commands on a remote device.
///
/// Implementations block until the command finishes and return its stdout,
/// or an empty string on any failure. They must be safe to call from several
/// threads at once.
pub trait CommandChannel: Send + Sync {
    fn execute(&self, command: &str) -> String;
}

impl<F> CommandChannel for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn execute(&self, command: &str) -> String {
        self(command)
    }
}

/// Channel backed by the `adb` binary (`adb [-s serial] shell <command>`).
#[derive(Debug, Clone)]
pub struct AdbShell {
    adb_path: String,
    serial: Option<String>,
    timeout: Duration,
}

impl AdbShell {
    pub fn new(adb_path: impl Into<String>, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial,
            timeout,
        }
    }

    fn build_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.arg("shell")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl CommandChannel for AdbShell {
    fn execute(&self, command: &str) -> String {
        let mut child = match self.build_command(command).spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!("Failed to spawn {}: {}", self.adb_path, e);
                return String::new();
            }
        };

        // Drain stdout on a separate thread so a large dumpsys output cannot
        // fill the pipe while we wait for the exit status.
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() >= deadline => {
                    debug!(
                        "Command timed out after {}ms: {}",
                        self.timeout.as_millis(),
                        command
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(e) => {
                    debug!("Failed to wait for adb child: {}", e);
                    let _ = child.kill();
                    break None;
                }
            }
        };

        let output = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match status {
            Some(status) if status.success() => output,
            Some(status) => {
                debug!("Command exited with {}: {}", status, command);
                String::new()
            }
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closure_channel() {
        let channel: Arc<dyn CommandChannel> = Arc::new(|cmd: &str| {
            if cmd == "echo hi" {
                "hi\n".to_string()
            } else {
                String::new()
            }
        });

        assert_eq!(channel.execute("echo hi"), "hi\n");
        assert_eq!(channel.execute("unknown"), "");
    }

    #[test]
    fn test_adb_shell_missing_binary_returns_empty() {
        let shell = AdbShell::new(
            "/nonexistent/definitely-not-adb",
            Some("emulator-5554".into()),
            Duration::from_millis(200),
        );
        assert_eq!(shell.execute("dumpsys battery"), "");
    }

    #[test]
    fn test_adb_shell_builds_serial_args() {
        let shell = AdbShell::new("adb", Some("R58M123".into()), Duration::from_secs(1));
        let cmd = shell.build_command("cat /proc/stat");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args, vec!["-s", "R58M123", "shell", "cat /proc/stat"]);
    }
}
