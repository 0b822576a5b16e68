//! Sandboxed runner implementation using a supervised child process
//!
//! Executes untrusted code in its own process group with rlimits applied
//! before exec, a cleared environment and a wall-clock watchdog. On expiry the
//! whole process group is killed and the child is reaped.
//!
//! When the worker runs as root, each run also borrows a dedicated uid. The
//! child switches to it before exec, and once the run is over every process
//! still owned by that uid is killed, including ones that left the group.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::sandbox::{ChildLimits, IdentityLease, IdentityRange, SandboxConfig};

/// Runner that executes each command in a fresh, resource-limited process
#[derive(Debug, Clone)]
pub struct SandboxedRunner {
    /// Uids lent to runs; None when the worker cannot switch users
    identities: Option<IdentityRange>,
}

impl Default for SandboxedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxedRunner {
    pub fn new() -> Self {
        Self::from_config(&SandboxConfig::default())
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            identities: IdentityRange::for_current_user(
                config.sandbox_uid_base,
                config.sandbox_uids,
            ),
        }
    }

    /// Run a command under the watchdog
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin_content: Option<&str>,
    ) -> Result<RunOutcome> {
        let mut child_limits = ChildLimits::from_run_limits(limits);
        let lease = match &self.identities {
            Some(range) => Some(range.acquire().await),
            None => None,
        };

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .env_clear()
            .envs(cmd.env_pairs())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }
        if let Some(lease) = &lease {
            let identity = lease.identity();
            match &cmd.work_dir {
                Some(dir) => identity.hand_over(dir)?,
                // Never leave the borrowed uid in the worker's own directory
                None => {
                    command.current_dir("/");
                }
            }
            command.uid(identity.uid).gid(identity.gid);
            child_limits = child_limits.for_dedicated_user();
        }
        // SAFETY: the closure only issues unshare/setrlimit syscalls on a Copy value.
        unsafe {
            command.pre_exec(move || child_limits.apply());
        }

        let started = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd.program))?;
        let pid = child.id();

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take().context("Child stdout not captured")?;
        let stderr_pipe = child.stderr.take().context("Child stderr not captured")?;
        let input = stdin_content.unwrap_or("").as_bytes();
        let cap = limits.output_bytes;

        let supervised = async {
            let feed = async move {
                if let Some(mut pipe) = stdin_pipe {
                    // The program may exit without reading; a broken pipe is not our failure
                    let _ = pipe.write_all(input).await;
                    let _ = pipe.shutdown().await;
                }
            };
            let (_, stdout, stderr, status) = tokio::join!(
                feed,
                read_capped(stdout_pipe, cap),
                read_capped(stderr_pipe, cap),
                child.wait()
            );
            (stdout, stderr, status)
        };

        let budget = Duration::from_millis(u64::from(limits.time_ms));
        let watched = tokio::time::timeout(budget, supervised).await;
        let time_ms = elapsed_ms(started);

        let (stdout, stderr, status) = match watched {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Execution exceeded {} ms, killing process group {:?}",
                    limits.time_ms, pid
                );
                kill_group(pid);
                let _ = child.kill().await;
                sweep(lease).await;
                return Ok(RunOutcome {
                    time_ms,
                    stdout: String::new(),
                    stderr: String::new(),
                    truncated: false,
                    status: RunStatus::TimeLimitExceeded,
                });
            }
        };

        // Anything the program left behind goes too
        kill_group(pid);
        sweep(lease).await;

        let status = status.context("Failed to wait for child")?;
        let (stdout, stdout_truncated) = stdout.context("Failed to read child stdout")?;
        let (stderr, stderr_truncated) = stderr.context("Failed to read child stderr")?;

        let status = match (status.code(), status.signal()) {
            (Some(code), _) => RunStatus::Exited(code),
            (None, Some(signal)) => RunStatus::Signaled(signal),
            (None, None) => RunStatus::Exited(-1),
        };
        debug!("Child {:?} finished in {} ms: {:?}", pid, time_ms, status);

        Ok(RunOutcome {
            time_ms,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
            status,
        })
    }
}

#[async_trait]
impl Runner for SandboxedRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        self.execute(cmd, limits, stdin).await
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes from its head
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok((kept, truncated))
}

fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        // ESRCH once the group is gone
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

/// Kill every process left under the run's uid, then return the uid
async fn sweep(lease: Option<IdentityLease>) {
    let Some(lease) = lease else {
        return;
    };
    let identity = lease.identity();
    match tokio::task::spawn_blocking(move || identity.sweep()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Sweep of uid {} failed: {:#}", identity.uid, e),
        Err(e) => warn!("Sweep of uid {} panicked: {}", identity.uid, e),
    }
    drop(lease);
}

fn elapsed_ms(started: Instant) -> u32 {
    u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh")
            .with_args(["-c", script])
            .with_env(["PATH=/usr/bin:/bin"])
    }

    fn limits(time_ms: u32) -> RunLimits {
        RunLimits {
            time_ms,
            file_size_kb: 1024,
            processes: 64,
            ..RunLimits::default()
        }
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let outcome = SandboxedRunner::new()
            .run(&sh("echo out; echo err >&2; exit 3"), &limits(2000), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(3));
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let outcome = SandboxedRunner::new()
            .run(&sh("cat"), &limits(2000), Some("hello\nworld\n"))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_environment_is_cleared() {
        std::env::set_var("GRADER_TEST_SECRET", "leak");
        let outcome = SandboxedRunner::new()
            .run(&sh("echo \"[$GRADER_TEST_SECRET]\""), &limits(2000), None)
            .await
            .unwrap();

        assert_eq!(outcome.stdout.trim(), "[]");
    }

    #[tokio::test]
    async fn test_watchdog_kills_runaway() {
        let started = Instant::now();
        let outcome = SandboxedRunner::new()
            .run(&sh("while :; do :; done"), &limits(300), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let capped = RunLimits {
            output_bytes: 100,
            ..limits(5000)
        };
        let flood = sh("i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done");
        let outcome = SandboxedRunner::new()
            .run(&flood, &capped, None)
            .await
            .unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.stdout.len(), 100);
    }

    /// Wait up to a second for `pid` to be gone or a zombie
    pub(crate) async fn wait_for_exit(pid: i32) -> bool {
        for _ in 0..50 {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => return true,
                Ok(stat) => {
                    // State follows the parenthesised command name
                    let state = stat.rsplit(')').next().map(str::trim_start);
                    if state.is_some_and(|rest| rest.starts_with('Z')) {
                        return true;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn is_root() -> bool {
        nix::unistd::geteuid().is_root()
    }

    #[tokio::test]
    async fn test_root_runs_under_a_borrowed_uid() {
        if !is_root() {
            return;
        }
        let outcome = SandboxedRunner::new()
            .run(&sh("id -u; id -g"), &limits(2000), None)
            .await
            .unwrap();

        let ids: Vec<u32> = outcome
            .stdout
            .split_whitespace()
            .map(|id| id.parse().unwrap())
            .collect();
        assert_eq!(ids.len(), 2, "{:?}", outcome);
        assert!((61000..61064).contains(&ids[0]), "{:?}", ids);
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_process_that_left_the_group_is_killed() {
        let has_setsid = std::process::Command::new("setsid")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !is_root() || !has_setsid {
            return;
        }
        let escape = sh("setsid sh -c 'while :; do :; done' </dev/null >/dev/null 2>&1 & echo $!");
        let outcome = SandboxedRunner::new()
            .run(&escape, &limits(2000), None)
            .await
            .unwrap();

        assert!(outcome.is_success(), "{:?}", outcome);
        let pid: i32 = outcome.stdout.trim().parse().unwrap();
        assert!(wait_for_exit(pid).await, "process {} outlived the run", pid);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let cmd = CommandSpec::new("/nonexistent/interpreter");
        assert!(SandboxedRunner::new().run(&cmd, &limits(1000), None).await.is_err());
    }
}
