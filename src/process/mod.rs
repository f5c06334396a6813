//! Subprocess supervision for external Git commands.
//!
//! # Responsibilities
//! - Start commands as leaders of their own process group
//! - Build the child environment from a fixed allow-list, never the full
//!   ambient environment (repository hooks would otherwise see our secrets)
//! - Terminate whole groups idempotently and always reap the child

use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Environment variables forwarded from the gateway to spawned commands.
const ENV_ALLOW_LIST: [&str; 3] = ["HOME", "PATH", "LD_LIBRARY_PATH"];

/// A spawned Git command and the process group it leads.
pub struct GitCommand {
    child: Child,
    // Group id captured at spawn; the child's own pid is gone after a wait
    // but background descendants may still need the signal.
    pgid: Option<i32>,
}

impl GitCommand {
    /// Spawn `program` with `args` in a new process group.
    ///
    /// `gl_id` is the identity the authorization backend attributed the
    /// request to; it is injected as `GL_ID` for the command's hooks.
    /// Stderr is inherited so subprocess diagnostics reach our own error
    /// stream instead of vanishing.
    pub fn spawn(
        gl_id: &str,
        program: &str,
        args: &[&str],
        stdin: Stdio,
        stdout: Stdio,
    ) -> std::io::Result<Self> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        cmd.env_clear();
        for key in ENV_ALLOW_LIST {
            cmd.env(key, std::env::var(key).unwrap_or_default());
        }
        cmd.env("GL_ID", gl_id);
        cmd.stdin(stdin);
        cmd.stdout(stdout);
        cmd.stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Group leader, so a signal to -pid reaches the whole subtree.
            cmd.process_group(0);
        }

        let child = Command::from(cmd).spawn()?;
        let pgid = child.id().map(|pid| pid as i32);
        Ok(Self { child, pgid })
    }

    /// Take the child's stdin pipe, if it was requested as piped.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Take the child's stdout pipe, if it was requested as piped.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for the command to exit.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Terminate the whole process group and reap the child.
    ///
    /// Safe to call after the leader has already exited: the signal still
    /// reaches surviving group members (dead groups swallow it) and the wait
    /// returns the stored status.
    pub async fn terminate(mut self) {
        if let Some(pgid) = self.pgid {
            #[cfg(unix)]
            unsafe {
                // Negative pid: signal the group, not just the leader.
                libc::kill(-pgid, libc::SIGTERM);
            }
        }
        let _ = self.child.wait().await;
    }
}

/// Terminate a possibly-absent command handle. A `None` handle is a no-op,
/// mirroring callers that may not have spawned anything yet.
pub async fn terminate_group(cmd: Option<GitCommand>) {
    if let Some(cmd) = cmd {
        cmd.terminate().await;
    }
}
