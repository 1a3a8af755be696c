//! Child-process supervision.
//!
//! One [`SupervisedProcess`] per sidecar run: launched with the sidecar's own
//! stdio, signalled on config change, waited on until it exits. There is no
//! restart policy — a crashed child ends the whole sidecar.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};

use crate::error::DaemonError;

/// A launched child process under supervision.
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    pid: Option<i32>,
}

impl SupervisedProcess {
    /// Launch `program` with `args`, inheriting the sidecar's stdio.
    ///
    /// Failure to start is fatal to the caller; there is nothing meaningful
    /// to supervise without a child.
    pub fn start(program: &str, args: &[String]) -> Result<SupervisedProcess, DaemonError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DaemonError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let pid = child.id().map(|id| id as i32);
        Ok(SupervisedProcess { child, pid })
    }

    /// OS pid, captured at launch. `None` once the child has been reaped.
    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    /// Block until the process terminates for any reason.
    pub async fn wait(&mut self) -> Result<ExitStatus, DaemonError> {
        self.child.wait().await.map_err(DaemonError::Wait)
    }

    /// Forcefully end the child and reap it.
    pub async fn terminate(&mut self) -> Result<ExitStatus, DaemonError> {
        if let Err(err) = self.child.start_kill() {
            // InvalidInput means the child already exited; reap it below.
            if err.kind() != std::io::ErrorKind::InvalidInput {
                return Err(DaemonError::Wait(err));
            }
        }
        self.wait().await
    }
}

/// Deliver a reload notification to the running process.
///
/// This is a hint, not an acknowledged RPC: the supervisor does not wait for
/// the reload to take effect. The contract is "ask the child to re-read its
/// config"; on POSIX that is SIGHUP, and platforms without signals need a
/// substitute mechanism before this crate can support them.
#[cfg(unix)]
pub fn send_reload_signal(pid: i32) -> Result<(), DaemonError> {
    let rc = unsafe { libc::kill(pid, libc::SIGHUP) };
    if rc == 0 {
        Ok(())
    } else {
        Err(DaemonError::Signal {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}

#[cfg(not(unix))]
pub fn send_reload_signal(_pid: i32) -> Result<(), DaemonError> {
    Err(DaemonError::ReloadUnsupported)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
