//! Subprocess execution with a wall-clock timeout.
//!
//! The target runs in its own process group so a timeout kills the whole
//! tree, not just the direct child. Stdout and stderr are drained on
//! dedicated threads while the parent polls for exit; a hung target is
//! killed via `killpg` once the deadline passes.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::invocation::Invocation;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Low-level execution failure, without trial context.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("target exceeded the {}s timeout", .0.as_secs())]
    TimedOut(Duration),
    #[error("failed to capture target output: {0}")]
    Capture(#[source] std::io::Error),
}

/// Captured output of one completed target invocation.
#[derive(Debug)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Run the invocation to completion or until the timeout elapses.
pub fn execute(invocation: &Invocation, timeout: Duration) -> Result<CapturedOutput, ExecError> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .envs(&invocation.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: invocation.program.display().to_string(),
        source,
    })?;

    let stdout_thread = drain(child.stdout.take());
    let stderr_thread = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(ExecError::Capture)? {
            Some(status) => break Some(status),
            None if Instant::now() >= deadline => {
                kill_process_group(&mut child);
                let _ = child.wait();
                break None;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    match status {
        Some(status) => Ok(CapturedOutput {
            stdout,
            stderr,
            exit_code: status.code(),
        }),
        None => Err(ExecError::TimedOut(timeout)),
    }
}

/// Drain a pipe on a background thread, tolerating non-UTF-8 output.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    // The child is its own group leader, so its PID doubles as the PGID.
    let pgid = child.id() as libc::pid_t;
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}
