use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("{program} not found or not executable: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a finished child.
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion, killing it once `timeout` elapses.
///
/// Stdout and stderr are drained on their own threads so a chatty child
/// cannot block on a full pipe while we poll. Non-zero exits become
/// `ProcessError::Failed` with the trimmed stderr.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Captured, ProcessError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    log::debug!(
        "Running {program} {}",
        cmd.get_args()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            log::warn!("{program} timed out after {}s, killing", timeout.as_secs());
            child.kill().ok();
            child.wait().ok();
            return Err(ProcessError::Timeout {
                program,
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(Duration::from_millis(100));
    };

    let stdout = stdout_reader.map(join_output).unwrap_or_default();
    let stderr = stderr_reader.map(join_output).unwrap_or_default();

    if !status.success() {
        return Err(ProcessError::Failed {
            program,
            status,
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(Captured { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).ok();
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
