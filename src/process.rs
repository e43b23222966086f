use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, warn};
use rocket::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};



/// Exit code reported when a process ended without a code of its own.
pub const UNKNOWN_EXIT: i32 = -1;

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("failed to launch {program}: {source}")]
	Launch {
		program: String,
		#[source]
		source: io::Error,
	},
	#[error("failed waiting on {program}: {source}")]
	Wait {
		program: String,
		#[source]
		source: io::Error,
	},
	#[error("{program} did not exit within {timeout:?}")]
	TimedOut {
		program: String,
		timeout: Duration,
	},
}

/// Runs external programs to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
	/// Runs `program` and waits however long it takes. Returns its exit code.
	async fn run(&self, program: &str, args: &[String]) -> Result<i32, ProcessError>;

	/// Like `run`, but kills the process once `timeout` has elapsed.
	async fn run_with_timeout(&self, program: &str, args: &[String], timeout: Duration) -> Result<i32, ProcessError>;
}

/// Spawns real child processes with all stdio detached.
#[derive(Clone, Debug, Default)]
pub struct CommandRunner;

impl CommandRunner {
	fn spawn(program: &str, args: &[String]) -> Result<Child, ProcessError> {
		Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| ProcessError::Launch { program: program.to_string(), source })
	}
}

#[async_trait]
impl ProcessRunner for CommandRunner {
	async fn run(&self, program: &str, args: &[String]) -> Result<i32, ProcessError> {
		let mut child = Self::spawn(program, args)?;
		debug!("Spawned {} (pid {:?})", program, child.id());
		let status = child.wait().await
			.map_err(|source| ProcessError::Wait { program: program.to_string(), source })?;
		Ok(exit_code(status))
	}

	async fn run_with_timeout(&self, program: &str, args: &[String], timeout: Duration) -> Result<i32, ProcessError> {
		let mut child = Self::spawn(program, args)?;
		match tokio::time::timeout(timeout, child.wait()).await {
			Ok(Ok(status)) => Ok(exit_code(status)),
			Ok(Err(source)) => Err(ProcessError::Wait { program: program.to_string(), source }),
			Err(_) => {
				// Reap it so no zombie is left behind.
				if let Err(err) = child.kill().await {
					warn!("Failed to kill {} after timeout; error was {}", program, err);
				}
				Err(ProcessError::TimedOut { program: program.to_string(), timeout })
			},
		}
	}
}

/// The process's exit code; a signal-terminated process reports the negated signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
	if let Some(code) = status.code() {
		return code;
	}
	#[cfg(unix)]
	{
		use std::os::unix::process::ExitStatusExt;
		if let Some(signal) = status.signal() {
			return -signal;
		}
	}
	UNKNOWN_EXIT
}
