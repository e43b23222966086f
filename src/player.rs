use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rocket::async_trait;

use crate::process::{ProcessError, ProcessRunner};



pub const DEFAULT_PLAYER: &str = "mpv";
/// Seconds mpv waits between its own reconnect attempts.
pub const RECONNECT_DELAY_SECS: u64 = 2;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 4;
/// Added to the probe's own network timeout to get the hard deadline.
pub const PROBE_DEADLINE_MARGIN_SECS: u64 = 2;

/// Puts a stream on the screen and blocks until the display process exits.
#[async_trait]
pub trait Renderer: Send + Sync {
	async fn render_fullscreen(&self, url: &str) -> Result<i32, ProcessError>;
}

/// Arguments for unattended full-screen live playback of `url`.
///
/// The URL always follows `--`, so mpv never reads it as an option.
///
/// Hermetic (`--no-config`), silent, low latency, hardware decoding when the
/// host has it, and mpv-side reconnects so short network drops never reach the
/// supervisor.
pub fn fullscreen_args(url: &str) -> Vec<String> {
	vec![
		"--fs".to_string(),
		"--no-osd-bar".to_string(),
		"--profile=low-latency".to_string(),
		"--really-quiet".to_string(),
		"--no-config".to_string(),
		"--hwdec=auto-safe".to_string(),
		"--keep-open=yes".to_string(),
		format!("--stream-lavf-o=reconnect=1,reconnect_streamed=1,reconnect_delay_max={}", RECONNECT_DELAY_SECS),
		"--".to_string(),
		url.to_string(),
	]
}

/// Arguments that open `url`, decode one frame, and quit.
pub fn probe_args(url: &str, timeout_secs: u64) -> Vec<String> {
	vec![
		"--no-terminal".to_string(),
		"--frames=1".to_string(),
		format!("--network-timeout={}", timeout_secs),
		"--no-config".to_string(),
		"--".to_string(),
		url.to_string(),
	]
}

/// How a probe ended. Callers only see playable or not; the detail goes to the log.
#[derive(Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
	Playable,
	Exited(i32),
	TimedOut,
	Failed(String),
}

impl ProbeOutcome {
	pub fn is_playable(&self) -> bool {
		*self == ProbeOutcome::Playable
	}
}

/// Drives an mpv-compatible player binary through a `ProcessRunner`.
#[derive(Clone)]
pub struct MpvPlayer {
	runner: Arc<dyn ProcessRunner>,
	binary: String,
}

impl MpvPlayer {
	pub fn new(runner: Arc<dyn ProcessRunner>, binary: impl Into<String>) -> MpvPlayer {
		MpvPlayer {
			runner,
			binary: binary.into(),
		}
	}

	pub async fn probe(&self, url: &str, timeout_secs: u64) -> ProbeOutcome {
		let deadline = Duration::from_secs(timeout_secs + PROBE_DEADLINE_MARGIN_SECS);
		let args = probe_args(url, timeout_secs);
		match self.runner.run_with_timeout(&self.binary, &args, deadline).await {
			Ok(0) => ProbeOutcome::Playable,
			Ok(code) => ProbeOutcome::Exited(code),
			Err(ProcessError::TimedOut { .. }) => ProbeOutcome::TimedOut,
			Err(err) => ProbeOutcome::Failed(err.to_string()),
		}
	}

	/// True only if the stream produced a frame before the deadline.
	pub async fn probe_playable(&self, url: &str, timeout_secs: u64) -> bool {
		let outcome = self.probe(url, timeout_secs).await;
		match &outcome {
			ProbeOutcome::Playable => info!("Probe of {} succeeded", url),
			other => info!("Probe of {} failed: {:?}", url, other),
		}
		outcome.is_playable()
	}
}

#[async_trait]
impl Renderer for MpvPlayer {
	async fn render_fullscreen(&self, url: &str) -> Result<i32, ProcessError> {
		let args = fullscreen_args(url);
		debug!("Launching {} {:?}", self.binary, args);
		self.runner.run(&self.binary, &args).await
	}
}
