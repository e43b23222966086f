use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use rocket::async_trait;
use tokio::sync::watch;

use crate::player::Renderer;
use crate::resolver::StreamSource;



pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Sleeper: Send + Sync {
	async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
	async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

#[derive(Clone, Copy, Debug)]
pub struct PlaybackSettings {
	/// Pause after every player exit, whatever the exit code.
	pub retry_delay: Duration,
	/// Pause between checks while nothing is configured.
	pub idle_interval: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PlaybackState {
	Idle,
	Playing(String),
	Backoff,
}

/// What one pass through the loop did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cycle {
	/// Nothing to play; slept the idle interval.
	Idle,
	/// The source failed; slept the retry delay.
	ResolveFailed,
	/// The player ran and exited. `exit_code` is `None` when it never launched.
	Played {
		url: String,
		exit_code: Option<i32>,
	},
}

/// Keeps the active camera on screen.
///
/// Each cycle re-resolves the stream, so config edits take effect on the next
/// cycle. Every failure is logged and followed by the same fixed pause; nothing
/// ends the loop except a shutdown request, which is only honoured between
/// cycles and during pauses.
pub struct PlaybackLoop {
	source: Arc<dyn StreamSource>,
	renderer: Arc<dyn Renderer>,
	sleeper: Arc<dyn Sleeper>,
	settings: PlaybackSettings,
	shutdown: Option<watch::Receiver<bool>>,
	state: PlaybackState,
}

impl PlaybackLoop {
	pub fn new(
		source: Arc<dyn StreamSource>,
		renderer: Arc<dyn Renderer>,
		sleeper: Arc<dyn Sleeper>,
		settings: PlaybackSettings,
	) -> PlaybackLoop {
		PlaybackLoop {
			source,
			renderer,
			sleeper,
			settings,
			shutdown: None,
			state: PlaybackState::Idle,
		}
	}

	/// Stop once `shutdown` reads true.
	pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> PlaybackLoop {
		self.shutdown = Some(shutdown);
		self
	}

	fn enter(&mut self, state: PlaybackState) {
		if state != self.state {
			debug!("Playback {:?} -> {:?}", self.state, state);
		}
		self.state = state;
	}

	pub async fn run(&mut self) {
		info!("Playback loop started (retry delay {:?}, idle interval {:?})",
			self.settings.retry_delay, self.settings.idle_interval);
		while !self.shutdown_requested() {
			self.cycle().await;
		}
		info!("Playback loop stopped");
	}

	pub async fn cycle(&mut self) -> Cycle {
		let url = match self.source.resolve().await {
			Ok(Some(url)) => url,
			Ok(None) => {
				warn!("No active camera RTSP URL configured. Sleeping...");
				self.enter(PlaybackState::Idle);
				self.pause(self.settings.idle_interval).await;
				return Cycle::Idle;
			},
			Err(err) => {
				error!("Failed to resolve active stream; error was {:#}. Retrying in {:?}...", err, self.settings.retry_delay);
				self.enter(PlaybackState::Backoff);
				self.pause(self.settings.retry_delay).await;
				return Cycle::ResolveFailed;
			},
		};

		info!("Starting player: {}", url);
		self.enter(PlaybackState::Playing(url.clone()));
		let exit_code = match self.renderer.render_fullscreen(&url).await {
			Ok(code) => {
				warn!("Player exited (rc={}). Restarting in {:?}...", code, self.settings.retry_delay);
				Some(code)
			},
			Err(err) => {
				error!("Player did not run; error was {}. Restarting in {:?}...", err, self.settings.retry_delay);
				None
			},
		};

		self.enter(PlaybackState::Backoff);
		self.pause(self.settings.retry_delay).await;
		Cycle::Played { url, exit_code }
	}

	fn shutdown_requested(&self) -> bool {
		self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
	}

	async fn pause(&mut self, duration: Duration) {
		let sleep = self.sleeper.sleep(duration);
		match self.shutdown.as_mut() {
			Some(rx) => {
				tokio::select! {
					_ = sleep => {},
					_ = wait_for_shutdown(rx) => {},
				}
			},
			None => sleep.await,
		}
	}
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
	loop {
		let stop = *rx.borrow_and_update();
		if stop {
			return;
		}
		if rx.changed().await.is_err() {
			// Sender gone: nobody can ask us to stop any more.
			std::future::pending::<()>().await;
		}
	}
}
