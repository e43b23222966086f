#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info, warn};
use tokio::sync::watch;

use crate::bootstrap::RuntimePaths;
use crate::config::ConfigStore;
use crate::discovery::OnvifDiscovery;
use crate::playback::{PlaybackLoop, PlaybackSettings, TokioSleeper, DEFAULT_IDLE_INTERVAL, DEFAULT_RETRY_DELAY};
use crate::player::{MpvPlayer, Renderer, DEFAULT_PLAYER};
use crate::process::{CommandRunner, ProcessRunner};
use crate::resolver::{ConfigStreamSource, StreamSource};

mod bootstrap;
mod common;
mod config;
mod discovery;
mod logging;
mod pages;
mod playback;
mod player;
mod process;
mod resolver;
mod rest_api;



fn cli() -> Command {
	Command::new("camviewer")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Full-screen IP camera viewer with a local configuration page.")
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_parser(value_parser!(PathBuf))
				.help("YAML camera config file (default: search /etc/camviewer, /var/lib/camviewer, .)")
		)
		.arg(
			Arg::new("log-dir")
				.long("log-dir")
				.value_parser(value_parser!(PathBuf))
				.help("Directory for the daily camviewer.<date>.log files (default: /var/log/camviewer or ./logs)")
		)
		.arg(
			Arg::new("player")
				.long("player")
				.default_value(DEFAULT_PLAYER)
				.help("mpv-compatible player binary")
		)
		.arg(
			Arg::new("retry-delay")
				.long("retry-delay")
				.value_parser(value_parser!(u64))
				.default_value("3")
				.help("Seconds to wait after the player exits before restarting it")
		)
		.arg(
			Arg::new("idle-interval")
				.long("idle-interval")
				.value_parser(value_parser!(u64))
				.default_value("5")
				.help("Seconds between checks while no camera is active")
		)
		.arg(
			Arg::new("address")
				.long("address")
				.value_parser(value_parser!(IpAddr))
				.default_value("0.0.0.0")
				.help("Address for the configuration page")
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_parser(value_parser!(u16))
				.default_value("8080")
				.help("Port for the configuration page")
		)
		.arg(
			Arg::new("player-only")
				.long("player-only")
				.action(ArgAction::SetTrue)
				.conflicts_with("web-only")
				.help("Run the playback loop without the configuration page")
		)
		.arg(
			Arg::new("web-only")
				.long("web-only")
				.action(ArgAction::SetTrue)
				.help("Serve the configuration page without playing anything")
		)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.action(ArgAction::SetTrue)
				.help("Log at debug level")
		)
}

fn seconds(matches: &ArgMatches, id: &str) -> Option<Duration> {
	matches.get_one::<u64>(id).copied().map(Duration::from_secs)
}

/// Runs the playback loop until shutdown, starting a fresh one if it ever panics.
async fn supervise_playback(
	source: Arc<dyn StreamSource>,
	renderer: Arc<dyn Renderer>,
	settings: PlaybackSettings,
	shutdown: watch::Receiver<bool>,
) {
	loop {
		let mut playback = PlaybackLoop::new(source.clone(), renderer.clone(), Arc::new(TokioSleeper), settings)
			.with_shutdown(shutdown.clone());
		match tokio::spawn(async move { playback.run().await }).await {
			Ok(()) => return,
			Err(err) if err.is_cancelled() => return,
			Err(err) => {
				error!("Playback loop panicked; error was {}. Restarting in {:?}...", err, settings.retry_delay);
				tokio::time::sleep(settings.retry_delay).await;
			},
		}
	}
}


#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = cli().get_matches();

	let paths = RuntimePaths::resolve(
		matches.get_one::<PathBuf>("config").cloned(),
		matches.get_one::<PathBuf>("log-dir").cloned(),
	);
	logging::init(&paths.log_dir, matches.get_flag("verbose"));
	info!("camviewer {} starting; config dir {}, log dir {}",
		env!("CARGO_PKG_VERSION"), paths.config_dir.display(), paths.log_dir.display());

	let store = Arc::new(ConfigStore::new(paths));
	let runner: Arc<dyn ProcessRunner> = Arc::new(CommandRunner);
	let binary = matches.get_one::<String>("player").cloned().unwrap_or_else(|| DEFAULT_PLAYER.to_string());
	let player = MpvPlayer::new(runner, binary);
	let settings = PlaybackSettings {
		retry_delay: seconds(&matches, "retry-delay").unwrap_or(DEFAULT_RETRY_DELAY),
		idle_interval: seconds(&matches, "idle-interval").unwrap_or(DEFAULT_IDLE_INTERVAL),
	};

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let supervisor = if matches.get_flag("web-only") {
		None
	} else {
		let source: Arc<dyn StreamSource> = Arc::new(ConfigStreamSource::new(store.clone()));
		let renderer: Arc<dyn Renderer> = Arc::new(player.clone());
		Some(tokio::spawn(supervise_playback(source, renderer, settings, shutdown_rx)))
	};

	if matches.get_flag("player-only") {
		tokio::signal::ctrl_c().await?;
	} else {
		let address = matches.get_one::<IpAddr>("address").copied().unwrap_or(IpAddr::from([0, 0, 0, 0]));
		let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
		let figment = rocket::Config::figment()
			.merge(("address", address))
			.merge(("port", port));
		let discovery = Arc::new(OnvifDiscovery::default());
		rocket::custom(figment)
			.attach(rest_api::stage(store, player, discovery))
			.launch()
			.await?;
	}

	info!("Shutting down");
	let _ = shutdown_tx.send(true);
	if let Some(handle) = supervisor {
		// A player that is still running is killed when the runtime drops its task.
		if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
			warn!("Player still running at shutdown");
		}
	}

	anyhow::Ok(())
}
