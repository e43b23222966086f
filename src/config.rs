use std::io;
use std::path::PathBuf;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::bootstrap::RuntimePaths;
use crate::common::AppConfig;



#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file {path} could not be accessed: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("config file {path} is not valid YAML: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},
	#[error("config could not be serialized: {0}")]
	Serialize(#[from] serde_yaml::Error),
}

/// Persisted camera list and active selection.
///
/// Reads always go to disk so that every reader sees the latest save. There is no
/// locking against other processes; a save replaces the file with a rename, so a
/// concurrent reader sees either the old or the new document.
pub struct ConfigStore {
	paths: RuntimePaths,
	write_lock: Mutex<()>,
}

impl ConfigStore {
	pub fn new(paths: RuntimePaths) -> ConfigStore {
		ConfigStore {
			paths,
			write_lock: Mutex::new(()),
		}
	}

	/// Loads the configuration. Never fails: a missing, unreadable or malformed
	/// file yields the empty configuration.
	pub async fn load(&self) -> AppConfig {
		match self.try_load().await {
			Ok(Some(config)) => config,
			Ok(None) => {
				debug!("No config file found; using empty config");
				AppConfig::default()
			},
			Err(err) => {
				warn!("Failed to read camera config file; error was {}", err);
				AppConfig::default()
			},
		}
	}

	/// Reads the first config file that exists. `Ok(None)` when there is none.
	pub async fn try_load(&self) -> Result<Option<AppConfig>, ConfigError> {
		for path in self.paths.config_candidates() {
			let text = match tokio::fs::read_to_string(&path).await {
				Ok(text) => text,
				Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
				Err(source) => return Err(ConfigError::Io { path, source }),
			};
			if text.trim().is_empty() {
				return Ok(Some(AppConfig::default()));
			}
			return serde_yaml::from_str(&text)
				.map(Some)
				.map_err(|source| ConfigError::Parse { path, source });
		}
		Ok(None)
	}

	/// Writes the configuration to its target file and returns where it went.
	pub async fn save(&self, config: &AppConfig) -> Result<PathBuf, ConfigError> {
		let _guard = self.write_lock.lock().await;
		self.write(config).await
	}

	async fn write(&self, config: &AppConfig) -> Result<PathBuf, ConfigError> {
		let target = self.paths.config_target();
		let yaml = serde_yaml::to_string(config)?;
		let io_err = |source: io::Error| ConfigError::Io { path: target.clone(), source };

		if let Some(parent) = target.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
			}
		}

		let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
		tmp_name.push(".tmp");
		let tmp = target.with_file_name(tmp_name);

		let file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
		let mut writer = tokio::io::BufWriter::new(file);
		writer.write_all(yaml.as_bytes()).await.map_err(io_err)?;
		writer.flush().await.map_err(io_err)?;
		writer.get_ref().sync_all().await.map_err(io_err)?;
		drop(writer);
		tokio::fs::rename(&tmp, &target).await.map_err(io_err)?;

		info!("Wrote camera config file {}", target.display());
		Ok(target)
	}

	/// Load, apply `edit`, and save if `edit` returns true. The write lock is held
	/// across the whole cycle so concurrent edits from this process are not lost.
	pub async fn update<F>(&self, edit: F) -> Result<bool, ConfigError>
	where
		F: FnOnce(&mut AppConfig) -> bool,
	{
		let _guard = self.write_lock.lock().await;
		let mut config = self.load().await;
		if !edit(&mut config) {
			return Ok(false);
		}
		self.write(&config).await?;
		Ok(true)
	}
}
