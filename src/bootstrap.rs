use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};



const CONFIG_DIR_CANDIDATES: [&str; 2] = ["/etc/camviewer", "/var/lib/camviewer"];
const LOG_DIR_CANDIDATES: [&str; 1] = ["/var/log/camviewer"];
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Directories chosen once at startup and handed to everything that needs a path.
#[derive(Clone, Debug)]
pub struct RuntimePaths {
	pub config_dir: PathBuf,
	pub log_dir: PathBuf,
	/// Set when the operator named a config file explicitly; reads and writes go only there.
	pub config_file: Option<PathBuf>,
}

impl RuntimePaths {
	pub fn resolve(config_file: Option<PathBuf>, log_dir: Option<PathBuf>) -> RuntimePaths {
		let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

		let mut config_candidates: Vec<PathBuf> = CONFIG_DIR_CANDIDATES.iter().map(PathBuf::from).collect();
		config_candidates.push(cwd.clone());

		let log_candidates: Vec<PathBuf> = match log_dir {
			Some(dir) => vec![dir],
			None => {
				let mut candidates: Vec<PathBuf> = LOG_DIR_CANDIDATES.iter().map(PathBuf::from).collect();
				candidates.push(cwd.join("logs"));
				candidates
			},
		};

		RuntimePaths {
			config_dir: pick_writable_dir(&config_candidates),
			log_dir: pick_writable_dir(&log_candidates),
			config_file,
		}
	}

	/// Where saves go.
	pub fn config_target(&self) -> PathBuf {
		match &self.config_file {
			Some(file) => file.clone(),
			None => self.config_dir.join(CONFIG_FILE_NAME),
		}
	}

	/// Files consulted on load, in priority order. The save target always comes first
	/// so that what the web form writes is what the player reads.
	pub fn config_candidates(&self) -> Vec<PathBuf> {
		if let Some(file) = &self.config_file {
			return vec![file.clone()];
		}
		let mut candidates = vec![self.config_target()];
		let fixed = CONFIG_DIR_CANDIDATES.iter()
			.map(|dir| Path::new(dir).join(CONFIG_FILE_NAME))
			.chain(std::iter::once(PathBuf::from(".").join(CONFIG_FILE_NAME)));
		for path in fixed {
			if !candidates.contains(&path) {
				candidates.push(path);
			}
		}
		candidates
	}
}

fn is_writable(dir: &Path) -> bool {
	match fs::metadata(dir) {
		Ok(meta) => meta.is_dir() && !meta.permissions().readonly() && probe_write(dir),
		Err(_) => false,
	}
}

// Permission bits alone lie for root and for read-only mounts.
fn probe_write(dir: &Path) -> bool {
	let probe = dir.join(".camviewer-write-test");
	match fs::write(&probe, b"") {
		Ok(_) => {
			let _ = fs::remove_file(&probe);
			true
		},
		Err(_) => false,
	}
}

/// First candidate that exists and is writable, or can be created. Falls back to the cwd.
pub fn pick_writable_dir(candidates: &[PathBuf]) -> PathBuf {
	for dir in candidates {
		if dir.exists() {
			if is_writable(dir) {
				return dir.clone();
			}
			continue;
		}
		match fs::create_dir_all(dir) {
			Ok(_) if is_writable(dir) => {
				debug!("Created runtime directory {}", dir.display());
				return dir.clone();
			},
			Ok(_) => {},
			Err(err) => {
				debug!("Could not create {}; error was {}", dir.display(), err);
			},
		}
	}

	let fallback = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
	warn!("No writable runtime directory among {:?}; using {}", candidates, fallback.display());
	fallback
}
