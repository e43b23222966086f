use std::io::{self, Write};
use std::path::Path;

use env_logger::{Env, Target};
use log::LevelFilter;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};



pub const LOG_FILE_PREFIX: &str = "camviewer";
pub const LOG_FILE_SUFFIX: &str = "log";
/// Today's file plus the previous day's.
const KEPT_LOG_FILES: usize = 2;

/// Daily `camviewer.<date>.log` files in `log_dir`, pruned to the newest two.
pub fn open_log_file(log_dir: &Path) -> Result<RollingFileAppender, InitError> {
	RollingFileAppender::builder()
		.rotation(Rotation::DAILY)
		.filename_prefix(LOG_FILE_PREFIX)
		.filename_suffix(LOG_FILE_SUFFIX)
		.max_log_files(KEPT_LOG_FILES)
		.build(log_dir)
}

/// Copies every record to stderr and, when it could be opened, the log file.
struct Tee<W> {
	file: Option<W>,
}

impl<W: Write> Write for Tee<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let _ = io::stderr().write_all(buf);
		if let Some(file) = self.file.as_mut() {
			if let Err(err) = file.write_all(buf) {
				let _ = writeln!(io::stderr(), "camviewer: log file write failed; error was {}", err);
				self.file = None;
			}
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		let _ = io::stderr().flush();
		match self.file.as_mut() {
			Some(file) => file.flush(),
			None => Ok(()),
		}
	}
}

/// Installs the process logger. `RUST_LOG` overrides the default level.
pub fn init(log_dir: &Path, verbose: bool) {
	let default_level = if verbose {
		LevelFilter::Debug
	} else {
		LevelFilter::Info
	};
	let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
	builder.format_timestamp_millis();

	let file = match open_log_file(log_dir) {
		Ok(file) => Some(file),
		Err(err) => {
			eprintln!("camviewer: cannot open log file in {}; logging to stderr only; error was {}", log_dir.display(), err);
			None
		},
	};
	builder.target(Target::Pipe(Box::new(Tee { file })));
	let _ = builder.try_init();
}
