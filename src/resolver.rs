use std::sync::Arc;

use rocket::async_trait;

use crate::common::AppConfig;
use crate::config::ConfigStore;



/// Yields the URL that should be on screen right now.
#[async_trait]
pub trait StreamSource: Send + Sync {
	async fn resolve(&self) -> anyhow::Result<Option<String>>;
}

/// The active camera's stream URL, if the active camera exists, is enabled and has one.
pub fn active_stream_url(config: &AppConfig) -> Option<String> {
	config.active()
		.and_then(|camera| camera.playable_url())
		.map(str::to_string)
}

/// Reads the config store fresh on every call.
pub struct ConfigStreamSource {
	store: Arc<ConfigStore>,
}

impl ConfigStreamSource {
	pub fn new(store: Arc<ConfigStore>) -> ConfigStreamSource {
		ConfigStreamSource { store }
	}
}

#[async_trait]
impl StreamSource for ConfigStreamSource {
	async fn resolve(&self) -> anyhow::Result<Option<String>> {
		Ok(active_stream_url(&self.store.load().await))
	}
}
