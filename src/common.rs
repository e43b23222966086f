pub type CameraName = String;
pub type CameraList = Vec<Camera>;



#[derive(Clone)]
#[derive(Debug, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Camera {
	pub name: CameraName,
	pub host: String,
	#[serde(default)]
	pub onvif_xaddr: Option<String>,
	#[serde(default)]
	pub rtsp_url: Option<String>,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub password: Option<String>,
	#[serde(default = "enabled_by_default")]
	pub enabled: bool,
}

fn enabled_by_default() -> bool {
	true
}

impl Camera {
	/// A bare camera as produced by discovery: enabled, no stream endpoint yet.
	pub fn new(name: impl Into<String>, host: impl Into<String>) -> Camera {
		Camera {
			name: name.into(),
			host: host.into(),
			enabled: true,
			..Default::default()
		}
	}

	/// The stream endpoint, if this camera can be played right now.
	pub fn playable_url(&self) -> Option<&str> {
		if !self.enabled {
			return None;
		}
		self.rtsp_url.as_deref().filter(|url| !url.is_empty())
	}
}

#[derive(Clone)]
#[derive(Debug, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct AppConfig {
	#[serde(default)]
	pub active_camera: Option<CameraName>,
	#[serde(default)]
	pub cameras: CameraList,
}

impl AppConfig {
	pub fn camera(&self, name: &str) -> Option<&Camera> {
		self.cameras.iter().find(|camera| camera.name == name)
	}

	/// The camera named by `active_camera`, whether or not it is playable.
	pub fn active(&self) -> Option<&Camera> {
		self.active_camera.as_deref().and_then(|name| self.camera(name))
	}

	/// Selects `name` for display. Only existing cameras can be selected.
	pub fn set_active(&mut self, name: &str) -> bool {
		if self.camera(name).is_none() {
			return false;
		}
		self.active_camera = Some(name.to_string());
		true
	}

	/// Replaces the camera with the same name. Returns false if there is none.
	pub fn replace(&mut self, camera: Camera) -> bool {
		match self.cameras.iter_mut().find(|c| c.name == camera.name) {
			Some(existing) => {
				*existing = camera;
				true
			},
			None => false,
		}
	}

	/// Appends a camera unless one with the same name already exists.
	pub fn insert(&mut self, camera: Camera) -> bool {
		if self.camera(&camera.name).is_some() {
			return false;
		}
		self.cameras.push(camera);
		true
	}
}
