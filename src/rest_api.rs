use std::sync::Arc;

use rocket::form::Form;
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::response::Redirect;
use rocket::serde::json::{json, Json, Value};
use rocket::State;

use log::{warn, error};
use url::Url;

use crate::common::Camera;
use crate::common::CameraList;
use crate::config::{ConfigError, ConfigStore};
use crate::discovery::{merge_discovered, Discovery};
use crate::pages;
use crate::player::{MpvPlayer, DEFAULT_PROBE_TIMEOUT_SECS};
use crate::resolver::active_stream_url;



type Store = State<Arc<ConfigStore>>;

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn write_failed(err: ConfigError) -> Status {
	error!("Failed to write camera config file; error was {}", err);
	Status::InternalServerError
}

fn back_home() -> Redirect {
	Redirect::to("/")
}


#[get("/?<test>")]
async fn home(test: Option<String>, store: &Store) -> RawHtml<String> {
	RawHtml(pages::home(&store.load().await, test.as_deref()))
}

#[post("/discover")]
async fn discover(store: &Store, discovery: &State<Arc<dyn Discovery>>) -> Result<Redirect, Status> {
	let found = discovery.discover().await;
	store.update(|config| merge_discovered(config, &found) > 0).await.map_err(write_failed)?;
	Ok(back_home())
}

#[derive(FromForm)]
struct ActiveForm {
	name: String,
}

#[post("/set-active", data = "<form>")]
async fn set_active(form: Form<ActiveForm>, store: &Store) -> Result<Redirect, Status> {
	let name = form.into_inner().name;
	let changed = store.update(|config| config.set_active(&name)).await.map_err(write_failed)?;
	if !changed {
		warn!("Ignoring request to show unknown camera {}", name);
	}
	Ok(back_home())
}

#[get("/edit?<name>")]
async fn edit(name: String, store: &Store) -> Option<RawHtml<String>> {
	let config = store.load().await;
	config.camera(&name).map(|camera| RawHtml(pages::edit(camera)))
}

#[derive(FromForm)]
struct NewCameraForm {
	name: String,
	host: Option<String>,
}

#[post("/add", data = "<form>")]
async fn add_camera(form: Form<NewCameraForm>, store: &Store) -> Result<Redirect, Status> {
	let form = form.into_inner();
	let name = match non_empty(Some(form.name)) {
		Some(name) => name,
		None => return Ok(back_home()),
	};
	let host = non_empty(form.host).unwrap_or_else(|| name.clone());
	let added = store.update(|config| config.insert(Camera::new(name.clone(), host))).await.map_err(write_failed)?;
	if !added {
		warn!("Camera {} already exists", name);
	}
	Ok(back_home())
}

#[derive(FromForm)]
struct CameraForm {
	name: String,
	host: Option<String>,
	rtsp_url: Option<String>,
	username: Option<String>,
	password: Option<String>,
	enabled: Option<String>,
}

#[post("/save", data = "<form>")]
async fn save_camera(form: Form<CameraForm>, store: &Store) -> Result<Redirect, Status> {
	let form = form.into_inner();
	let rtsp_url = non_empty(form.rtsp_url);
	if let Some(url) = &rtsp_url {
		if let Err(err) = Url::parse(url) {
			warn!("Ignoring edit of {}: stream URL {} does not parse; error was {}", form.name, url, err);
			return Ok(back_home());
		}
	}

	let name = form.name;
	let camera = Camera {
		host: non_empty(form.host).unwrap_or_else(|| name.clone()),
		onvif_xaddr: None,
		rtsp_url,
		username: non_empty(form.username),
		password: non_empty(form.password),
		enabled: form.enabled.as_deref() == Some("on"),
		name: name.clone(),
	};
	let saved = store.update(|config| {
		let onvif_xaddr = match config.camera(&camera.name) {
			Some(existing) => existing.onvif_xaddr.clone(),
			None => return false,
		};
		config.replace(Camera { onvif_xaddr, ..camera })
	}).await.map_err(write_failed)?;
	if !saved {
		warn!("Ignoring edit of unknown camera {}", name);
	}
	Ok(back_home())
}

#[derive(FromForm)]
struct ProbeForm {
	rtsp_url: String,
}

#[post("/test", data = "<form>")]
async fn test_stream(form: Form<ProbeForm>, player: &State<MpvPlayer>) -> Redirect {
	if player.probe_playable(&form.rtsp_url, DEFAULT_PROBE_TIMEOUT_SECS).await {
		Redirect::to("/?test=ok")
	} else {
		Redirect::to("/?test=fail")
	}
}


fn redacted(camera: &Camera) -> Camera {
	Camera {
		password: None,
		..camera.clone()
	}
}

#[get("/")]
async fn list_cameras(store: &Store) -> Json<CameraList> {
	let config = store.load().await;
	Json(config.cameras.iter().map(redacted).collect())
}

#[get("/<name>")]
async fn get_camera(name: &str, store: &Store) -> Option<Json<Camera>> {
	let config = store.load().await;
	config.camera(name).map(|camera| {
		Json(redacted(camera))
	})
}

#[post("/", data="<camera_json>")]
async fn new_camera(camera_json: Json<Camera>, store: &Store) -> Result<Json<Camera>, Status> {
	let camera = camera_json.into_inner();
	if camera.name.is_empty() {
		return Err(Status::UnprocessableEntity);
	}
	if let Some(url) = camera.rtsp_url.as_deref().filter(|url| !url.is_empty()) {
		if let Err(err) = Url::parse(url) {
			warn!("Rejecting new camera {}: stream URL {} does not parse; error was {}", camera.name, url, err);
			return Err(Status::UnprocessableEntity);
		}
	}
	let inserted = store.update(|config| config.insert(camera.clone())).await.map_err(write_failed)?;
	if !inserted {
		return Err(Status::Conflict);
	}
	Ok(Json(redacted(&camera)))
}

#[derive(Debug, Serialize, Deserialize)]
struct ActiveStream {
	camera: Option<String>,
	url: Option<String>,
}

#[get("/active")]
async fn active_stream(store: &Store) -> Json<ActiveStream> {
	let config = store.load().await;
	Json(ActiveStream {
		url: active_stream_url(&config),
		camera: config.active_camera,
	})
}

#[catch(404)]
fn not_found() -> Value {
	json!({
		"status": "error",
		"reason": "Resource was not found."
	})
}



pub fn stage(store: Arc<ConfigStore>, player: MpvPlayer, discovery: Arc<dyn Discovery>) -> rocket::fairing::AdHoc {
	rocket::fairing::AdHoc::on_ignite("Camera viewer", move |rocket| async move {
		rocket
			.manage(store)
			.manage(player)
			.manage(discovery)
			.register("/", catchers![not_found])
			.mount("/", routes![home, discover, set_active, edit, add_camera, save_camera, test_stream])
			.mount("/v0/cameras", routes![list_cameras, get_camera, new_camera])
			.mount("/v0", routes![active_stream])
	})
}



#[cfg(test)]
mod tests {
	use std::time::Duration;

	use rocket::async_trait;
	use rocket::http::ContentType;
	use rocket::local::asynchronous::Client;

	use super::*;
	use crate::bootstrap::RuntimePaths;
	use crate::common::AppConfig;
	use crate::discovery::FoundDevice;
	use crate::process::{ProcessError, ProcessRunner};

	struct FixedExit(i32);

	#[async_trait]
	impl ProcessRunner for FixedExit {
		async fn run(&self, _program: &str, _args: &[String]) -> Result<i32, ProcessError> {
			Ok(self.0)
		}

		async fn run_with_timeout(&self, _program: &str, _args: &[String], _timeout: Duration) -> Result<i32, ProcessError> {
			Ok(self.0)
		}
	}

	struct FixedDiscovery {
		devices: Vec<FoundDevice>,
	}

	#[async_trait]
	impl Discovery for FixedDiscovery {
		async fn discover(&self) -> Vec<FoundDevice> {
			self.devices.clone()
		}
	}

	struct Harness {
		client: Client,
		store: Arc<ConfigStore>,
		_dir: tempfile::TempDir,
	}

	async fn harness(config: AppConfig, probe_exit: i32) -> Harness {
		let dir = tempfile::tempdir().unwrap();
		let store = Arc::new(ConfigStore::new(RuntimePaths {
			config_dir: dir.path().to_path_buf(),
			log_dir: dir.path().to_path_buf(),
			config_file: Some(dir.path().join("config.yaml")),
		}));
		store.save(&config).await.unwrap();
		let player = MpvPlayer::new(Arc::new(FixedExit(probe_exit)), "mpv");
		let discovery: Arc<dyn Discovery> = Arc::new(FixedDiscovery {
			devices: vec![FoundDevice {
				epr: "urn:uuid:1".into(),
				xaddrs: vec!["http://192.168.1.70/onvif/device_service".into()],
				scopes: Vec::new(),
				address: "http://192.168.1.70/onvif/device_service".into(),
			}],
		});
		let rocket = rocket::build().attach(stage(store.clone(), player, discovery));
		let client = Client::tracked(rocket).await.unwrap();
		Harness { client, store, _dir: dir }
	}

	fn sample() -> AppConfig {
		let mut porch = Camera::new("porch", "10.0.0.5");
		porch.rtsp_url = Some("rtsp://10.0.0.5/stream1".into());
		porch.password = Some("hunter2".into());
		porch.onvif_xaddr = Some("http://10.0.0.5/onvif/device_service".into());
		AppConfig {
			active_camera: None,
			cameras: vec![porch, Camera::new("garage", "10.0.0.6")],
		}
	}

	fn location(response: &rocket::local::asynchronous::LocalResponse<'_>) -> Option<String> {
		response.headers().get_one("Location").map(str::to_string)
	}

	#[rocket::async_test]
	async fn home_renders_cameras() {
		let h = harness(sample(), 0).await;
		let response = h.client.get("/").dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let body = response.into_string().await.unwrap();
		assert!(body.contains("porch"));
		assert!(body.contains("rtsp://10.0.0.5/stream1"));
	}

	#[rocket::async_test]
	async fn set_active_selects_existing_camera_only() {
		let h = harness(sample(), 0).await;

		let response = h.client.post("/set-active").header(ContentType::Form).body("name=attic").dispatch().await;
		assert_eq!(response.status(), Status::SeeOther);
		assert_eq!(h.store.load().await.active_camera, None);

		let response = h.client.post("/set-active").header(ContentType::Form).body("name=porch").dispatch().await;
		assert_eq!(response.status(), Status::SeeOther);
		assert_eq!(location(&response).as_deref(), Some("/"));
		assert_eq!(h.store.load().await.active_camera.as_deref(), Some("porch"));

		let active: Value = h.client.get("/v0/active").dispatch().await.into_json().await.unwrap();
		assert_eq!(active["url"], "rtsp://10.0.0.5/stream1");
	}

	#[rocket::async_test]
	async fn save_replaces_camera_and_keeps_discovery_address() {
		let h = harness(sample(), 0).await;
		let response = h.client.post("/save")
			.header(ContentType::Form)
			.body("name=porch&host=&rtsp_url=rtsp%3A%2F%2F10.0.0.9%2Fmain&username=admin&password=")
			.dispatch().await;
		assert_eq!(response.status(), Status::SeeOther);

		let config = h.store.load().await;
		let porch = config.camera("porch").unwrap();
		assert_eq!(porch.host, "porch");
		assert_eq!(porch.rtsp_url.as_deref(), Some("rtsp://10.0.0.9/main"));
		assert_eq!(porch.username.as_deref(), Some("admin"));
		assert_eq!(porch.password, None);
		assert!(!porch.enabled);
		assert_eq!(porch.onvif_xaddr.as_deref(), Some("http://10.0.0.5/onvif/device_service"));
	}

	#[rocket::async_test]
	async fn save_ignores_unknown_camera_and_bad_url() {
		let h = harness(sample(), 0).await;
		h.client.post("/save").header(ContentType::Form).body("name=attic&enabled=on").dispatch().await;
		h.client.post("/save").header(ContentType::Form).body("name=porch&rtsp_url=not%20a%20url&enabled=on").dispatch().await;
		assert_eq!(h.store.load().await, sample());
	}

	#[rocket::async_test]
	async fn edit_unknown_camera_is_404() {
		let h = harness(sample(), 0).await;
		assert_eq!(h.client.get("/edit?name=garage").dispatch().await.status(), Status::Ok);
		assert_eq!(h.client.get("/edit?name=attic").dispatch().await.status(), Status::NotFound);
	}

	#[rocket::async_test]
	async fn test_redirects_with_probe_verdict() {
		let ok = harness(sample(), 0).await;
		let response = ok.client.post("/test").header(ContentType::Form).body("rtsp_url=rtsp%3A%2F%2F10.0.0.5%2Fstream1").dispatch().await;
		assert_eq!(location(&response).as_deref(), Some("/?test=ok"));

		let failing = harness(sample(), 1).await;
		let response = failing.client.post("/test").header(ContentType::Form).body("rtsp_url=rtsp%3A%2F%2F10.0.0.5%2Fstream1").dispatch().await;
		assert_eq!(location(&response).as_deref(), Some("/?test=fail"));
	}

	#[rocket::async_test]
	async fn discover_merges_new_hosts() {
		let h = harness(sample(), 0).await;
		let response = h.client.post("/discover").dispatch().await;
		assert_eq!(response.status(), Status::SeeOther);
		let config = h.store.load().await;
		assert_eq!(config.cameras.len(), 3);
		assert!(config.camera("192.168.1.70").is_some());
	}

	#[rocket::async_test]
	async fn add_form_creates_camera() {
		let h = harness(AppConfig::default(), 0).await;
		h.client.post("/add").header(ContentType::Form).body("name=porch&host=10.0.0.5").dispatch().await;
		h.client.post("/add").header(ContentType::Form).body("name=porch&host=10.0.0.6").dispatch().await;
		let config = h.store.load().await;
		assert_eq!(config.cameras, vec![Camera::new("porch", "10.0.0.5")]);
	}

	#[rocket::async_test]
	async fn json_api_lists_and_creates_without_leaking_passwords() {
		let h = harness(sample(), 0).await;

		let cameras: CameraList = h.client.get("/v0/cameras").dispatch().await.into_json().await.unwrap();
		assert_eq!(cameras.len(), 2);
		assert!(cameras.iter().all(|c| c.password.is_none()));

		let porch: Camera = h.client.get("/v0/cameras/porch").dispatch().await.into_json().await.unwrap();
		assert_eq!(porch.host, "10.0.0.5");

		let response = h.client.post("/v0/cameras").json(&Camera::new("attic", "10.0.0.7")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let response = h.client.post("/v0/cameras").json(&Camera::new("attic", "10.0.0.8")).dispatch().await;
		assert_eq!(response.status(), Status::Conflict);
		assert_eq!(h.store.load().await.cameras.len(), 3);

		let missing = h.client.get("/v0/cameras/nowhere").dispatch().await;
		assert_eq!(missing.status(), Status::NotFound);
		let body: Value = missing.into_json().await.unwrap();
		assert_eq!(body["status"], "error");
	}

	#[rocket::async_test]
	async fn json_create_rejects_empty_name_and_bad_url() {
		let h = harness(sample(), 0).await;

		let response = h.client.post("/v0/cameras").json(&Camera::new("", "10.0.0.7")).dispatch().await;
		assert_eq!(response.status(), Status::UnprocessableEntity);

		let mut attic = Camera::new("attic", "10.0.0.7");
		attic.rtsp_url = Some("--script=/tmp/evil.lua".into());
		let response = h.client.post("/v0/cameras").json(&attic).dispatch().await;
		assert_eq!(response.status(), Status::UnprocessableEntity);
		assert_eq!(h.store.load().await, sample());

		attic.rtsp_url = Some("rtsp://10.0.0.7/stream1".into());
		let response = h.client.post("/v0/cameras").json(&attic).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		assert_eq!(h.store.load().await.camera("attic").and_then(|c| c.rtsp_url.clone()).as_deref(), Some("rtsp://10.0.0.7/stream1"));
	}
}
