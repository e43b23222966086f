use std::fmt::Write;

use crate::common::{AppConfig, Camera};



fn escape(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}

fn query_escape(text: &str) -> String {
	url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn layout(title: &str, body: &str) -> String {
	format!(
		"<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}</body></html>\n",
		escape(title),
		body
	)
}

fn opt(value: &Option<String>) -> String {
	escape(value.as_deref().unwrap_or(""))
}

fn camera_row(camera: &Camera, active: bool) -> String {
	let mut row = String::new();
	let _ = write!(row, "<tr><td>{}{}</td><td>{}</td><td>{}</td><td>{}</td>",
		escape(&camera.name),
		if active { " (active)" } else { "" },
		escape(&camera.host),
		opt(&camera.rtsp_url),
		if camera.enabled { "yes" } else { "no" },
	);
	let _ = write!(row, "<td><a href=\"/edit?name={}\">edit</a></td>", query_escape(&camera.name));
	let _ = write!(row,
		"<td><form method=\"post\" action=\"/set-active\"><input type=\"hidden\" name=\"name\" value=\"{}\"><button>show</button></form></td>",
		escape(&camera.name));
	match &camera.rtsp_url {
		Some(url) if !url.is_empty() => {
			let _ = write!(row,
				"<td><form method=\"post\" action=\"/test\"><input type=\"hidden\" name=\"rtsp_url\" value=\"{}\"><button>test</button></form></td>",
				escape(url));
		},
		_ => row.push_str("<td></td>"),
	}
	row.push_str("</tr>\n");
	row
}

pub fn home(config: &AppConfig, test: Option<&str>) -> String {
	let mut body = String::from("<h1>Camera viewer</h1>\n");
	match test {
		Some("ok") => body.push_str("<p class=\"ok\">Stream test passed.</p>\n"),
		Some("fail") => body.push_str("<p class=\"fail\">Stream test failed.</p>\n"),
		_ => {},
	}
	let _ = writeln!(body, "<p>Active camera: {}</p>", opt(&config.active_camera));

	if config.cameras.is_empty() {
		body.push_str("<p>No cameras configured.</p>\n");
	} else {
		body.push_str("<table>\n<tr><th>Name</th><th>Host</th><th>RTSP URL</th><th>Enabled</th><th></th><th></th><th></th></tr>\n");
		for camera in &config.cameras {
			let active = config.active_camera.as_deref() == Some(camera.name.as_str());
			body.push_str(&camera_row(camera, active));
		}
		body.push_str("</table>\n");
	}

	body.push_str("<form method=\"post\" action=\"/discover\"><button>Discover ONVIF cameras</button></form>\n");
	body.push_str(concat!(
		"<h2>Add camera</h2>\n",
		"<form method=\"post\" action=\"/add\">",
		"<label>Name <input name=\"name\" required></label> ",
		"<label>Host <input name=\"host\"></label> ",
		"<button>Add</button></form>\n",
	));
	layout("Camera viewer", &body)
}

pub fn edit(camera: &Camera) -> String {
	let mut body = String::new();
	let _ = writeln!(body, "<h1>Edit {}</h1>", escape(&camera.name));
	let _ = write!(body, concat!(
		"<form method=\"post\" action=\"/save\">\n",
		"<input type=\"hidden\" name=\"name\" value=\"{}\">\n",
		"<label>Host <input name=\"host\" value=\"{}\"></label><br>\n",
		"<label>RTSP URL <input name=\"rtsp_url\" value=\"{}\"></label><br>\n",
		"<label>Username <input name=\"username\" value=\"{}\"></label><br>\n",
		"<label>Password <input type=\"password\" name=\"password\" value=\"{}\"></label><br>\n",
		"<label>Enabled <input type=\"checkbox\" name=\"enabled\" value=\"on\"{}></label><br>\n",
		"<button>Save</button>\n",
		"</form>\n",
		"<p><a href=\"/\">back</a></p>\n",
	),
		escape(&camera.name),
		escape(&camera.host),
		opt(&camera.rtsp_url),
		opt(&camera.username),
		opt(&camera.password),
		if camera.enabled { " checked" } else { "" },
	);
	layout(&format!("Edit {}", camera.name), &body)
}
