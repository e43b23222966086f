use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info, warn};
use rocket::async_trait;
use tokio::net::UdpSocket;
use url::Url;
use uuid::Uuid;
use xmltree::{Element, XMLNode};

use crate::common::{AppConfig, Camera};



pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(4);
const WS_DISCOVERY_ADDR: &str = "239.255.255.250:3702";

/// One ONVIF device that answered a probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundDevice {
	pub epr: String,
	pub xaddrs: Vec<String>,
	pub scopes: Vec<String>,
	/// First advertised service address, or empty.
	pub address: String,
}

impl FoundDevice {
	/// Host of the first parseable service address, falling back to the endpoint reference.
	pub fn host(&self) -> String {
		self.xaddrs.iter()
			.filter_map(|xaddr| Url::parse(xaddr).ok())
			.find_map(|url| url.host_str().map(str::to_string))
			.unwrap_or_else(|| self.epr.clone())
	}
}

#[async_trait]
pub trait Discovery: Send + Sync {
	async fn discover(&self) -> Vec<FoundDevice>;
}

/// WS-Discovery over UDP multicast, looking for network video transmitters.
pub struct OnvifDiscovery {
	pub timeout: Duration,
}

impl Default for OnvifDiscovery {
	fn default() -> Self {
		OnvifDiscovery { timeout: DEFAULT_DISCOVERY_TIMEOUT }
	}
}

#[async_trait]
impl Discovery for OnvifDiscovery {
	async fn discover(&self) -> Vec<FoundDevice> {
		match probe_network(self.timeout).await {
			Ok(devices) => {
				info!("ONVIF discovery found {} device(s)", devices.len());
				for device in &devices {
					info!("  {} at {} (scopes: {})", device.epr, device.address, device.scopes.join(" "));
				}
				devices
			},
			Err(err) => {
				warn!("ONVIF discovery failed; error was {}", err);
				Vec::new()
			},
		}
	}
}

async fn probe_network(timeout: Duration) -> io::Result<Vec<FoundDevice>> {
	let target: SocketAddr = WS_DISCOVERY_ADDR.parse()
		.map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
	let socket = UdpSocket::bind("0.0.0.0:0").await?;
	socket.set_multicast_ttl_v4(4)?;

	let message_id = new_message_id();
	socket.send_to(probe_message(&message_id).as_bytes(), target).await?;

	let deadline = tokio::time::Instant::now() + timeout;
	let mut buf = vec![0u8; 65536];
	let mut devices: Vec<FoundDevice> = Vec::new();
	loop {
		let (len, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
			Err(_) => break,
			Ok(Err(err)) => {
				warn!("Error receiving discovery reply; error was {}", err);
				break;
			},
			Ok(Ok(received)) => received,
		};
		let reply = String::from_utf8_lossy(&buf[..len]);
		match parse_probe_match(&reply, &message_id) {
			Some(device) => {
				debug!("Discovery reply from {}: {:?}", from, device);
				if !devices.iter().any(|d| d.epr == device.epr) {
					devices.push(device);
				}
			},
			None => debug!("Ignoring unrelated datagram from {}", from),
		}
	}
	Ok(devices)
}

fn new_message_id() -> String {
	format!("uuid:{}", Uuid::new_v4())
}

fn probe_message(message_id: &str) -> String {
	format!(concat!(
		r#"<?xml version="1.0" encoding="UTF-8"?>"#,
		r#"<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope""#,
		r#" xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing""#,
		r#" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery""#,
		r#" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">"#,
		r#"<e:Header>"#,
		r#"<w:MessageID>{}</w:MessageID>"#,
		r#"<w:To e:mustUnderstand="true">urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To>"#,
		r#"<w:Action e:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action>"#,
		r#"</e:Header>"#,
		r#"<e:Body><d:Probe><d:Types>dn:NetworkVideoTransmitter</d:Types></d:Probe></e:Body>"#,
		r#"</e:Envelope>"#,
	), message_id)
}

fn children(element: &Element) -> impl Iterator<Item = &Element> {
	element.children.iter().filter_map(|node| match node {
		XMLNode::Element(elem) => Some(elem),
		_ => None,
	})
}

/// First child whose local name is `local`, whatever its namespace prefix.
fn child<'a>(element: &'a Element, local: &str) -> Option<&'a Element> {
	children(element).find(|elem| elem.name == local)
}

fn child_text(element: &Element, local: &str) -> Option<String> {
	child(element, local)
		.and_then(|elem| elem.get_text())
		.map(|text| text.trim().to_string())
}

fn split_list(text: Option<String>) -> Vec<String> {
	text.map(|t| t.split_whitespace().map(str::to_string).collect()).unwrap_or_default()
}

/// A device from a ProbeMatches reply to `message_id`. Replies that answer some
/// other probe, do not parse, or carry no endpoint reference, yield `None`.
pub fn parse_probe_match(xml: &str, message_id: &str) -> Option<FoundDevice> {
	let envelope = match Element::parse(xml.as_bytes()) {
		Ok(envelope) => envelope,
		Err(err) => {
			debug!("Discovery reply is not XML; error was {}", err);
			return None;
		},
	};
	if let Some(relates_to) = child(&envelope, "Header").and_then(|header| child_text(header, "RelatesTo")) {
		if relates_to != message_id {
			return None;
		}
	}

	let probe_match = child(&envelope, "Body")
		.and_then(|body| child(body, "ProbeMatches"))
		.and_then(|matches| child(matches, "ProbeMatch"))?;
	let epr = child(probe_match, "EndpointReference")
		.and_then(|reference| child_text(reference, "Address"))
		.filter(|address| !address.is_empty())?;
	let xaddrs = split_list(child_text(probe_match, "XAddrs"));
	let scopes = split_list(child_text(probe_match, "Scopes"));
	let address = xaddrs.first().cloned().unwrap_or_default();

	Some(FoundDevice { epr, xaddrs, scopes, address })
}

/// Adds a camera for every device whose host is not already known. Returns how many were added.
pub fn merge_discovered(config: &mut AppConfig, devices: &[FoundDevice]) -> usize {
	let mut added = 0;
	for device in devices {
		let host = device.host();
		if host.is_empty() {
			continue;
		}
		if config.cameras.iter().any(|c| c.host == host || c.name == host) {
			continue;
		}
		let mut camera = Camera::new(host.clone(), host);
		if !device.address.is_empty() {
			camera.onvif_xaddr = Some(device.address.clone());
		}
		config.cameras.push(camera);
		added += 1;
	}
	added
}
