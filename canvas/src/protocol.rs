//! Channel Protocol: object framing and compact-array framing over the
//! same logical opcode set, plus role gating.
//!
//! Inbound frames may arrive in either framing; this module decodes both
//! into one [`ClientFrame`] enum. Outbound frames are always encoded in the
//! compact array form: a single fixed encoding keeps the high-rate paths
//! (`stroke`, `tileData`) and the low-rate ones consistent rather than
//! choosing per message.

use canvas_core::{RawPoint, RawStroke, Stroke};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Peer,
	Tiles,
}

/// A stroke in the wire shape carried by opcode 2 (`stroke`) and the
/// stroke-compact entries of opcode 4 (`tileData`): `pointsFlat` drops
/// pressure, unlike the persisted/object-framed [`Stroke`]. A peer that only
/// ever talks compact frames never round-trips pressure; it defaults to 0
/// on read-back, same as [`canvas_core::canonicalize`] does for any other
/// missing pressure value.
#[derive(Debug, Clone, PartialEq)]
pub struct WireStroke {
	pub id: String,
	pub user_id: String,
	pub color: String,
	pub size: f64,
	pub opacity: f64,
	pub erase: bool,
	pub points_flat: Vec<f64>,
}

impl WireStroke {
	pub fn from_stroke(stroke: &Stroke) -> Self {
		Self {
			id: stroke.id.clone(),
			user_id: stroke.user_id.clone(),
			color: stroke.color.clone(),
			size: stroke.size,
			opacity: stroke.opacity,
			erase: stroke.erase,
			points_flat: stroke.points.iter().flat_map(|p| [p.x, p.y]).collect(),
		}
	}

	pub fn into_raw_stroke(self) -> RawStroke {
		let points = self
			.points_flat
			.chunks_exact(2)
			.map(|pair| RawPoint {
				x: pair[0],
				y: pair[1],
				p: None,
			})
			.collect();
		RawStroke {
			id: Some(self.id),
			user_id: Some(self.user_id),
			color: Some(self.color),
			size: Some(self.size),
			opacity: Some(self.opacity),
			erase: Some(self.erase),
			points,
			z: None,
		}
	}

	fn to_array(&self) -> Value {
		json!([
			self.id,
			self.user_id,
			self.color,
			self.size,
			self.opacity,
			if self.erase { 1 } else { 0 },
			self.points_flat,
		])
	}

	fn from_array(arr: &[Value]) -> Option<Self> {
		Some(Self {
			id: as_string(arr.first())?,
			user_id: as_string(arr.get(1)).unwrap_or_default(),
			color: as_string(arr.get(2)).unwrap_or_default(),
			size: as_f64(arr.get(3)).unwrap_or(12.0),
			opacity: as_f64(arr.get(4)).unwrap_or(1.0),
			erase: as_f64(arr.get(5)).unwrap_or(0.0) != 0.0,
			points_flat: arr
				.get(6)
				.and_then(Value::as_array)
				.map(|vals| vals.iter().filter_map(Value::as_f64).collect())
				.unwrap_or_default(),
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PresencePayload {
	#[serde(default)]
	x: Option<f64>,
	#[serde(default)]
	y: Option<f64>,
	#[serde(default)]
	color: Option<String>,
	#[serde(default)]
	name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentifyPayload {
	role: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct TilesRequestPayload {
	#[serde(alias = "reqId")]
	req_id: Value,
	z: i32,
	tiles: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectFrame {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	payload: Value,
}

/// One decoded inbound frame, framing-agnostic.
#[derive(Debug, Clone)]
pub enum ClientFrame {
	Identify { role: Role },
	Presence { x: Option<f64>, y: Option<f64>, color: Option<String>, name: Option<String> },
	Stroke(RawStroke),
	TilesRequest { req_id: Value, z: i32, tiles: Vec<(i64, i64)> },
}

/// Parses one text frame. Returns `None` for anything malformed,
/// non-object/non-array, or carrying an unknown opcode/type — callers drop
/// those silently per the protocol's "never close the channel" rule.
pub fn parse_client_frame(text: &str) -> Option<ClientFrame> {
	let value: Value = serde_json::from_str(text).ok()?;
	match value {
		Value::Array(arr) => parse_compact(&arr),
		Value::Object(_) => parse_object(value),
		_ => None,
	}
}

fn parse_compact(arr: &[Value]) -> Option<ClientFrame> {
	let op = arr.first()?.as_u64()?;
	let rest = &arr[1..];
	match op {
		0 => {
			let role = if as_f64(rest.first()).unwrap_or(0.0) == 1.0 { Role::Tiles } else { Role::Peer };
			Some(ClientFrame::Identify { role })
		}
		1 => Some(ClientFrame::Presence {
			x: as_f64(rest.first()),
			y: as_f64(rest.get(1)),
			color: as_string(rest.get(2)),
			name: as_string(rest.get(3)),
		}),
		2 => Some(ClientFrame::Stroke(WireStroke::from_array(rest)?.into_raw_stroke())),
		3 => {
			let req_id = rest.first().cloned().unwrap_or(Value::Null);
			let z = as_f64(rest.get(1)).unwrap_or(0.0) as i32;
			let tiles = rest
				.get(2)
				.and_then(Value::as_array)
				.map(|entries| entries.iter().filter_map(tile_pair).collect())
				.unwrap_or_default();
			Some(ClientFrame::TilesRequest { req_id, z, tiles })
		}
		_ => None,
	}
}

fn parse_object(value: Value) -> Option<ClientFrame> {
	let frame: ObjectFrame = serde_json::from_value(value).ok()?;
	match frame.kind.as_str() {
		"identify" => {
			let payload: IdentifyPayload = serde_json::from_value(frame.payload).ok()?;
			let role = match &payload.role {
				Value::Number(n) => n.as_f64() == Some(1.0),
				Value::String(s) => s == "tiles",
				_ => false,
			};
			Some(ClientFrame::Identify {
				role: if role { Role::Tiles } else { Role::Peer },
			})
		}
		"presence" => {
			let payload: PresencePayload = serde_json::from_value(frame.payload).unwrap_or_default();
			Some(ClientFrame::Presence {
				x: payload.x,
				y: payload.y,
				color: payload.color,
				name: payload.name,
			})
		}
		"stroke" => {
			let raw: RawStroke = serde_json::from_value(frame.payload).ok()?;
			Some(ClientFrame::Stroke(raw))
		}
		"tilesRequest" => {
			let payload: TilesRequestPayload = serde_json::from_value(frame.payload).ok()?;
			Some(ClientFrame::TilesRequest {
				req_id: payload.req_id,
				z: payload.z,
				tiles: payload.tiles,
			})
		}
		_ => None,
	}
}

fn tile_pair(value: &Value) -> Option<(i64, i64)> {
	let pair = value.as_array()?;
	let tx = pair.first()?.as_f64()?;
	let ty = pair.get(1)?.as_f64()?;
	if !tx.is_finite() || !ty.is_finite() {
		return None;
	}
	Some((tx as i64, ty as i64))
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
	value.and_then(Value::as_f64)
}

fn as_string(value: Option<&Value>) -> Option<String> {
	value.and_then(Value::as_str).map(str::to_owned)
}

/// Outbound frames, always encoded as compact arrays (see module docs).
#[derive(Debug, Clone)]
pub enum ServerFrame {
	Welcome { id: String, color: String, name: String, others: Vec<(String, f64, f64)> },
	Presence { id: String, x: f64, y: f64, color: String, name: String },
	Stroke(Stroke),
	TileData { req_id: Value, z: i32, tx: i64, ty: i64, strokes: Vec<Stroke> },
	TileBatchDone { req_id: Value },
	Leave { id: String },
}

impl ServerFrame {
	/// Encodes this frame as the compact-array wire text.
	pub fn encode(&self) -> String {
		let value = match self {
			ServerFrame::Welcome { id, color, name, others } => json!([
				5,
				id,
				color,
				name,
				others.iter().map(|(id, x, y)| json!([id, x, y])).collect::<Vec<_>>(),
			]),
			ServerFrame::Presence { id, x, y, color, name } => json!([1, id, x, y, color, name]),
			ServerFrame::Stroke(stroke) => {
				let wire = WireStroke::from_stroke(stroke);
				json!([2, wire.id, wire.user_id, wire.color, wire.size, wire.opacity, if wire.erase { 1 } else { 0 }, wire.points_flat])
			}
			ServerFrame::TileData { req_id, z, tx, ty, strokes } => {
				let compact: Vec<Value> = strokes.iter().map(|s| WireStroke::from_stroke(s).to_array()).collect();
				json!([4, req_id, z, tx, ty, compact])
			}
			ServerFrame::TileBatchDone { req_id } => json!([6, req_id]),
			ServerFrame::Leave { id } => json!([7, id]),
		};
		value.to_string()
	}
}
