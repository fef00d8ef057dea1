use crate::constants::{MAX_STROKE_SIZE, MIN_STROKE_SIZE};
use serde::{Deserialize, Serialize};

/// A single point along a stroke's path, in world pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub x: f64,
	pub y: f64,
	#[serde(default)]
	pub p: f64,
}

/// The canonical, persisted shape of a stroke. Produced only by
/// [`canonicalize`]; every field here has already been clamped and
/// defaulted, so downstream code never has to re-validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
	pub id: String,
	#[serde(default)]
	pub user_id: String,
	pub color: String,
	pub size: f64,
	pub opacity: f64,
	#[serde(default)]
	pub erase: bool,
	pub points: Vec<Point>,
	#[serde(default)]
	pub z: i32,
	pub t: i64,
}

/// The loosely-typed shape a stroke arrives in, either from an HTTP body or
/// from the object-framed side of the channel protocol. Any field may be
/// missing or out of range; [`canonicalize`] is the only place that enforces
/// the invariants [`Stroke`] promises.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStroke {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub color: Option<String>,
	#[serde(default)]
	pub size: Option<f64>,
	#[serde(default)]
	pub opacity: Option<f64>,
	#[serde(default)]
	pub erase: Option<bool>,
	#[serde(default)]
	pub points: Vec<RawPoint>,
	#[serde(default)]
	pub z: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPoint {
	pub x: f64,
	pub y: f64,
	#[serde(default)]
	pub p: Option<f64>,
}

/// Canonicalizes a raw stroke: clamps `size`/`opacity`, drops non-finite
/// points, mints an id when the caller didn't supply one, and stamps `t`
/// with the server's own clock. `t` is always server-assigned — a client
/// value, if present upstream, was already discarded by [`RawStroke`] not
/// having a `t` field.
pub fn canonicalize(raw: RawStroke, now_ms: i64, mint_id: impl FnOnce() -> String) -> Stroke {
	let points = raw
		.points
		.into_iter()
		.filter(|p| p.x.is_finite() && p.y.is_finite())
		.map(|p| Point {
			x: p.x,
			y: p.y,
			p: p.p.filter(|v| v.is_finite()).unwrap_or(0.0),
		})
		.collect();

	let id = raw.id.filter(|s| !s.is_empty()).unwrap_or_else(mint_id);

	Stroke {
		id,
		user_id: raw.user_id.unwrap_or_default(),
		color: raw.color.unwrap_or_default(),
		size: raw.size.filter(|v| v.is_finite()).unwrap_or(12.0).clamp(MIN_STROKE_SIZE, MAX_STROKE_SIZE),
		opacity: raw.opacity.filter(|v| v.is_finite()).unwrap_or(1.0).clamp(0.0, 1.0),
		erase: raw.erase.unwrap_or(false),
		points,
		z: raw.z.unwrap_or(0),
		t: now_ms,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn fixed_id() -> String {
		"minted-id".to_string()
	}

	#[test]
	fn mints_id_when_missing() {
		let raw = RawStroke {
			points: vec![RawPoint { x: 1.0, y: 2.0, p: None }],
			..Default::default()
		};
		let stroke = canonicalize(raw, 1000, fixed_id);
		assert_eq!(stroke.id, "minted-id");
		assert_eq!(stroke.t, 1000);
	}

	#[test]
	fn keeps_supplied_id() {
		let raw = RawStroke {
			id: Some("s1".to_string()),
			points: vec![RawPoint { x: 0.0, y: 0.0, p: None }],
			..Default::default()
		};
		let stroke = canonicalize(raw, 1, fixed_id);
		assert_eq!(stroke.id, "s1");
	}

	#[test]
	fn clamps_size_and_opacity() {
		let raw = RawStroke {
			size: Some(9999.0),
			opacity: Some(-5.0),
			points: vec![RawPoint { x: 0.0, y: 0.0, p: None }],
			..Default::default()
		};
		let stroke = canonicalize(raw, 1, fixed_id);
		assert_eq!(stroke.size, 128.0);
		assert_eq!(stroke.opacity, 0.0);
	}

	#[test]
	fn drops_non_finite_points_and_defaults_pressure() {
		let raw = RawStroke {
			points: vec![
				RawPoint { x: f64::NAN, y: 0.0, p: None },
				RawPoint { x: 1.0, y: 2.0, p: Some(f64::INFINITY) },
				RawPoint { x: 3.0, y: 4.0, p: Some(0.5) },
			],
			..Default::default()
		};
		let stroke = canonicalize(raw, 1, fixed_id);
		assert_eq!(
			stroke.points,
			vec![Point { x: 1.0, y: 2.0, p: 0.0 }, Point { x: 3.0, y: 4.0, p: 0.5 }]
		);
	}

	#[test]
	fn defaults_size_when_missing() {
		let raw = RawStroke {
			points: vec![RawPoint { x: 0.0, y: 0.0, p: None }],
			..Default::default()
		};
		let stroke = canonicalize(raw, 1, fixed_id);
		assert_eq!(stroke.size, 12.0);
		assert_eq!(stroke.opacity, 1.0);
	}
}
