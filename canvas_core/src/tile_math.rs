use crate::constants::TILE_SIZE;

/// A tile address at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCoord {
	pub tx: i64,
	pub ty: i64,
}

impl TileCoord {
	pub fn new(tx: i64, ty: i64) -> Self {
		Self { tx, ty }
	}
}

/// Computes every tile a stroke's inflated bounding box touches.
///
/// The box is inflated by `clamp(size, 1, 128) * 2` on every side to account
/// for brush radius and line-join overshoot, then converted to an inclusive
/// tile range. The `-1` on the upper edge excludes tiles the inflated box
/// only grazes on its exclusive boundary.
///
/// Returns an empty vector if `points` is empty or every point is non-finite.
pub fn tiles_touched(points: &[(f64, f64)], size: f64) -> Vec<TileCoord> {
	let mut min_x = f64::INFINITY;
	let mut min_y = f64::INFINITY;
	let mut max_x = f64::NEG_INFINITY;
	let mut max_y = f64::NEG_INFINITY;
	let mut any = false;

	for &(x, y) in points {
		if !x.is_finite() || !y.is_finite() {
			continue;
		}
		any = true;
		min_x = min_x.min(x);
		min_y = min_y.min(y);
		max_x = max_x.max(x);
		max_y = max_y.max(y);
	}

	if !any {
		return Vec::new();
	}

	let pad = size.clamp(1.0, 128.0) * 2.0;
	let min_x = min_x - pad;
	let min_y = min_y - pad;
	let max_x = max_x + pad;
	let max_y = max_y + pad;

	let tx0 = (min_x / TILE_SIZE as f64).floor() as i64;
	let ty0 = (min_y / TILE_SIZE as f64).floor() as i64;
	let tx1 = ((max_x - 1.0) / TILE_SIZE as f64).floor() as i64;
	let ty1 = ((max_y - 1.0) / TILE_SIZE as f64).floor() as i64;

	let mut tiles = Vec::with_capacity(((tx1 - tx0 + 1) * (ty1 - ty0 + 1)).max(0) as usize);
	for ty in ty0..=ty1 {
		for tx in tx0..=tx1 {
			tiles.push(TileCoord::new(tx, ty));
		}
	}
	tiles
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	#[test]
	fn empty_points_yield_no_tiles() {
		assert!(tiles_touched(&[], 6.0).is_empty());
	}

	#[test]
	fn non_finite_points_are_ignored() {
		assert!(tiles_touched(&[(f64::NAN, f64::NAN), (f64::INFINITY, 0.0)], 6.0).is_empty());
	}

	#[test]
	fn single_point_produces_one_tile() {
		let tiles = tiles_touched(&[(10.0, 10.0)], 6.0);
		assert_eq!(tiles, vec![TileCoord::new(0, 0)]);
	}

	#[rstest]
	#[case(vec![(10.0, 10.0), (100.0, 10.0)], 6.0, vec![(0, 0)])]
	#[case(vec![(1020.0, 50.0), (1030.0, 50.0)], 6.0, vec![(0, 0), (1, 0)])]
	fn known_footprints(#[case] points: Vec<(f64, f64)>, #[case] size: f64, #[case] expected: Vec<(i64, i64)>) {
		let tiles = tiles_touched(&points, size);
		let expected: Vec<TileCoord> = expected.into_iter().map(|(tx, ty)| TileCoord::new(tx, ty)).collect();
		assert_eq!(tiles, expected);
	}

	#[test]
	fn size_is_clamped_before_padding() {
		let huge = tiles_touched(&[(0.0, 0.0)], 10_000.0);
		let clamped = tiles_touched(&[(0.0, 0.0)], 128.0);
		assert_eq!(huge, clamped);
	}
}
