//! Tile Query Service: single-tile, batch, and streamed history
//! delivery, all backed by the same [`TileStore`] scan and sharing one
//! decompress-and-skip-on-failure path.

use canvas_core::{Stroke, decompress_gzip};
use canvas_store::{IngestCoordinator, TileRow};
use log::warn;
use std::sync::Arc;

#[derive(Clone)]
pub struct TileQueryService {
	coordinator: Arc<IngestCoordinator>,
}

/// One tile's worth of history, as returned to both the HTTP batch endpoint
/// and the streamed `tileData` frame.
pub struct TileResult {
	pub z: i32,
	pub tx: i64,
	pub ty: i64,
	pub strokes: Vec<Stroke>,
}

impl TileQueryService {
	pub fn new(coordinator: Arc<IngestCoordinator>) -> Self {
		Self { coordinator }
	}

	/// Strokes for a single tile, optionally filtered to `t > since`.
	pub fn query_tile(&self, z: i32, tx: i64, ty: i64, since: Option<i64>) -> anyhow::Result<Vec<Stroke>> {
		let rows = match since {
			Some(since) => self.coordinator.store().scan_since(z, tx, ty, since)?,
			None => self.coordinator.store().scan(z, tx, ty)?,
		};
		Ok(decode_rows(rows))
	}

	/// Strokes for a list of tiles, in request order. Invalid/non-finite
	/// entries have already been filtered out by the caller (HTTP layer or
	/// WS handler) before this is invoked — this just scans what it's given.
	pub fn query_batch(&self, z: i32, tiles: &[(i64, i64)]) -> anyhow::Result<Vec<TileResult>> {
		tiles
			.iter()
			.map(|&(tx, ty)| {
				let strokes = self.query_tile(z, tx, ty, None)?;
				Ok(TileResult { z, tx, ty, strokes })
			})
			.collect()
	}
}

/// Decompresses and decodes each row, skipping (with a warning) any row
/// whose payload fails to decompress or parse rather than failing the
/// whole scan — a single corrupt row must not take down a tile's history.
fn decode_rows(rows: Vec<TileRow>) -> Vec<Stroke> {
	rows.into_iter()
		.filter_map(|row| match decode_row(&row) {
			Ok(stroke) => Some(stroke),
			Err(err) => {
				warn!("skipping unreadable tile row (z={}, tx={}, ty={}, id={}): {err:#}", row.z, row.tx, row.ty, row.id);
				None
			}
		})
		.collect()
}

fn decode_row(row: &TileRow) -> anyhow::Result<Stroke> {
	let json = decompress_gzip(&row.payload)?;
	Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use canvas_core::Point;
	use canvas_store::TileStore;
	use tempfile::NamedTempFile;

	fn coordinator() -> (Arc<IngestCoordinator>, NamedTempFile) {
		let file = NamedTempFile::new().unwrap();
		let store = TileStore::open(file.path()).unwrap();
		(Arc::new(IngestCoordinator::new(store, 6, canvas_store::DEFAULT_MAX_STORE_BYTES)), file)
	}

	fn stroke(id: &str) -> Stroke {
		Stroke {
			id: id.to_string(),
			user_id: String::new(),
			color: "#000".to_string(),
			size: 6.0,
			opacity: 1.0,
			erase: false,
			points: vec![Point { x: 10.0, y: 10.0, p: 0.0 }],
			z: 0,
			t: 1,
		}
	}

	#[test]
	fn query_tile_round_trips_ingested_stroke() -> anyhow::Result<()> {
		let (coordinator, _file) = coordinator();
		coordinator.ingest(stroke("s1"))?;
		let query = TileQueryService::new(coordinator);
		let strokes = query.query_tile(0, 0, 0, None)?;
		assert_eq!(strokes.len(), 1);
		assert_eq!(strokes[0].id, "s1");
		Ok(())
	}

	#[test]
	fn query_batch_preserves_request_order() -> anyhow::Result<()> {
		let (coordinator, _file) = coordinator();
		coordinator.ingest(stroke("s1"))?;
		let query = TileQueryService::new(coordinator);
		let results = query.query_batch(0, &[(5, 5), (0, 0)])?;
		assert_eq!(results.len(), 2);
		assert!(results[0].strokes.is_empty());
		assert_eq!(results[1].strokes.len(), 1);
		Ok(())
	}
}
