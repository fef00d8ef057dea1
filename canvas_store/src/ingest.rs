use crate::store::{StoreStats, TileRow, TileStore};
use anyhow::Result;
use canvas_core::{Stroke, TileCoord, compress_gzip, tiles_touched};
use canvas_derive::context;
use log::warn;

/// Default ceiling on total store size before eviction kicks in (1 GiB).
pub const DEFAULT_MAX_STORE_BYTES: i64 = 1024 * 1024 * 1024;

/// The result of accepting one stroke: the canonical stroke itself plus the
/// tiles it was fanned out to. Callers (the HTTP/WS layer) use `tiles` only
/// for observability and `stroke` to decide what to relay.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
	pub stroke: Stroke,
	pub tiles: Vec<TileCoord>,
}

/// Single-writer pipeline in front of [`TileStore`]: computes a stroke's tile
/// footprint, enforces the size policy, compresses the payload once, and
/// commits every tile replica in one transaction.
pub struct IngestCoordinator {
	store: TileStore,
	gzip_level: u32,
	max_store_bytes: i64,
}

impl IngestCoordinator {
	pub fn new(store: TileStore, gzip_level: u32, max_store_bytes: i64) -> Self {
		Self {
			store,
			gzip_level,
			max_store_bytes,
		}
	}

	pub fn store(&self) -> &TileStore {
		&self.store
	}

	/// Accepts a canonicalized stroke: computes its tile footprint, evicts if
	/// the store has grown past its size ceiling, compresses the payload
	/// once, and commits all tile replicas atomically.
	///
	/// Returns an empty `tiles` list (and performs no writes) if the stroke
	/// has no finite points — such a stroke is not relayed either.
	#[context("ingesting stroke {}", stroke.id)]
	pub fn ingest(&self, stroke: Stroke) -> Result<IngestOutcome> {
		let points: Vec<(f64, f64)> = stroke.points.iter().map(|p| (p.x, p.y)).collect();
		let tiles = tiles_touched(&points, stroke.size);
		if tiles.is_empty() {
			return Ok(IngestOutcome { stroke, tiles });
		}

		self.apply_size_policy()?;

		let json = serde_json::to_vec(&stroke)?;
		let payload = compress_gzip(&json, self.gzip_level)?;

		let rows: Vec<TileRow> = tiles
			.iter()
			.map(|tile| TileRow {
				z: stroke.z,
				tx: tile.tx,
				ty: tile.ty,
				t: stroke.t,
				id: stroke.id.clone(),
				payload: payload.clone(),
			})
			.collect();

		self.store.insert_many(&rows)?;

		Ok(IngestOutcome { stroke, tiles })
	}

	/// Evicts the oldest 10% of rows, then compacts, whenever the store has
	/// reached or exceeded its configured byte ceiling.
	fn apply_size_policy(&self) -> Result<()> {
		let StoreStats { total_bytes, row_count } = self.store.stats()?;
		if total_bytes < self.max_store_bytes || row_count == 0 {
			return Ok(());
		}
		let to_evict = (row_count as f64 * 0.1).ceil() as i64;
		let to_evict = to_evict.max(1);
		match self.store.evict_oldest(to_evict) {
			Ok(deleted) => {
				if let Err(err) = self.store.compact() {
					warn!("tile store compaction failed after evicting {deleted} rows: {err:#}");
				}
			}
			Err(err) => warn!("tile store eviction failed: {err:#}"),
		}
		Ok(())
	}
}
