use anyhow::Result;
use canvas_derive::context;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use r2d2_sqlite::rusqlite::params;
use std::path::Path;

/// A single persisted tile row: one replica of a stroke in one tile.
#[derive(Debug, Clone)]
pub struct TileRow {
	pub z: i32,
	pub tx: i64,
	pub ty: i64,
	pub t: i64,
	pub id: String,
	/// Canonical stroke JSON, gzip-compressed.
	pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
	pub total_bytes: i64,
	pub row_count: i64,
}

/// SQLite-backed store for tile rows.
///
/// Reads go through a pool of connections; writes and eviction go through a
/// single dedicated connection behind a mutex, so `insert_many` and
/// `evict_oldest` can never interleave with each other — the single-writer
/// discipline the ingest coordinator relies on.
pub struct TileStore {
	reader_pool: Pool<SqliteConnectionManager>,
	writer: Mutex<r2d2::PooledConnection<SqliteConnectionManager>>,
}

impl TileStore {
	/// Opens (creating if necessary) a tile store at `path`.
	///
	/// # Errors
	/// Returns an error if the SQLite file can't be created/opened or the
	/// schema can't be applied.
	#[context("opening tile store at {path:?}")]
	pub fn open(path: &Path) -> Result<Self> {
		let manager = SqliteConnectionManager::file(path);
		let reader_pool = Pool::builder().max_size(8).build(manager.clone())?;
		let writer_pool = Pool::builder().max_size(1).build(manager)?;
		let writer = writer_pool.get()?;

		writer.execute_batch(
			"PRAGMA journal_mode = WAL;
			CREATE TABLE IF NOT EXISTS tiles (
				rowid INTEGER PRIMARY KEY AUTOINCREMENT,
				z INTEGER NOT NULL,
				tx INTEGER NOT NULL,
				ty INTEGER NOT NULL,
				t INTEGER NOT NULL,
				id TEXT NOT NULL,
				payload BLOB NOT NULL
			);
			CREATE INDEX IF NOT EXISTS idx_tile_scan ON tiles (z, tx, ty, t);
			CREATE INDEX IF NOT EXISTS idx_tile_age ON tiles (t, rowid);",
		)?;

		Ok(Self {
			reader_pool,
			writer: Mutex::new(writer),
		})
	}

	/// Appends `rows` in a single transaction. Either all rows land or none
	/// do — satisfies the atomic-fan-out invariant for a stroke's tile set.
	///
	/// # Errors
	/// Returns an error if the transaction fails to commit.
	#[context("inserting {} tile rows", rows.len())]
	pub fn insert_many(&self, rows: &[TileRow]) -> Result<()> {
		if rows.is_empty() {
			return Ok(());
		}
		let mut conn = self.writer.lock();
		let transaction = conn.transaction()?;
		for row in rows {
			transaction.execute(
				"INSERT INTO tiles (z, tx, ty, t, id, payload) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
				params![row.z, row.tx, row.ty, row.t, row.id, row.payload],
			)?;
		}
		transaction.commit()?;
		Ok(())
	}

	/// Returns every row for `(z, tx, ty)`, ordered by `t` ascending (ties
	/// broken by insertion order).
	#[context("scanning tile ({z}, {tx}, {ty})")]
	pub fn scan(&self, z: i32, tx: i64, ty: i64) -> Result<Vec<TileRow>> {
		self.scan_since(z, tx, ty, i64::MIN)
	}

	/// Like [`scan`](Self::scan), but only rows with `t > since`.
	#[context("scanning tile ({z}, {tx}, {ty}) since {since}")]
	pub fn scan_since(&self, z: i32, tx: i64, ty: i64, since: i64) -> Result<Vec<TileRow>> {
		let conn = self.reader_pool.get()?;
		let mut stmt = conn.prepare(
			"SELECT z, tx, ty, t, id, payload FROM tiles
			 WHERE z = ?1 AND tx = ?2 AND ty = ?3 AND t > ?4
			 ORDER BY t ASC, rowid ASC",
		)?;
		let rows = stmt
			.query_map(params![z, tx, ty, since], |row| {
				Ok(TileRow {
					z: row.get(0)?,
					tx: row.get(1)?,
					ty: row.get(2)?,
					t: row.get(3)?,
					id: row.get(4)?,
					payload: row.get(5)?,
				})
			})?
			.collect::<std::result::Result<Vec<_>, _>>()?;
		Ok(rows)
	}

	/// Total bytes occupied by stored payloads and the total row count.
	#[context("computing store stats")]
	pub fn stats(&self) -> Result<StoreStats> {
		let conn = self.reader_pool.get()?;
		let (total_bytes, row_count) = conn.query_row(
			"SELECT COALESCE(SUM(LENGTH(payload)), 0), COUNT(*) FROM tiles",
			[],
			|row| Ok((row.get(0)?, row.get(1)?)),
		)?;
		Ok(StoreStats { total_bytes, row_count })
	}

	/// Deletes the `n` rows with globally smallest `(t, rowid)` — the
	/// age-based eviction policy from the size-bound design.
	///
	/// # Errors
	/// Returns an error if the delete fails.
	#[context("evicting {n} oldest rows")]
	pub fn evict_oldest(&self, n: i64) -> Result<u64> {
		if n <= 0 {
			return Ok(0);
		}
		let conn = self.writer.lock();
		let deleted = conn.execute(
			"DELETE FROM tiles WHERE rowid IN (
				SELECT rowid FROM tiles ORDER BY t ASC, rowid ASC LIMIT ?1
			)",
			params![n],
		)?;
		Ok(deleted as u64)
	}

	/// Reclaims space freed by eviction. A no-op beyond `VACUUM`; WAL mode
	/// means this can run concurrently with readers.
	#[context("compacting tile store")]
	pub fn compact(&self) -> Result<()> {
		let conn = self.writer.lock();
		conn.execute_batch("VACUUM;")?;
		Ok(())
	}
}
