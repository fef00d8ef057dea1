//! Process configuration: a flat set of env-overridable CLI flags.
//!
//! There is no config-file surface here — every setting is either a CLI flag
//! or its environment-variable override, so `clap::Parser` with
//! `#[arg(env = ...)]` is the whole story.

use canvas_store::IngestCoordinator;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

/// Default gzip level applied to persisted stroke payloads.
pub const DEFAULT_GZIP_LEVEL: u32 = 9;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Cap on the number of tiles a single HTTP batch request may name.
pub const MAX_BATCH_HTTP: usize = 500;

/// Cap on the number of tiles a single streamed `tilesRequest` may name.
pub const MAX_BATCH_WS: usize = 1000;

/// How many alternate high ports to try if the configured port is taken.
const BIND_RETRY_ATTEMPTS: u32 = 10;

/// First port in the ephemeral-style range used for bind retries.
const BIND_RETRY_PORT_BASE: u16 = 49_152;

#[derive(Parser, Debug, Clone)]
#[command(
	author,
	version,
	about = "Realtime tile-indexed stroke store and relay for a collaborative infinite canvas.",
	long_about = None,
)]
pub struct CanvasArgs {
	/// Listen port.
	#[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
	pub port: u16,

	/// Base directory for the persisted tile store.
	#[arg(long, env = "DATA_DIR", default_value = ".")]
	pub data_dir: PathBuf,

	/// Gzip level (1-9) applied to persisted stroke payloads.
	#[arg(long, env = "DB_GZIP_LEVEL", default_value_t = DEFAULT_GZIP_LEVEL)]
	pub db_gzip_level: u32,

	/// Storage size ceiling, in bytes, before eviction triggers.
	#[arg(long, env = "MAX_STORE_BYTES", default_value_t = canvas_store::DEFAULT_MAX_STORE_BYTES)]
	pub max_store_bytes: i64,

	#[command(flatten)]
	pub verbose: Verbosity<InfoLevel>,
}

impl CanvasArgs {
	pub fn store_path(&self) -> PathBuf {
		self.data_dir.join("tiles.sqlite")
	}
}

/// How many times to retry binding on an alternate high port after the
/// configured port fails, and the base of that port range. Exposed as
/// constants so `server::CanvasServer::bind_with_retry` and its tests share
/// one source of truth.
pub fn bind_retry_plan() -> (u32, u16) {
	(BIND_RETRY_ATTEMPTS, BIND_RETRY_PORT_BASE)
}

/// Everything the HTTP/WS layer needs to serve requests, built once in
/// `main` from [`CanvasArgs`] and shared by `Arc` from there down — no
/// global/lazily-initialized singleton, config is threaded explicitly.
pub struct AppConfig {
	pub max_store_bytes: i64,
}

impl AppConfig {
	pub fn from_args(args: &CanvasArgs) -> Self {
		Self {
			max_store_bytes: args.max_store_bytes,
		}
	}
}

pub fn build_coordinator(args: &CanvasArgs) -> anyhow::Result<IngestCoordinator> {
	let store = canvas_store::TileStore::open(&args.store_path())?;
	Ok(IngestCoordinator::new(store, args.db_gzip_level, args.max_store_bytes))
}
