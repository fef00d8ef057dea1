use anyhow::{Context, Result};
use canvas_derive::context;
use flate2::Compression;
use flate2::bufread::{GzDecoder, GzEncoder};
use std::io::Read;

/// Compresses `data` with gzip at `level` (1-9; values outside that range are
/// clamped). This is the only compression format the stroke store uses —
/// every persisted tile row payload passes through here exactly once, at
/// ingest time.
///
/// # Errors
///
/// Returns an error if the gzip encoder fails while draining its output.
#[context("compressing payload with gzip level {level}")]
pub fn compress_gzip(data: &[u8], level: u32) -> Result<Vec<u8>> {
	let level = level.clamp(1, 9);
	let mut encoder = GzEncoder::new(data, Compression::new(level));
	let mut out = Vec::new();
	encoder.read_to_end(&mut out).context("failed to compress payload")?;
	Ok(out)
}

/// Decompresses a gzip payload produced by [`compress_gzip`].
///
/// # Errors
///
/// Returns an error if `data` is not valid gzip.
#[context("decompressing gzip payload")]
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
	let mut decoder = GzDecoder::new(data);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out).context("failed to decompress payload")?;
	Ok(out)
}
