//! Pure types and algorithms shared by the stroke store and the server:
//! tile math, stroke canonicalization, and the gzip payload codec.

mod compression;
mod constants;
mod stroke;
mod tile_math;

pub use compression::{compress_gzip, decompress_gzip};
pub use constants::TILE_SIZE;
pub use stroke::{Point, RawPoint, RawStroke, Stroke, canonicalize};
pub use tile_math::{TileCoord, tiles_touched};
