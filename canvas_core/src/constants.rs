/// Side length, in world pixels, of a single tile at zoom 0.
pub const TILE_SIZE: i64 = 1024;

/// Brush size is clamped to this range before tile math or persistence.
pub const MIN_STROKE_SIZE: f64 = 1.0;
pub const MAX_STROKE_SIZE: f64 = 128.0;
