//! HTTP surface: a subset of the channel protocol for clients without a
//! live duplex connection, plus the `/api/db-status` and `/api/ping`
//! housekeeping endpoints.

use crate::config::MAX_BATCH_HTTP;
use crate::server::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use canvas_core::{Stroke, canonicalize};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

pub async fn ping() -> Json<Value> {
	Json(json!({"ok": true}))
}

#[derive(Debug, Deserialize)]
pub struct TileStrokesParams {
	pub z: i32,
	pub tx: f64,
	pub ty: f64,
	pub since: Option<i64>,
}

pub async fn tile_strokes(State(state): State<AppState>, Query(params): Query<TileStrokesParams>) -> Result<Json<Value>, StatusCode> {
	if !params.tx.is_finite() || !params.ty.is_finite() {
		return Err(StatusCode::BAD_REQUEST);
	}
	let tx = params.tx as i64;
	let ty = params.ty as i64;
	let strokes = state
		.query
		.query_tile(params.z, tx, ty, params.since)
		.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(Json(json!({"z": params.z, "tx": tx, "ty": ty, "strokes": strokes})))
}

#[derive(Debug, Deserialize)]
pub struct TileCoordParam {
	pub tx: f64,
	pub ty: f64,
}

#[derive(Debug, Deserialize)]
pub struct TileStrokesBatchBody {
	pub z: i32,
	pub tiles: Vec<TileCoordParam>,
}

#[derive(Debug, Serialize)]
struct BatchTileResult {
	z: i32,
	tx: i64,
	ty: i64,
	strokes: Vec<Stroke>,
}

pub async fn tile_strokes_batch(State(state): State<AppState>, Json(body): Json<TileStrokesBatchBody>) -> Result<Json<Value>, StatusCode> {
	if body.tiles.len() > MAX_BATCH_HTTP {
		return Err(StatusCode::BAD_REQUEST);
	}

	let valid_tiles: Vec<(i64, i64)> = body
		.tiles
		.iter()
		.filter(|t| t.tx.is_finite() && t.ty.is_finite())
		.map(|t| (t.tx as i64, t.ty as i64))
		.collect();

	let results = state.query.query_batch(body.z, &valid_tiles).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

	let tiles: Vec<BatchTileResult> = results
		.into_iter()
		.map(|r| BatchTileResult {
			z: r.z,
			tx: r.tx,
			ty: r.ty,
			strokes: r.strokes,
		})
		.collect();

	Ok(Json(json!({"tiles": tiles})))
}

#[derive(Debug, Serialize)]
struct StrokePostResponse {
	ok: bool,
	id: String,
	t: i64,
}

pub async fn post_stroke(State(state): State<AppState>, Json(raw): Json<canvas_core::RawStroke>) -> Result<Json<StrokePostResponse>, StatusCode> {
	let now = crate::now_ms();
	let stroke = canonicalize(raw, now, || Uuid::new_v4().to_string());
	let id = stroke.id.clone();
	let t = stroke.t;

	// Per spec §4.4 step 5, only strokes that originated on a peer channel are
	// relayed. This endpoint has no originating session, so it persists but
	// never broadcasts — WS peers only ever see strokes from other WS peers.
	state.coordinator.ingest(stroke).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

	Ok(Json(StrokePostResponse { ok: true, id, t }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DbStatusResponse {
	size_bytes: i64,
	#[serde(rename = "sizeMB")]
	size_mb: f64,
	max_size_bytes: i64,
	#[serde(rename = "maxSizeMB")]
	max_size_mb: f64,
	stroke_count: i64,
	utilization_percent: f64,
}

pub async fn db_status(State(state): State<AppState>) -> Result<Json<DbStatusResponse>, StatusCode> {
	let stats = state.coordinator.store().stats().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	let max_bytes = state.config.max_store_bytes;
	let utilization = if max_bytes > 0 { (stats.total_bytes as f64 / max_bytes as f64) * 100.0 } else { 0.0 };

	Ok(Json(DbStatusResponse {
		size_bytes: stats.total_bytes,
		size_mb: stats.total_bytes as f64 / (1024.0 * 1024.0),
		max_size_bytes: max_bytes,
		max_size_mb: max_bytes as f64 / (1024.0 * 1024.0),
		stroke_count: stats.row_count,
		utilization_percent: utilization,
	}))
}
