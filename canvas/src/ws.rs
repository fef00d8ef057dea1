//! Duplex channel endpoint (`/ws`): opcode dispatch and role gating on top
//! of `protocol::parse_client_frame`, wired to the session registry, relay,
//! ingest coordinator, and tile query service.

use crate::config::MAX_BATCH_WS;
use crate::protocol::{ClientFrame, Role, ServerFrame, parse_client_frame};
use crate::server::AppState;
use crate::session::{default_cursor_color, default_display_name};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use canvas_core::canonicalize;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Local connection state. `role` is `None` until the peer identifies;
/// once set it never changes (role is immutable for the session).
enum ConnState {
	Unidentified,
	Peer { id: String },
	Tiles,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
	let (mut ws_tx, mut ws_rx) = socket.split();
	let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();

	let sender_task = tokio::spawn(async move {
		while let Some(frame) = out_rx.recv().await {
			if ws_tx.send(Message::Text(frame.encode().into())).await.is_err() {
				break;
			}
		}
	});

	let mut conn = ConnState::Unidentified;

	while let Some(msg) = ws_rx.next().await {
		let Ok(msg) = msg else { break };
		let Message::Text(text) = msg else {
			if matches!(msg, Message::Close(_)) {
				break;
			}
			continue;
		};
		let text: String = text.to_string();
		let Some(frame) = parse_client_frame(&text) else {
			debug!("dropping malformed/unknown ws frame");
			continue;
		};
		handle_frame(frame, &mut conn, &state, &out_tx);
	}

	if let ConnState::Peer { id } = &conn {
		if state.registry.leave(id) {
			state.relay.broadcast_leave(id);
		}
	}

	sender_task.abort();
}

fn handle_frame(frame: ClientFrame, conn: &mut ConnState, state: &AppState, out_tx: &mpsc::UnboundedSender<ServerFrame>) {
	match frame {
		ClientFrame::Identify { role } => {
			if !matches!(conn, ConnState::Unidentified) {
				return; // role is immutable once set
			}
			match role {
				Role::Tiles => {
					*conn = ConnState::Tiles;
				}
				Role::Peer => {
					let id = state.registry.mint_id();
					let color = default_cursor_color(&id);
					let name = default_display_name(&id);
					let others = state.registry.join(id.clone(), name.clone(), color.clone(), out_tx.clone());
					let _ = out_tx.send(ServerFrame::Welcome {
						id: id.clone(),
						color,
						name,
						others,
					});
					*conn = ConnState::Peer { id };
				}
			}
		}
		ClientFrame::Presence { x, y, color, name } => {
			let ConnState::Peer { id } = conn else { return };
			state.registry.update_presence(id, x, y, color, name);
			if let Some((px, py, pcolor, pname)) = state.registry.get(id) {
				state.relay.broadcast_presence(id, px, py, pcolor, pname);
			}
		}
		ClientFrame::Stroke(raw) => {
			let ConnState::Peer { id } = conn else { return };
			let now = crate::now_ms();
			let stroke = canonicalize(raw, now, || Uuid::new_v4().to_string());
			match state.coordinator.ingest(stroke) {
				Ok(outcome) if !outcome.tiles.is_empty() => {
					state.relay.broadcast_stroke(id, outcome.stroke);
				}
				Ok(_) => {} // no finite points: not persisted, not relayed
				Err(err) => warn!("ws stroke ingest failed: {err:#}"),
			}
		}
		ClientFrame::TilesRequest { req_id, z, tiles } => {
			if !matches!(conn, ConnState::Tiles) {
				return; // only tiles-role sessions may stream history
			}
			if tiles.len() > MAX_BATCH_WS {
				let _ = out_tx.send(ServerFrame::TileBatchDone { req_id });
				return;
			}
			for (tx, ty) in tiles {
				match state.query.query_tile(z, tx, ty, None) {
					Ok(strokes) => {
						let _ = out_tx.send(ServerFrame::TileData {
							req_id: req_id.clone(),
							z,
							tx,
							ty,
							strokes,
						});
					}
					Err(err) => warn!("tile query failed for ({z},{tx},{ty}): {err:#}"),
				}
			}
			let _ = out_tx.send(ServerFrame::TileBatchDone { req_id });
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::AppConfig;
	use crate::protocol::parse_client_frame;
	use canvas_core::RawStroke;
	use canvas_store::{IngestCoordinator, TileStore};
	use serde_json::Value;
	use std::sync::Arc;
	use tempfile::NamedTempFile;

	fn app_state() -> (AppState, NamedTempFile) {
		let file = NamedTempFile::new().unwrap();
		let store = TileStore::open(file.path()).unwrap();
		let coordinator = Arc::new(IngestCoordinator::new(store, 6, canvas_store::DEFAULT_MAX_STORE_BYTES));
		let config = Arc::new(AppConfig { max_store_bytes: canvas_store::DEFAULT_MAX_STORE_BYTES });
		(AppState::new(coordinator, config), file)
	}

	fn identify_peer(state: &AppState) -> (ConnState, mpsc::UnboundedReceiver<ServerFrame>) {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut conn = ConnState::Unidentified;
		handle_frame(ClientFrame::Identify { role: Role::Peer }, &mut conn, state, &tx);
		assert!(matches!(rx.try_recv(), Ok(ServerFrame::Welcome { .. })));
		(conn, rx)
	}

	#[test]
	fn stroke_from_peer_is_persisted_and_relayed_to_others_only() {
		let (state, _file) = app_state();
		let (mut conn_a, mut rx_a) = identify_peer(&state);
		let (tx_b, _rx_b) = mpsc::unbounded_channel();
		let mut conn_b = ConnState::Unidentified;
		handle_frame(ClientFrame::Identify { role: Role::Peer }, &mut conn_b, &state, &tx_b);

		let raw = RawStroke {
			id: Some("ws-test-1".to_string()),
			points: vec![canvas_core::RawPoint { x: 10.0, y: 10.0, p: None }],
			..Default::default()
		};
		let (ignored_tx, _ignored_rx) = mpsc::unbounded_channel();
		handle_frame(ClientFrame::Stroke(raw), &mut conn_a, &state, &ignored_tx);

		// A is the originator and must not receive its own stroke back.
		assert!(rx_a.try_recv().is_err());

		let strokes = state.query.query_tile(0, 0, 0, None).unwrap();
		assert_eq!(strokes.len(), 1);
		assert_eq!(strokes[0].id, "ws-test-1");
	}

	#[test]
	fn tiles_request_from_peer_role_is_ignored() {
		let (state, _file) = app_state();
		let (mut conn, _rx) = identify_peer(&state);
		let (tx, mut rx) = mpsc::unbounded_channel();
		handle_frame(
			ClientFrame::TilesRequest {
				req_id: Value::String("r1".to_string()),
				z: 0,
				tiles: vec![(0, 0)],
			},
			&mut conn,
			&state,
			&tx,
		);
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn stroke_from_tiles_role_is_ignored() {
		let (state, _file) = app_state();
		let (tx, _rx) = mpsc::unbounded_channel();
		let mut conn = ConnState::Unidentified;
		handle_frame(ClientFrame::Identify { role: Role::Tiles }, &mut conn, &state, &tx);
		assert!(matches!(conn, ConnState::Tiles));

		let raw = RawStroke {
			points: vec![canvas_core::RawPoint { x: 1.0, y: 1.0, p: None }],
			..Default::default()
		};
		handle_frame(ClientFrame::Stroke(raw), &mut conn, &state, &tx);
		assert_eq!(state.coordinator.store().stats().unwrap().row_count, 0);
	}

	#[test]
	fn tiles_request_streams_tile_data_then_exactly_one_batch_done() {
		let (state, _file) = app_state();
		let raw = RawStroke {
			id: Some("s1".to_string()),
			points: vec![canvas_core::RawPoint { x: 5.0, y: 5.0, p: None }],
			..Default::default()
		};
		state.coordinator.ingest(canonicalize(raw, 1, || "s1".to_string())).unwrap();

		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut conn = ConnState::Unidentified;
		handle_frame(ClientFrame::Identify { role: Role::Tiles }, &mut conn, &state, &tx);

		handle_frame(
			ClientFrame::TilesRequest {
				req_id: Value::String("r1".to_string()),
				z: 0,
				tiles: vec![(0, 0), (9, 9)],
			},
			&mut conn,
			&state,
			&tx,
		);

		match rx.try_recv() {
			Ok(ServerFrame::TileData { tx, ty, strokes, .. }) => {
				assert_eq!((tx, ty), (0, 0));
				assert_eq!(strokes.len(), 1);
			}
			other => panic!("expected tileData, got {other:?}"),
		}
		assert!(matches!(rx.try_recv(), Ok(ServerFrame::TileBatchDone { .. })));
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn oversized_tiles_request_yields_only_batch_done() {
		let (state, _file) = app_state();
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mut conn = ConnState::Unidentified;
		handle_frame(ClientFrame::Identify { role: Role::Tiles }, &mut conn, &state, &tx);

		let tiles = (0..(MAX_BATCH_WS as i64 + 1)).map(|i| (i, 0)).collect();
		handle_frame(
			ClientFrame::TilesRequest {
				req_id: Value::String("overflow".to_string()),
				z: 0,
				tiles,
			},
			&mut conn,
			&state,
			&tx,
		);
		assert!(matches!(rx.try_recv(), Ok(ServerFrame::TileBatchDone { .. })));
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn compact_frame_round_trips_through_the_dispatcher() {
		let (state, _file) = app_state();
		let (mut conn, _rx) = identify_peer(&state);
		let text = r#"[2, "sid", "uid", "#000", 4, 1, 0, [0,0, 10,0, 10,10]]"#;
		let frame = parse_client_frame(text).expect("parses");
		let (tx, _rx2) = mpsc::unbounded_channel();
		handle_frame(frame, &mut conn, &state, &tx);

		let strokes = state.query.query_tile(0, 0, 0, None).unwrap();
		let stroke = strokes.iter().find(|s| s.id == "sid").expect("persisted");
		assert_eq!(stroke.user_id, "uid");
		assert_eq!(stroke.size, 4.0);
		assert_eq!(stroke.opacity, 1.0);
		assert!(!stroke.erase);
		assert_eq!(
			stroke.points.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>(),
			vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]
		);
	}
}
