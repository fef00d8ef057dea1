//! Relay: stateless broadcast fan-out to peer sessions.
//!
//! The relay holds no state of its own — it only ever reads the
//! [`SessionRegistry`]. Ownership runs one way: `Relay -> SessionRegistry`;
//! sessions never hold a back-reference to the relay. A session's close
//! handler (in `ws.rs`) calls `broadcast_leave` directly, after removing
//! itself from the registry.

use crate::protocol::ServerFrame;
use crate::session::SessionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct Relay {
	registry: Arc<SessionRegistry>,
}

impl Relay {
	pub fn new(registry: Arc<SessionRegistry>) -> Self {
		Self { registry }
	}

	/// Sends a cursor/presence update to every peer except `session_id`.
	pub fn broadcast_presence(&self, session_id: &str, x: f64, y: f64, color: String, name: String) {
		self.registry.send_to_others(
			session_id,
			ServerFrame::Presence {
				id: session_id.to_string(),
				x,
				y,
				color,
				name,
			},
		);
	}

	/// Sends a canonical stroke to every peer except its originator.
	/// Called only after the stroke's tile fan-out has committed —
	/// the ingest coordinator never hands a stroke to the relay before
	/// that commit returns, so a broadcast implies a durable write.
	pub fn broadcast_stroke(&self, originator: &str, stroke: canvas_core::Stroke) {
		self.registry.send_to_others(originator, ServerFrame::Stroke(stroke));
	}

	/// Announces a departed peer to everyone still connected.
	pub fn broadcast_leave(&self, session_id: &str) {
		self.registry.send_to_all(ServerFrame::Leave { id: session_id.to_string() });
	}
}
