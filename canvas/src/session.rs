//! Session Registry: the process-wide map of connected peers.
//!
//! Pure in-memory, lifecycle tied to channel liveness — presence state is
//! never persisted across restarts. Reads (broadcast fan-out) and writes
//! (join/leave/mutate) both go through a `DashMap`, a lock-free concurrent
//! map well suited to a registry that's read far more often than written.

use crate::protocol::ServerFrame;
use dashmap::DashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

const MAX_DISPLAY_NAME_LEN: usize = 24;

/// A connected peer. Only `role = peer` sessions are ever inserted into the
/// registry (tiles-role sessions are local connection state only — see
/// `ws.rs`).
pub struct PeerSession {
	pub id: String,
	pub display_name: String,
	pub cursor_color: String,
	pub x: f64,
	pub y: f64,
	sender: UnboundedSender<ServerFrame>,
}

/// Process-wide peer map plus a monotonic counter for minting session ids
/// without pulling in a UUID dependency purely for this (ids are opaque to
/// clients either way).
pub struct SessionRegistry {
	peers: DashMap<String, PeerSession>,
	next_id: AtomicU64,
}

impl Default for SessionRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self {
			peers: DashMap::new(),
			next_id: AtomicU64::new(1),
		}
	}

	/// Mints a fresh session id. Not a UUID — just opaque and unique within
	/// this process.
	pub fn mint_id(&self) -> String {
		let n = self.next_id.fetch_add(1, Ordering::Relaxed);
		format!("peer-{n:x}")
	}

	/// Registers a newly identified peer, returning the snapshot of all
	/// already-connected peers' `(id, x, y)` the welcome frame needs.
	pub fn join(&self, id: String, display_name: String, cursor_color: String, sender: UnboundedSender<ServerFrame>) -> Vec<(String, f64, f64)> {
		let snapshot = self.peers.iter().map(|entry| (entry.id.clone(), entry.x, entry.y)).collect();
		self.peers.insert(
			id.clone(),
			PeerSession {
				id,
				display_name,
				cursor_color,
				x: 0.0,
				y: 0.0,
				sender,
			},
		);
		snapshot
	}

	/// Removes a peer from the registry. Returns `true` if it was present
	/// (callers use this to decide whether a `leave` broadcast is owed).
	pub fn leave(&self, id: &str) -> bool {
		self.peers.remove(id).is_some()
	}

	/// Applies a presence update. Any field may be absent; `(x, y)` is
	/// rejected wholesale if either component is non-finite, and
	/// `display_name` is truncated to [`MAX_DISPLAY_NAME_LEN`] characters.
	pub fn update_presence(&self, id: &str, x: Option<f64>, y: Option<f64>, color: Option<String>, name: Option<String>) {
		let Some(mut session) = self.peers.get_mut(id) else { return };
		if let (Some(x), Some(y)) = (x, y) {
			if x.is_finite() && y.is_finite() {
				session.x = x;
				session.y = y;
			}
		}
		if let Some(color) = color {
			session.cursor_color = color;
		}
		if let Some(name) = name {
			session.display_name = name.chars().take(MAX_DISPLAY_NAME_LEN).collect();
		}
	}

	pub fn get(&self, id: &str) -> Option<(f64, f64, String, String)> {
		self.peers.get(id).map(|s| (s.x, s.y, s.cursor_color.clone(), s.display_name.clone()))
	}

	/// Sends `frame` to every peer except `exclude`, swallowing individual
	/// send failures — a dead session will be cleaned up by its own close
	/// handler, not by the relay.
	pub fn send_to_others(&self, exclude: &str, frame: ServerFrame) {
		for entry in self.peers.iter() {
			if entry.id == exclude {
				continue;
			}
			let _ = entry.sender.send(frame.clone());
		}
	}

	pub fn send_to_all(&self, frame: ServerFrame) {
		for entry in self.peers.iter() {
			let _ = entry.sender.send(frame.clone());
		}
	}

	pub fn len(&self) -> usize {
		self.peers.len()
	}
}

/// Deterministic hue-ish default cursor color derived from the session id,
/// so two peers rarely collide without needing a `rand` dependency just for
/// this one cosmetic default.
pub fn default_cursor_color(id: &str) -> String {
	let mut hasher = DefaultHasher::new();
	id.hash(&mut hasher);
	let hue = hasher.finish() % 360;
	format!("hsl({hue}, 70%, 55%)")
}

/// Short display name derived from the session id, e.g. `peer-a3`.
pub fn default_display_name(id: &str) -> String {
	id.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::sync::mpsc;

	fn channel() -> (UnboundedSender<ServerFrame>, mpsc::UnboundedReceiver<ServerFrame>) {
		mpsc::unbounded_channel()
	}

	#[test]
	fn join_returns_snapshot_of_prior_peers() {
		let registry = SessionRegistry::new();
		let (tx1, _rx1) = channel();
		registry.join("a".to_string(), "a".to_string(), "red".to_string(), tx1);

		let (tx2, _rx2) = channel();
		let snapshot = registry.join("b".to_string(), "b".to_string(), "blue".to_string(), tx2);
		assert_eq!(snapshot, vec![("a".to_string(), 0.0, 0.0)]);
	}

	#[test]
	fn leave_removes_and_reports_presence() {
		let registry = SessionRegistry::new();
		let (tx, _rx) = channel();
		registry.join("a".to_string(), "a".to_string(), "red".to_string(), tx);
		assert!(registry.leave("a"));
		assert!(!registry.leave("a"));
		assert_eq!(registry.len(), 0);
	}

	#[test]
	fn presence_update_rejects_non_finite_coordinates() {
		let registry = SessionRegistry::new();
		let (tx, _rx) = channel();
		registry.join("a".to_string(), "a".to_string(), "red".to_string(), tx);
		registry.update_presence("a", Some(f64::NAN), Some(1.0), None, None);
		let (x, y, _, _) = registry.get("a").unwrap();
		assert_eq!((x, y), (0.0, 0.0));

		registry.update_presence("a", Some(5.0), Some(6.0), None, None);
		let (x, y, _, _) = registry.get("a").unwrap();
		assert_eq!((x, y), (5.0, 6.0));
	}

	#[test]
	fn display_name_is_truncated() {
		let registry = SessionRegistry::new();
		let (tx, _rx) = channel();
		registry.join("a".to_string(), "a".to_string(), "red".to_string(), tx);
		let long_name = "x".repeat(100);
		registry.update_presence("a", None, None, None, Some(long_name));
		let (_, _, _, name) = registry.get("a").unwrap();
		assert_eq!(name.len(), MAX_DISPLAY_NAME_LEN);
	}

	#[test]
	fn send_to_others_excludes_sender() {
		let registry = SessionRegistry::new();
		let (tx1, mut rx1) = channel();
		registry.join("a".to_string(), "a".to_string(), "red".to_string(), tx1);
		let (tx2, mut rx2) = channel();
		registry.join("b".to_string(), "b".to_string(), "blue".to_string(), tx2);

		registry.send_to_others("a", ServerFrame::Leave { id: "a".to_string() });
		assert!(rx1.try_recv().is_err());
		assert!(rx2.try_recv().is_ok());
	}
}
