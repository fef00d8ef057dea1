//! HTTP/WS server lifecycle and composition.
//!
//! A small type that owns lifecycle only (router assembly, cross-cutting
//! middleware, listening, graceful shutdown) and delegates request handling
//! to `http.rs` and `ws.rs`. Idempotent `start`/`stop`, bind-with-retry on an
//! alternate high port if the configured one is taken, and a layered tower
//! protection stack in front of the router.

use crate::config::bind_retry_plan;
use crate::query::TileQueryService;
use crate::relay::Relay;
use crate::session::SessionRegistry;
use crate::{http, ws};
use anyhow::{Result, bail};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{BoxError, Router, response::IntoResponse};
use canvas_derive::context;
use canvas_store::IngestCoordinator;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{ServiceBuilder, buffer::BufferLayer, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

/// Everything a request handler needs, cloned cheaply (every field is an
/// `Arc` or wraps one) and shared across tasks via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<SessionRegistry>,
	pub relay: Relay,
	pub coordinator: Arc<IngestCoordinator>,
	pub query: TileQueryService,
	pub config: Arc<crate::config::AppConfig>,
}

impl AppState {
	pub fn new(coordinator: Arc<IngestCoordinator>, config: Arc<crate::config::AppConfig>) -> Self {
		let registry = Arc::new(SessionRegistry::new());
		let relay = Relay::new(Arc::clone(&registry));
		let query = TileQueryService::new(Arc::clone(&coordinator));
		Self {
			registry,
			relay,
			coordinator,
			query,
			config,
		}
	}
}

fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/status", get(|| async { "ready!" }))
		.route("/ws", get(ws::ws_handler))
		.route("/api/ping", get(http::ping))
		.route("/api/tile-strokes", get(http::tile_strokes))
		.route("/api/tile-strokes-batch", post(http::tile_strokes_batch))
		.route("/api/stroke", post(http::post_stroke))
		.route("/api/db-status", get(http::db_status))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

/// Thin orchestration layer for the canvas HTTP/WS server.
///
/// Guarantees: idempotent start/stop, graceful shutdown (in-flight requests
/// finish, up to a timeout), and backpressure by default.
pub struct CanvasServer {
	ip: String,
	port: u16,
	state: AppState,
	exit_signal: Option<oneshot::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl CanvasServer {
	pub fn new(ip: impl Into<String>, port: u16, state: AppState) -> Self {
		Self {
			ip: ip.into(),
			port,
			state,
			exit_signal: None,
			join: None,
		}
	}

	/// Starts listening. If already running, stops the previous instance
	/// first. Retries on an alternate high port if the configured one is
	/// taken, per [`bind_retry_plan`].
	#[context("starting canvas server")]
	pub async fn start(&mut self) -> Result<()> {
		if self.exit_signal.is_some() || self.join.is_some() {
			self.stop().await;
		}

		log::info!("starting server");

		// Global backpressure & protection layers, innermost to outermost:
		// LoadShed -> ConcurrencyLimit -> Buffer -> Timeout -> CatchPanic -> HandleError.
		// HandleErrorLayer sits outermost so axum sees an Infallible error type.
		let overload_handler = HandleErrorLayer::new(|_err: BoxError| async move {
			let mut resp = (StatusCode::SERVICE_UNAVAILABLE, "Service overloaded, try later").into_response();
			resp.headers_mut().insert("Retry-After", "2".parse().unwrap());
			Ok::<_, std::convert::Infallible>(resp)
		});
		let protection = ServiceBuilder::new()
			.layer(overload_handler)
			.layer(CatchPanicLayer::new())
			.layer(TimeoutLayer::new(std::time::Duration::from_secs(15)))
			.layer(BufferLayer::new(512))
			.layer(ConcurrencyLimitLayer::new(256))
			.layer(LoadShedLayer::new());

		let router = build_router(self.state.clone()).layer(protection);

		let listener = self.bind_with_retry().await?;
		self.port = listener.local_addr()?.port();

		let (tx, rx) = oneshot::channel::<()>();
		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, router.into_make_service())
				.with_graceful_shutdown(async {
					rx.await.ok();
				})
				.await
			{
				log::error!("server task exited with error: {err}");
			}
		});

		self.exit_signal = Some(tx);
		self.join = Some(handle);
		Ok(())
	}

	/// Binds `self.ip:self.port`, falling back to alternate high ports in
	/// [`bind_retry_plan`]'s range if the configured port is already taken.
	/// Port 0 (ephemeral, used by tests) always binds on the first attempt.
	async fn bind_with_retry(&self) -> Result<TcpListener> {
		let addr = format!("{}:{}", self.ip, self.port);
		if let Ok(listener) = TcpListener::bind(&addr).await {
			log::info!("server binding on {addr}");
			return Ok(listener);
		}
		if self.port == 0 {
			bail!("failed to bind ephemeral port on {}", self.ip);
		}

		let (attempts, base) = bind_retry_plan();
		for offset in 0..attempts {
			let candidate = base + offset as u16;
			let addr = format!("{}:{candidate}", self.ip);
			if let Ok(listener) = TcpListener::bind(&addr).await {
				log::warn!("configured port busy, bound alternate port {candidate} instead");
				return Ok(listener);
			}
		}
		bail!("failed to bind {} or any of {attempts} alternate ports starting at {base}", self.ip)
	}

	/// Triggers graceful shutdown and waits for the server task to finish
	/// (with a timeout). Idempotent: a no-op if not running.
	pub async fn stop(&mut self) {
		if self.exit_signal.is_none() && self.join.is_none() {
			return;
		}

		log::info!("stopping server");

		if let Some(tx) = self.exit_signal.take() {
			let _ = tx.send(());
		}

		if let Some(handle) = self.join.take() {
			match tokio::time::timeout(std::time::Duration::from_secs(10), handle).await {
				Ok(join_result) => {
					if let Err(join_err) = join_result {
						log::warn!("server task join error: {join_err}");
					}
				}
				Err(_) => log::warn!("server task did not shut down within timeout; continuing"),
			}
		}
	}

	/// The port actually bound (meaningful after `start()` for port 0).
	pub fn port(&self) -> u16 {
		self.port
	}
}
