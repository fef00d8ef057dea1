use anyhow::{Context, Result};
use canvas::config::{self, AppConfig, CanvasArgs};
use canvas::server::{AppState, CanvasServer};
use clap::Parser;
use std::sync::Arc;

fn main() -> Result<()> {
	let args = CanvasArgs::parse();

	env_logger::Builder::new()
		.filter_level(args.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	run(args)
}

#[tokio::main]
async fn run(args: CanvasArgs) -> Result<()> {
	std::fs::create_dir_all(&args.data_dir).with_context(|| format!("creating data directory {:?}", args.data_dir))?;

	let coordinator = Arc::new(config::build_coordinator(&args)?);
	let app_config = Arc::new(AppConfig::from_args(&args));
	let state = AppState::new(coordinator, app_config);

	let mut server = CanvasServer::new("0.0.0.0", args.port, state);
	server.start().await?;
	log::info!("listening on port {}", server.port());

	tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
	log::info!("received shutdown signal");
	server.stop().await;

	Ok(())
}
