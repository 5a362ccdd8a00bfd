// Copyright (c) 2025 Laurel Authors. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Laurel contributor pipeline worker binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod version;

/// Laurel worker - queue-driven contributor leaderboard pipeline.
#[derive(Parser, Debug)]
#[command(
	name = "laurel-worker",
	about = "Laurel contributor pipeline worker",
	version
)]
struct Args {
	/// Path to a worker config file (overrides the system path)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Recover abandoned claims, then drain queued jobs
	Run {
		/// Override the configured per-invocation job limit
		#[arg(long)]
		max_jobs: Option<u32>,

		/// Run repository lanes concurrently instead of one job at a time
		#[arg(long)]
		parallel: bool,
	},
	/// Track a repository and queue commit extraction for it
	Enqueue {
		/// Remote URL of the repository
		url: String,
	},
	/// Reopen a failed repository and queue a fresh extraction
	Retry {
		/// Remote URL of the repository
		url: String,
	},
	/// Queue leftover batches for repositories parked by rate limiting
	RequeueStalled,
	/// Print the contributor leaderboard for a repository
	Leaderboard {
		/// Remote URL of the repository
		url: String,
	},
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// Parse CLI arguments
	let args = Args::parse();

	// Handle subcommands that need no configuration
	if matches!(args.command, Command::Version) {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	// Load configuration
	let config = match &args.config {
		Some(path) => laurel_server_config::load_config_with_file(path.clone())?,
		None => laurel_server_config::load_config()?,
	};

	init_tracing(&config);

	// Create database pool and run migrations
	let pool = laurel_server_db::create_pool(&config.database.url).await?;
	laurel_server_db::run_migrations(&pool).await?;

	match args.command {
		Command::Run { max_jobs, parallel } => {
			let cancel = CancellationToken::new();
			spawn_signal_listener(cancel.clone());
			commands::run(&config, pool, max_jobs, parallel, &cancel).await
		}
		Command::Enqueue { url } => commands::enqueue(pool, &url).await,
		Command::Retry { url } => commands::retry(pool, &url).await,
		Command::RequeueStalled => commands::requeue_stalled(&config, pool).await,
		Command::Leaderboard { url } => commands::leaderboard(pool, &url).await,
		// Answered before configuration was loaded.
		Command::Version => Ok(()),
	}
}

fn init_tracing(config: &laurel_server_config::WorkerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());

	if config.logging.json {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer().json())
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(tracing_subscriber::fmt::layer())
			.init();
	}
}

/// Cancel the token on SIGINT or SIGTERM so in-flight stages stop at
/// their next checkpoint and leave claims for startup recovery.
fn spawn_signal_listener(cancel: CancellationToken) {
	tokio::spawn(async move {
		let ctrl_c = async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to install Ctrl+C handler");
			}
		};

		#[cfg(unix)]
		let terminate = async {
			match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
				Ok(mut sig) => {
					sig.recv().await;
				}
				Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
			}
		};

		#[cfg(not(unix))]
		let terminate = std::future::pending::<()>();

		tokio::select! {
			_ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
			_ = terminate => tracing::info!("Received SIGTERM, shutting down"),
		}

		cancel.cancel();
	});
}
