pub mod worker;

mod error;

pub use error::{Error, Result, TaskError};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use finvec_providers::embedding::HttpEmbedding;
use finvec_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = finvec_cli::VERSION,
	rename_all = "kebab",
	styles = finvec_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Run one sweep and one batch, then exit.
	#[arg(long)]
	pub once: bool,
	/// Override `worker.batch_size`.
	#[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
	pub batch_size: Option<u32>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = finvec_config::load(&args.config)?;

	if let Some(batch_size) = args.batch_size {
		config.worker.batch_size = batch_size;

		finvec_config::validate(&config)?;
	}

	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.providers.embedding.dimensions).await?;

	let embedding = HttpEmbedding::new(&config.providers.embedding)?;
	let settings = worker::WorkerSettings::from_config(&config);
	let db = Arc::new(db);
	let state = worker::WorkerState {
		tasks: db.clone(),
		transactions: db,
		embedding: Arc::new(embedding),
		settings,
	};

	if args.once {
		let report = worker::run_cycle(&state).await?;

		tracing::info!(
			claimed = report.claimed,
			processed = report.processed,
			failed = report.failed,
			requeued = report.requeued,
			"Single enrichment run finished."
		);

		return Ok(());
	}

	worker::run_worker(state).await?;

	Ok(())
}
