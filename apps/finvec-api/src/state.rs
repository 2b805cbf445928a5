use std::sync::Arc;

use finvec_config::Config;
use finvec_providers::{EmbeddingProvider, embedding::HttpEmbedding};
use finvec_service::EnrichmentService;
use finvec_storage::{TaskStore, TransactionStore, db::Db};
use finvec_worker::worker::{WorkerSettings, WorkerState};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<EnrichmentService>,
	pub worker: WorkerState,
	pub admin_auth_token: Option<String>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.providers.embedding.dimensions).await?;

		let embedding = HttpEmbedding::new(&config.providers.embedding)?;
		let db = Arc::new(db);

		Ok(Self::from_parts(&config, db.clone(), db, Arc::new(embedding)))
	}

	/// Wires the state from already-built stores and provider.
	pub fn from_parts(
		config: &Config,
		tasks: Arc<dyn TaskStore>,
		transactions: Arc<dyn TransactionStore>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		let service = EnrichmentService::new(
			config.on_demand.clone(),
			transactions.clone(),
			tasks.clone(),
			embedding.clone(),
		);
		let worker = WorkerState {
			tasks,
			transactions,
			embedding,
			settings: WorkerSettings::from_config(config),
		};

		Self {
			service: Arc::new(service),
			worker,
			admin_auth_token: config.service.admin_auth_token.clone(),
		}
	}
}
