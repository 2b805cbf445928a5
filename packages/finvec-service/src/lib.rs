pub mod coverage;
pub mod enqueue;
pub mod enrich;

mod error;

pub use coverage::CoverageReport;
pub use enqueue::{EnqueueRequest, EnqueueResponse};
pub use enrich::{
	EnrichBatchItem, EnrichBatchRequest, EnrichBatchResponse, EnrichOneResponse, EnrichStatus,
	OnDemandEnricher,
};
pub use error::{Error, Result};

use std::{future::Future, sync::Arc, time::Duration};

use finvec_config::OnDemand;
use finvec_providers::EmbeddingProvider;
use finvec_storage::{TaskStore, TransactionStore};

/// Tenant-facing operations: on-demand enrichment, coverage, and queue backfill.
pub struct EnrichmentService {
	pub cfg: OnDemand,
	pub enricher: OnDemandEnricher,
	pub transactions: Arc<dyn TransactionStore>,
	pub tasks: Arc<dyn TaskStore>,
}
impl EnrichmentService {
	pub fn new(
		cfg: OnDemand,
		transactions: Arc<dyn TransactionStore>,
		tasks: Arc<dyn TaskStore>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		let enricher = OnDemandEnricher::new(cfg.clone(), transactions.clone(), embedding);

		Self { cfg, enricher, transactions, tasks }
	}

	pub(crate) fn clamp_page_size(&self, requested: Option<u32>) -> u32 {
		clamp_page_size(&self.cfg, requested)
	}
}

pub(crate) fn clamp_page_size(cfg: &OnDemand, requested: Option<u32>) -> u32 {
	requested.unwrap_or(cfg.default_page_size).max(1).min(cfg.max_page_size.max(1))
}

/// Bounds a store call by `store_timeout_ms`. A timeout surfaces as a storage error.
pub(crate) async fn bounded<T, F>(cfg: &OnDemand, operation: &'static str, fut: F) -> Result<T>
where
	F: Future<Output = finvec_storage::Result<T>>,
{
	match tokio::time::timeout(Duration::from_millis(cfg.store_timeout_ms), fut).await {
		Ok(result) => Ok(result?),
		Err(_) => {
			Err(Error::Storage { message: format!("Store call timed out during {operation}.") })
		},
	}
}

pub(crate) fn require_tenant(tenant_id: &str) -> Result<&str> {
	let trimmed = tenant_id.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: "tenant_id must not be empty.".to_string() });
	}

	Ok(trimmed)
}
