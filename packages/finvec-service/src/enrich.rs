//! On-demand enrichment. This path embeds and persists vectors directly and never reads or writes
//! the task queue; it shares only the text builder and the provider with the worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use finvec_config::OnDemand;
use finvec_domain::text;
use finvec_providers::EmbeddingProvider;
use finvec_storage::{TransactionStore, models::TransactionRecord};

use crate::{EnrichmentService, Result};

const TRANSACTION_NOT_FOUND: &str = "transaction not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichStatus {
	Success,
	Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichOneResponse {
	pub transaction_id: Uuid,
	pub status: EnrichStatus,
	pub text: Option<String>,
	pub dimensions: Option<usize>,
	pub preview: Vec<f32>,
	pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichBatchRequest {
	#[serde(default = "default_skip_existing")]
	pub skip_existing: bool,
	pub page_size: Option<u32>,
}
impl Default for EnrichBatchRequest {
	fn default() -> Self {
		Self { skip_existing: default_skip_existing(), page_size: None }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichBatchItem {
	pub transaction_id: Uuid,
	pub status: EnrichStatus,
	pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichBatchResponse {
	pub processed: u32,
	pub failed: u32,
	pub total: u32,
	pub items: Vec<EnrichBatchItem>,
	pub message: Option<String>,
}

struct Embedded {
	text: String,
	vector: Vec<f32>,
}

pub struct OnDemandEnricher {
	cfg: OnDemand,
	transactions: Arc<dyn TransactionStore>,
	embedding: Arc<dyn EmbeddingProvider>,
}
impl OnDemandEnricher {
	pub fn new(
		cfg: OnDemand,
		transactions: Arc<dyn TransactionStore>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		Self { cfg, transactions, embedding }
	}

	/// Rebuilds and stores the vector of one transaction, overwriting any existing one. A missing
	/// transaction, or one owned by another tenant, yields a failed result rather than an error.
	pub async fn enrich_one(
		&self,
		tenant_id: &str,
		transaction_id: Uuid,
	) -> Result<EnrichOneResponse> {
		let tenant_id = crate::require_tenant(tenant_id)?;
		let fetched = self.transactions.fetch(transaction_id);
		let record = crate::bounded(&self.cfg, "transaction fetch", fetched)
			.await?
			.filter(|record| record.tenant_id == tenant_id);
		let Some(record) = record else {
			return Ok(EnrichOneResponse {
				transaction_id,
				status: EnrichStatus::Failed,
				text: None,
				dimensions: None,
				preview: Vec::new(),
				detail: Some(TRANSACTION_NOT_FOUND.to_string()),
			});
		};

		match self.embed_and_store(&record).await {
			Ok(embedded) => {
				let preview_len = (self.cfg.preview_len as usize).min(embedded.vector.len());

				Ok(EnrichOneResponse {
					transaction_id,
					status: EnrichStatus::Success,
					dimensions: Some(embedded.vector.len()),
					preview: embedded.vector[..preview_len].to_vec(),
					text: Some(embedded.text),
					detail: None,
				})
			},
			Err(detail) => {
				tracing::warn!(%transaction_id, detail = %detail, "On-demand enrichment failed.");

				Ok(EnrichOneResponse {
					transaction_id,
					status: EnrichStatus::Failed,
					text: Some(build_text(&record)),
					dimensions: None,
					preview: Vec::new(),
					detail: Some(detail),
				})
			},
		}
	}

	/// Enriches one page of the tenant's most recent transactions. Items fail independently.
	pub async fn enrich_batch(
		&self,
		tenant_id: &str,
		req: EnrichBatchRequest,
	) -> Result<EnrichBatchResponse> {
		let tenant_id = crate::require_tenant(tenant_id)?;
		let page_size = crate::clamp_page_size(&self.cfg, req.page_size);
		let listed = self.transactions.list_for_enrichment(tenant_id, req.skip_existing, page_size);
		let records = crate::bounded(&self.cfg, "transaction listing", listed).await?;

		if records.is_empty() {
			return Ok(EnrichBatchResponse {
				processed: 0,
				failed: 0,
				total: 0,
				items: Vec::new(),
				message: Some("No transactions need enrichment.".to_string()),
			});
		}

		let mut response = EnrichBatchResponse {
			processed: 0,
			failed: 0,
			total: records.len() as u32,
			items: Vec::with_capacity(records.len()),
			message: None,
		};

		for record in &records {
			let item = match self.embed_and_store(record).await {
				Ok(_) => {
					response.processed += 1;

					EnrichBatchItem {
						transaction_id: record.transaction_id,
						status: EnrichStatus::Success,
						detail: None,
					}
				},
				Err(detail) => {
					response.failed += 1;

					tracing::warn!(
						transaction_id = %record.transaction_id,
						detail = %detail,
						"On-demand enrichment failed."
					);

					EnrichBatchItem {
						transaction_id: record.transaction_id,
						status: EnrichStatus::Failed,
						detail: Some(detail),
					}
				},
			};

			response.items.push(item);
		}

		Ok(response)
	}

	async fn embed_and_store(&self, record: &TransactionRecord) -> Result<Embedded, String> {
		let text = build_text(record);
		let vector = self
			.embedding
			.embed(&text)
			.await
			.map_err(|err| crate::Error::from(err).to_string())?;
		let write = self.transactions.store_embedding(record.transaction_id, &vector);
		let stored = crate::bounded(&self.cfg, "embedding write", write)
			.await
			.map_err(|err| err.to_string())?;

		if !stored {
			return Err(TRANSACTION_NOT_FOUND.to_string());
		}

		Ok(Embedded { text, vector })
	}
}

impl EnrichmentService {
	pub async fn enrich_one(
		&self,
		tenant_id: &str,
		transaction_id: Uuid,
	) -> Result<EnrichOneResponse> {
		self.enricher.enrich_one(tenant_id, transaction_id).await
	}

	pub async fn enrich_batch(
		&self,
		tenant_id: &str,
		req: EnrichBatchRequest,
	) -> Result<EnrichBatchResponse> {
		self.enricher.enrich_batch(tenant_id, req).await
	}
}

fn build_text(record: &TransactionRecord) -> String {
	text::build(
		&record.description,
		record.category_name.as_deref(),
		record.amount_minor,
		record.direction,
	)
}

fn default_skip_existing() -> bool {
	true
}
