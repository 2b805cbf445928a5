use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{EnrichmentService, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
	/// Defaults to `on_demand.max_page_size`.
	pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
	pub enqueued: u64,
}

impl EnrichmentService {
	/// Creates pending tasks for transactions that have no vector and no open task, oldest first.
	pub async fn enqueue_missing(
		&self,
		tenant_id: &str,
		req: EnqueueRequest,
	) -> Result<EnqueueResponse> {
		let tenant_id = crate::require_tenant(tenant_id)?;
		let limit = self.clamp_page_size(req.limit.or(Some(self.cfg.max_page_size)));
		let enqueued = crate::bounded(
			&self.cfg,
			"enqueue missing",
			self.tasks.enqueue_missing(tenant_id, limit, OffsetDateTime::now_utc()),
		)
		.await?;

		if enqueued > 0 {
			tracing::info!(tenant_id, enqueued, "Enqueued transactions missing a vector.");
		}

		Ok(EnqueueResponse { enqueued })
	}
}
