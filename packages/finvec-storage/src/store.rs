//! Store seams used by the worker and the on-demand service.
//!
//! `Db` implements both traits against Postgres. Callers only ever see the compare-and-set style
//! operations below; there is no way to write a task field directly. Post-claim operations take
//! the `attempts` value returned by the claim and do nothing once that claim has been superseded.

use time::OffsetDateTime;
use uuid::Uuid;

use finvec_domain::BoxFuture;

use crate::{
	Result,
	db::Db,
	models::{CoverageCounts, EnrichmentTask, TransactionRecord},
	tasks, transactions,
};

pub trait TaskStore
where
	Self: Send + Sync,
{
	fn enqueue<'a>(
		&'a self,
		transaction_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Uuid>>;

	fn enqueue_missing<'a>(
		&'a self,
		tenant_id: &'a str,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;

	/// `pending -> processing` for up to `limit` tasks, oldest first, incrementing `attempts`.
	fn claim_pending<'a>(
		&'a self,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<EnrichmentTask>>>;

	/// Bumps `updated_at` of a live claim. Returns `false` when the claim is gone.
	fn touch_claim<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// `processing -> completed`. Returns `false` when the claim is no longer current.
	fn mark_completed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// `processing -> pending`, keeping `attempts`.
	fn release_for_retry<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// `processing -> failed`.
	fn mark_failed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// `processing -> pending` for claims last touched before `claimed_before`.
	fn requeue_stale<'a>(
		&'a self,
		claimed_before: OffsetDateTime,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;

	fn get<'a>(&'a self, task_id: Uuid) -> BoxFuture<'a, Result<Option<EnrichmentTask>>>;
}

pub trait TransactionStore
where
	Self: Send + Sync,
{
	fn fetch<'a>(
		&'a self,
		transaction_id: Uuid,
	) -> BoxFuture<'a, Result<Option<TransactionRecord>>>;

	fn list_for_enrichment<'a>(
		&'a self,
		tenant_id: &'a str,
		skip_existing: bool,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<TransactionRecord>>>;

	/// Returns `false` when the transaction no longer exists.
	fn store_embedding<'a>(
		&'a self,
		transaction_id: Uuid,
		vector: &'a [f32],
	) -> BoxFuture<'a, Result<bool>>;

	fn coverage<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, Result<CoverageCounts>>;
}

impl TaskStore for Db {
	fn enqueue<'a>(
		&'a self,
		transaction_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(tasks::enqueue_task(&self.pool, transaction_id, now))
	}

	fn enqueue_missing<'a>(
		&'a self,
		tenant_id: &'a str,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(tasks::enqueue_missing_tasks(&self.pool, tenant_id, limit, now))
	}

	fn claim_pending<'a>(
		&'a self,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<EnrichmentTask>>> {
		Box::pin(tasks::claim_pending_tasks(&self.pool, limit, now))
	}

	fn touch_claim<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(tasks::touch_task_claim(&self.pool, task_id, attempts, now))
	}

	fn mark_completed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(tasks::mark_task_completed(&self.pool, task_id, attempts, now))
	}

	fn release_for_retry<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(tasks::release_task_for_retry(&self.pool, task_id, attempts, error_message, now))
	}

	fn mark_failed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(tasks::mark_task_failed(&self.pool, task_id, attempts, error_message, now))
	}

	fn requeue_stale<'a>(
		&'a self,
		claimed_before: OffsetDateTime,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(tasks::requeue_stale_tasks(&self.pool, claimed_before, error_message, now))
	}

	fn get<'a>(&'a self, task_id: Uuid) -> BoxFuture<'a, Result<Option<EnrichmentTask>>> {
		Box::pin(tasks::get_task(&self.pool, task_id))
	}
}

impl TransactionStore for Db {
	fn fetch<'a>(
		&'a self,
		transaction_id: Uuid,
	) -> BoxFuture<'a, Result<Option<TransactionRecord>>> {
		Box::pin(transactions::fetch_transaction(&self.pool, transaction_id))
	}

	fn list_for_enrichment<'a>(
		&'a self,
		tenant_id: &'a str,
		skip_existing: bool,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<TransactionRecord>>> {
		Box::pin(transactions::list_for_enrichment(&self.pool, tenant_id, skip_existing, limit))
	}

	fn store_embedding<'a>(
		&'a self,
		transaction_id: Uuid,
		vector: &'a [f32],
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(transactions::store_embedding(&self.pool, transaction_id, vector))
	}

	fn coverage<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, Result<CoverageCounts>> {
		Box::pin(transactions::coverage_counts(&self.pool, tenant_id))
	}
}
