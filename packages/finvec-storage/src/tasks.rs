//! Postgres primitives for the `enrichment_tasks` queue.
//!
//! Every state change after a claim is conditioned on the row still being `processing` under the
//! same claim. `attempts` is bumped by each claim and doubles as the claim token, so a worker whose
//! claim was swept and re-claimed cannot overwrite the newer owner's result.

use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{EnrichmentTask, EnrichmentTaskRow},
};

const TASK_COLUMNS: &str = "\
task_id,
\ttransaction_id,
\tstatus,
\tattempts,
\terror_message,
\tcreated_at,
\tprocessed_at,
\tupdated_at";

/// Creates a pending task unless the transaction already has an open one, in which case the open
/// task's id is returned.
pub async fn enqueue_task<'e, E>(
	executor: E,
	transaction_id: Uuid,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let task_id: Uuid = sqlx::query_scalar(
		"\
WITH inserted AS (
	INSERT INTO enrichment_tasks (task_id, transaction_id, status, attempts, created_at, updated_at)
	VALUES ($1, $2, 'pending', 0, $3, $3)
	ON CONFLICT DO NOTHING
	RETURNING task_id
)
SELECT task_id FROM inserted
UNION ALL
SELECT task_id
FROM enrichment_tasks
WHERE transaction_id = $2 AND status IN ('pending','processing')
LIMIT 1",
	)
	.bind(Uuid::new_v4())
	.bind(transaction_id)
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(task_id)
}

/// Enqueues tasks for the tenant's transactions that have neither a vector nor an open task.
pub async fn enqueue_missing_tasks<'e, E>(
	executor: E,
	tenant_id: &str,
	limit: u32,
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO enrichment_tasks (task_id, transaction_id, status, attempts, created_at, updated_at)
SELECT gen_random_uuid(), t.transaction_id, 'pending', 0, $3, $3
FROM transactions t
WHERE t.tenant_id = $1
	AND t.embedding IS NULL
	AND NOT EXISTS (
		SELECT 1
		FROM enrichment_tasks e
		WHERE e.transaction_id = t.transaction_id AND e.status IN ('pending','processing')
	)
ORDER BY t.created_at ASC
LIMIT $2
ON CONFLICT DO NOTHING",
	)
	.bind(tenant_id)
	.bind(i64::from(limit))
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Atomically moves up to `limit` of the oldest pending tasks to `processing` and bumps their
/// attempt counters. Rows locked by a concurrent claim are skipped rather than waited on.
pub async fn claim_pending_tasks<'e, E>(
	executor: E,
	limit: u32,
	now: OffsetDateTime,
) -> Result<Vec<EnrichmentTask>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE enrichment_tasks
SET status = 'processing',
\tattempts = attempts + 1,
\tupdated_at = $2
WHERE status = 'pending'
\tAND task_id IN (
\t\tSELECT task_id
\t\tFROM enrichment_tasks
\t\tWHERE status = 'pending'
\t\tORDER BY created_at ASC, task_id ASC
\t\tLIMIT $1
\t\tFOR UPDATE SKIP LOCKED
\t)
RETURNING
\t{TASK_COLUMNS}"
	);
	let rows = sqlx::query_as::<_, EnrichmentTaskRow>(&sql)
		.bind(i64::from(limit))
		.bind(now)
		.fetch_all(executor)
		.await?;
	let mut tasks =
		rows.into_iter().map(EnrichmentTask::try_from).collect::<Result<Vec<_>>>()?;

	tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.task_id.cmp(&b.task_id)));

	Ok(tasks)
}

/// Refreshes `updated_at` of a claim that is about to be worked on, so the stale sweep measures
/// time since the task was last touched rather than since the batch was claimed.
pub async fn touch_task_claim<'e, E>(
	executor: E,
	task_id: Uuid,
	attempts: i32,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE enrichment_tasks
SET updated_at = $1
WHERE task_id = $2 AND status = 'processing' AND attempts = $3",
	)
	.bind(now)
	.bind(task_id)
	.bind(attempts)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn mark_task_completed<'e, E>(
	executor: E,
	task_id: Uuid,
	attempts: i32,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE enrichment_tasks
SET status = 'completed',
\terror_message = NULL,
\tprocessed_at = $1,
\tupdated_at = $1
WHERE task_id = $2 AND status = 'processing' AND attempts = $3",
	)
	.bind(now)
	.bind(task_id)
	.bind(attempts)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn release_task_for_retry<'e, E>(
	executor: E,
	task_id: Uuid,
	attempts: i32,
	error_message: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE enrichment_tasks
SET status = 'pending',
\terror_message = $1,
\tupdated_at = $2
WHERE task_id = $3 AND status = 'processing' AND attempts = $4",
	)
	.bind(error_message)
	.bind(now)
	.bind(task_id)
	.bind(attempts)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn mark_task_failed<'e, E>(
	executor: E,
	task_id: Uuid,
	attempts: i32,
	error_message: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE enrichment_tasks
SET status = 'failed',
\terror_message = $1,
\tupdated_at = $2
WHERE task_id = $3 AND status = 'processing' AND attempts = $4",
	)
	.bind(error_message)
	.bind(now)
	.bind(task_id)
	.bind(attempts)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Returns abandoned claims to the queue. Attempts are left as they are.
pub async fn requeue_stale_tasks<'e, E>(
	executor: E,
	claimed_before: OffsetDateTime,
	error_message: &str,
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE enrichment_tasks
SET status = 'pending',
\terror_message = $1,
\tupdated_at = $2
WHERE status = 'processing' AND updated_at < $3",
	)
	.bind(error_message)
	.bind(now)
	.bind(claimed_before)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn get_task<'e, E>(executor: E, task_id: Uuid) -> Result<Option<EnrichmentTask>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT\n\t{TASK_COLUMNS}\nFROM enrichment_tasks\nWHERE task_id = $1");
	let row = sqlx::query_as::<_, EnrichmentTaskRow>(&sql)
		.bind(task_id)
		.fetch_optional(executor)
		.await?;

	row.map(EnrichmentTask::try_from).transpose()
}
