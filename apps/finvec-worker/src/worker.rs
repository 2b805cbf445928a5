use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use finvec_domain::{RetryDecision, RetryPolicy, text};
use finvec_providers::EmbeddingProvider;
use finvec_storage::{TaskStore, TransactionStore, models::EnrichmentTask};

use crate::{Error, Result, TaskError};

pub const CLAIM_EXPIRED: &str = "claim expired";

const MAX_TASK_ERROR_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";
const CREDENTIAL_KEYS: [&str; 6] =
	["api_key", "apikey", "api-key", "authorization", "password", "token"];

#[derive(Debug, Clone)]
pub struct WorkerSettings {
	pub batch_size: u32,
	pub retry: RetryPolicy,
	pub poll_interval: StdDuration,
	pub stale_claim: Duration,
	pub store_timeout: StdDuration,
	/// Literal values scrubbed from every error message persisted on a task.
	pub redact: Vec<String>,
}
impl WorkerSettings {
	pub fn from_config(cfg: &finvec_config::Config) -> Self {
		let worker = &cfg.worker;

		Self {
			batch_size: worker.batch_size,
			retry: RetryPolicy::new(worker.max_attempts),
			poll_interval: StdDuration::from_millis(worker.poll_interval_ms),
			stale_claim: Duration::seconds(worker.stale_claim_seconds),
			store_timeout: StdDuration::from_millis(worker.store_timeout_ms),
			redact: vec![cfg.providers.embedding.api_key.clone()],
		}
	}
}

#[derive(Clone)]
pub struct WorkerState {
	pub tasks: Arc<dyn TaskStore>,
	pub transactions: Arc<dyn TransactionStore>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub settings: WorkerSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
	pub claimed: u32,
	/// Tasks that reached `completed`.
	pub processed: u32,
	/// Tasks that reached `failed`.
	pub failed: u32,
	/// Tasks returned to `pending` for a later run.
	pub requeued: u32,
}

enum Settled {
	Completed,
	Failed,
	Requeued,
	Lost,
}

/// Drives the queue until Ctrl-C. Each cycle sweeps abandoned claims and then processes one batch;
/// errors are logged and the loop keeps going.
pub async fn run_worker(state: WorkerState) -> Result<()> {
	tracing::info!(
		batch_size = state.settings.batch_size,
		poll_interval_ms = state.settings.poll_interval.as_millis() as u64,
		"Enrichment worker started."
	);

	loop {
		match run_cycle(&state).await {
			Ok(report) if report.claimed > 0 => {
				tracing::info!(
					claimed = report.claimed,
					processed = report.processed,
					failed = report.failed,
					requeued = report.requeued,
					"Enrichment batch finished."
				);
			},
			Ok(_) => {},
			Err(err) => {
				tracing::error!(error = %err, "Enrichment cycle failed.");
			},
		}

		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Shutdown requested. Stopping enrichment worker.");

				return Ok(());
			},
			_ = tokio_time::sleep(state.settings.poll_interval) => {},
		}
	}
}

pub async fn run_cycle(state: &WorkerState) -> Result<BatchReport> {
	let swept = sweep_stale_claims(state).await?;

	if swept > 0 {
		tracing::warn!(count = swept, "Requeued abandoned enrichment claims.");
	}

	run_batch(state, state.settings.batch_size).await
}

/// Moves `processing` tasks untouched for longer than the stale-claim window back to `pending`.
pub async fn sweep_stale_claims(state: &WorkerState) -> Result<u64> {
	let now = OffsetDateTime::now_utc();
	let claimed_before = now - state.settings.stale_claim;

	bounded(
		state.settings.store_timeout,
		"stale claim sweep",
		state.tasks.requeue_stale(claimed_before, CLAIM_EXPIRED, now),
	)
	.await
}

/// Claims up to `max_tasks` pending tasks and settles each one. A failing task never aborts the
/// run; only a failed claim does.
///
/// Each task's claim is touched right before work starts on it, and every write after that is
/// tied to the claim's `attempts`. A task whose claim was swept and re-claimed by another worker is
/// skipped or left alone.
pub async fn run_batch(state: &WorkerState, max_tasks: u32) -> Result<BatchReport> {
	let mut report = BatchReport::default();

	if max_tasks == 0 {
		return Ok(report);
	}

	let now = OffsetDateTime::now_utc();
	let claimed = bounded(
		state.settings.store_timeout,
		"claim",
		state.tasks.claim_pending(max_tasks, now),
	)
	.await?;

	report.claimed = claimed.len() as u32;

	for task in &claimed {
		match touch_claim(state, task).await {
			Ok(true) => {},
			Ok(false) => {
				tracing::warn!(
					task_id = %task.task_id,
					attempts = task.attempts,
					"Claim was superseded before work started. Skipping."
				);

				continue;
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					task_id = %task.task_id,
					"Failed to refresh claim. The claim will expire."
				);

				continue;
			},
		}

		let outcome = process_task(state, task).await;

		match settle(state, task, outcome).await {
			Ok(Settled::Completed) => report.processed += 1,
			Ok(Settled::Failed) => report.failed += 1,
			Ok(Settled::Requeued) => report.requeued += 1,
			Ok(Settled::Lost) => {
				tracing::warn!(
					task_id = %task.task_id,
					"Claim was superseded before the outcome was recorded. Skipping."
				);
			},
			Err(err) => {
				tracing::error!(
					error = %err,
					task_id = %task.task_id,
					"Failed to record task outcome. The claim will expire."
				);
			},
		}
	}

	Ok(report)
}

async fn touch_claim(state: &WorkerState, task: &EnrichmentTask) -> Result<bool> {
	let now = OffsetDateTime::now_utc();

	bounded(
		state.settings.store_timeout,
		"claim touch",
		state.tasks.touch_claim(task.task_id, task.attempts, now),
	)
	.await
}

async fn process_task(state: &WorkerState, task: &EnrichmentTask) -> Result<(), TaskError> {
	let timeout = state.settings.store_timeout;
	let fetched = state.transactions.fetch(task.transaction_id);
	let record = bounded(timeout, "transaction fetch", fetched)
		.await
		.map_err(TaskError::Store)?
		.ok_or(TaskError::NotFound)?;
	let text = text::build(
		&record.description,
		record.category_name.as_deref(),
		record.amount_minor,
		record.direction,
	);
	let vector = state.embedding.embed(&text).await?;
	let stored = bounded(
		timeout,
		"embedding write",
		state.transactions.store_embedding(task.transaction_id, &vector),
	)
	.await
	.map_err(TaskError::Store)?;

	// The row vanished between fetch and write.
	if !stored {
		return Err(TaskError::NotFound);
	}

	Ok(())
}

async fn settle(
	state: &WorkerState,
	task: &EnrichmentTask,
	outcome: Result<(), TaskError>,
) -> Result<Settled> {
	let timeout = state.settings.store_timeout;
	let redact = state.settings.redact.as_slice();
	let attempts = task.attempts;
	let now = OffsetDateTime::now_utc();
	let (applied, settled) = match outcome {
		Ok(()) => {
			let applied = bounded(
				timeout,
				"mark completed",
				state.tasks.mark_completed(task.task_id, attempts, now),
			)
			.await?;

			if applied {
				tracing::info!(task_id = %task.task_id, "Task completed.");
			}

			(applied, Settled::Completed)
		},
		Err(TaskError::NotFound) => {
			let message = TaskError::NotFound.to_string();
			let applied = bounded(
				timeout,
				"mark failed",
				state.tasks.mark_failed(task.task_id, attempts, &message, now),
			)
			.await?;

			tracing::warn!(
				task_id = %task.task_id,
				transaction_id = %task.transaction_id,
				"Transaction missing for task. Marking failed."
			);

			(applied, Settled::Failed)
		},
		Err(err @ TaskError::Provider(_)) => {
			let message = sanitize_task_error(&err.to_string(), redact);
			let timed_out = matches!(&err, TaskError::Provider(inner) if inner.is_timeout());

			match state.settings.retry.decide(task.attempts) {
				RetryDecision::Fail => {
					let applied = bounded(
						timeout,
						"mark failed",
						state.tasks.mark_failed(task.task_id, attempts, &message, now),
					)
					.await?;

					tracing::error!(
						error = %err,
						task_id = %task.task_id,
						attempts = task.attempts,
						timed_out,
						"Embedding failed. Attempts exhausted."
					);

					(applied, Settled::Failed)
				},
				RetryDecision::Retry => {
					let applied = bounded(
						timeout,
						"release for retry",
						state.tasks.release_for_retry(task.task_id, attempts, &message, now),
					)
					.await?;

					tracing::warn!(
						error = %err,
						task_id = %task.task_id,
						attempts = task.attempts,
						timed_out,
						"Embedding failed. Task returned to the queue."
					);

					(applied, Settled::Requeued)
				},
			}
		},
		Err(err @ TaskError::Store(_)) => {
			let message = sanitize_task_error(&err.to_string(), redact);
			let applied = bounded(
				timeout,
				"release for retry",
				state.tasks.release_for_retry(task.task_id, attempts, &message, now),
			)
			.await?;

			tracing::error!(
				error = %err,
				task_id = %task.task_id,
				"Embedding could not be stored. Task returned to the queue."
			);

			(applied, Settled::Requeued)
		},
	};

	Ok(if applied { settled } else { Settled::Lost })
}

async fn bounded<T, F>(limit: StdDuration, operation: &'static str, fut: F) -> Result<T>
where
	F: Future<Output = finvec_storage::Result<T>>,
{
	match tokio_time::timeout(limit, fut).await {
		Ok(result) => Ok(result?),
		Err(_) => Err(Error::Timeout { operation }),
	}
}

/// Normalizes a task error for storage: whitespace is collapsed, configured secrets and inline
/// credentials are replaced, and the result is capped at `MAX_TASK_ERROR_CHARS`.
fn sanitize_task_error(text: &str, secrets: &[String]) -> String {
	let mut out = text.split_whitespace().collect::<Vec<_>>().join(" ");

	for secret in secrets.iter().map(|secret| secret.trim()).filter(|secret| !secret.is_empty()) {
		out = out.replace(secret, REDACTED);
	}

	let mut words = out.split(' ').map(str::to_string).collect::<Vec<_>>();

	for idx in 0..words.len() {
		if words[idx].eq_ignore_ascii_case("bearer")
			&& let Some(next) = words.get_mut(idx + 1)
		{
			*next = REDACTED.to_string();
		}
		if let Some(sep) = words[idx].find(['=', ':'])
			&& is_credential_key(&words[idx][..sep])
		{
			words[idx] = format!("{}{REDACTED}", &words[idx][..=sep]);
		}
	}

	let mut out = words.join(" ");

	if out.chars().count() > MAX_TASK_ERROR_CHARS {
		let cut = out
			.char_indices()
			.nth(MAX_TASK_ERROR_CHARS - 3)
			.map(|(idx, _)| idx)
			.unwrap_or(out.len());

		out.truncate(cut);
		out.push_str("...");
	}

	out
}

fn is_credential_key(key: &str) -> bool {
	let key = key.to_ascii_lowercase();

	CREDENTIAL_KEYS.iter().any(|candidate| key.ends_with(candidate))
}
