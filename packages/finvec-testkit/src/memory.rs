use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use finvec_domain::{BoxFuture, Direction, TaskStatus};
use finvec_storage::{
	Error as StorageError, Result as StorageResult, TaskStore, TransactionStore,
	models::{CoverageCounts, EnrichmentTask, TransactionRecord},
};

/// In-process arena that honors the same contracts as the Postgres store: claims are atomic under
/// one lock and every post-claim transition requires the task to still be `processing` under the
/// claim's `attempts` value.
#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
	tasks: HashMap<Uuid, EnrichmentTask>,
	transactions: HashMap<Uuid, StoredTransaction>,
	fail_embedding_writes: bool,
	stall_embedding_writes: bool,
	unavailable: bool,
}

struct StoredTransaction {
	record: TransactionRecord,
	embedding: Option<Vec<f32>>,
}
impl StoredTransaction {
	fn snapshot(&self) -> TransactionRecord {
		TransactionRecord { has_embedding: self.embedding.is_some(), ..self.record.clone() }
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores the transaction and, when it carries no vector, enqueues a pending task for it.
	pub fn insert_transaction(&self, record: TransactionRecord) -> Option<Uuid> {
		let created_at = record.created_at;
		let transaction_id = record.transaction_id;
		let needs_task = !record.has_embedding;
		let embedding = record.has_embedding.then(|| vec![1.0]);
		let mut state = self.lock();

		state.transactions.insert(transaction_id, StoredTransaction { record, embedding });

		needs_task.then(|| enqueue_locked(&mut state, transaction_id, created_at))
	}

	/// Stores the transaction without touching the queue, as a bulk import would.
	pub fn insert_untracked(&self, record: TransactionRecord) {
		let embedding = record.has_embedding.then(|| vec![1.0]);

		self.lock()
			.transactions
			.insert(record.transaction_id, StoredTransaction { record, embedding });
	}

	pub fn remove_transaction(&self, transaction_id: Uuid) -> bool {
		self.lock().transactions.remove(&transaction_id).is_some()
	}

	pub fn task(&self, task_id: Uuid) -> Option<EnrichmentTask> {
		self.lock().tasks.get(&task_id).cloned()
	}

	pub fn tasks(&self) -> Vec<EnrichmentTask> {
		let mut tasks = self.lock().tasks.values().cloned().collect::<Vec<_>>();

		tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.task_id.cmp(&b.task_id)));

		tasks
	}

	pub fn embedding(&self, transaction_id: Uuid) -> Option<Vec<f32>> {
		self.lock().transactions.get(&transaction_id).and_then(|stored| stored.embedding.clone())
	}

	/// Seeds the attempt counter of a pending task, as if earlier runs had already failed it.
	pub fn seed_attempts(&self, task_id: Uuid, attempts: i32) {
		if let Some(task) = self.lock().tasks.get_mut(&task_id) {
			task.attempts = attempts;
		}
	}

	/// Backdates a task's `updated_at`, e.g. to simulate a claim abandoned by a crashed worker.
	pub fn backdate(&self, task_id: Uuid, updated_at: OffsetDateTime) {
		if let Some(task) = self.lock().tasks.get_mut(&task_id) {
			task.updated_at = updated_at;
		}
	}

	pub fn fail_embedding_writes(&self, fail: bool) {
		self.lock().fail_embedding_writes = fail;
	}

	/// Makes `store_embedding` hang forever, like a write stuck behind a lock.
	pub fn stall_embedding_writes(&self, stall: bool) {
		self.lock().stall_embedding_writes = stall;
	}

	pub fn set_unavailable(&self, unavailable: bool) {
		self.lock().unavailable = unavailable;
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn available(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
		let state = self.lock();

		if state.unavailable {
			return Err(StorageError::Sqlx(sqlx::Error::PoolTimedOut));
		}

		Ok(state)
	}

	fn transition(
		&self,
		task_id: Uuid,
		attempts: i32,
		apply: impl FnOnce(&mut EnrichmentTask),
	) -> StorageResult<bool> {
		let mut state = self.available()?;
		let Some(task) = state.tasks.get_mut(&task_id) else {
			return Ok(false);
		};

		if task.status != TaskStatus::Processing || task.attempts != attempts {
			return Ok(false);
		}

		apply(task);

		Ok(true)
	}
}

impl TaskStore for MemoryStore {
	fn enqueue<'a>(
		&'a self,
		transaction_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Uuid>> {
		Box::pin(async move {
			let mut state = self.available()?;

			Ok(enqueue_locked(&mut state, transaction_id, now))
		})
	}

	fn enqueue_missing<'a>(
		&'a self,
		tenant_id: &'a str,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<u64>> {
		Box::pin(async move {
			let mut state = self.available()?;
			let mut candidates = state
				.transactions
				.values()
				.filter(|stored| stored.record.tenant_id == tenant_id && stored.embedding.is_none())
				.map(|stored| (stored.record.created_at, stored.record.transaction_id))
				.filter(|(_, transaction_id)| open_task(&state, *transaction_id).is_none())
				.collect::<Vec<_>>();

			candidates.sort();
			candidates.truncate(limit as usize);

			for (_, transaction_id) in &candidates {
				enqueue_locked(&mut state, *transaction_id, now);
			}

			Ok(candidates.len() as u64)
		})
	}

	fn claim_pending<'a>(
		&'a self,
		limit: u32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Vec<EnrichmentTask>>> {
		Box::pin(async move {
			let mut state = self.available()?;
			let mut pending = state
				.tasks
				.values()
				.filter(|task| task.status == TaskStatus::Pending)
				.map(|task| (task.created_at, task.task_id))
				.collect::<Vec<_>>();

			pending.sort();
			pending.truncate(limit as usize);

			let mut claimed = Vec::with_capacity(pending.len());

			for (_, task_id) in pending {
				if let Some(task) = state.tasks.get_mut(&task_id) {
					task.status = TaskStatus::Processing;
					task.attempts += 1;
					task.updated_at = now;

					claimed.push(task.clone());
				}
			}

			Ok(claimed)
		})
	}

	fn touch_claim<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move { self.transition(task_id, attempts, |task| task.updated_at = now) })
	}

	fn mark_completed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move {
			self.transition(task_id, attempts, |task| {
				task.status = TaskStatus::Completed;
				task.error_message = None;
				task.processed_at = Some(now);
				task.updated_at = now;
			})
		})
	}

	fn release_for_retry<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move {
			self.transition(task_id, attempts, |task| {
				task.status = TaskStatus::Pending;
				task.error_message = Some(error_message.to_string());
				task.updated_at = now;
			})
		})
	}

	fn mark_failed<'a>(
		&'a self,
		task_id: Uuid,
		attempts: i32,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move {
			self.transition(task_id, attempts, |task| {
				task.status = TaskStatus::Failed;
				task.error_message = Some(error_message.to_string());
				task.updated_at = now;
			})
		})
	}

	fn requeue_stale<'a>(
		&'a self,
		claimed_before: OffsetDateTime,
		error_message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<u64>> {
		Box::pin(async move {
			let mut state = self.available()?;
			let mut requeued = 0;

			for task in state.tasks.values_mut() {
				if task.status == TaskStatus::Processing && task.updated_at < claimed_before {
					task.status = TaskStatus::Pending;
					task.error_message = Some(error_message.to_string());
					task.updated_at = now;
					requeued += 1;
				}
			}

			Ok(requeued)
		})
	}

	fn get<'a>(&'a self, task_id: Uuid) -> BoxFuture<'a, StorageResult<Option<EnrichmentTask>>> {
		Box::pin(async move { Ok(self.available()?.tasks.get(&task_id).cloned()) })
	}
}

impl TransactionStore for MemoryStore {
	fn fetch<'a>(
		&'a self,
		transaction_id: Uuid,
	) -> BoxFuture<'a, StorageResult<Option<TransactionRecord>>> {
		Box::pin(async move {
			let state = self.available()?;

			Ok(state.transactions.get(&transaction_id).map(StoredTransaction::snapshot))
		})
	}

	fn list_for_enrichment<'a>(
		&'a self,
		tenant_id: &'a str,
		skip_existing: bool,
		limit: u32,
	) -> BoxFuture<'a, StorageResult<Vec<TransactionRecord>>> {
		Box::pin(async move {
			let state = self.available()?;
			let mut records = state
				.transactions
				.values()
				.filter(|stored| stored.record.tenant_id == tenant_id)
				.filter(|stored| !skip_existing || stored.embedding.is_none())
				.map(StoredTransaction::snapshot)
				.collect::<Vec<_>>();

			records.sort_by(|a, b| {
				b.created_at.cmp(&a.created_at).then(b.transaction_id.cmp(&a.transaction_id))
			});
			records.truncate(limit as usize);

			Ok(records)
		})
	}

	fn store_embedding<'a>(
		&'a self,
		transaction_id: Uuid,
		vector: &'a [f32],
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(async move {
			let stalled = self.lock().stall_embedding_writes;

			if stalled {
				std::future::pending::<()>().await;
			}

			let mut state = self.available()?;

			if state.fail_embedding_writes {
				return Err(StorageError::Sqlx(sqlx::Error::PoolTimedOut));
			}

			let Some(stored) = state.transactions.get_mut(&transaction_id) else {
				return Ok(false);
			};

			stored.embedding = Some(vector.to_vec());

			Ok(true)
		})
	}

	fn coverage<'a>(&'a self, tenant_id: &'a str) -> BoxFuture<'a, StorageResult<CoverageCounts>> {
		Box::pin(async move {
			let state = self.available()?;
			let mut counts = CoverageCounts::default();

			for stored in state.transactions.values().filter(|s| s.record.tenant_id == tenant_id) {
				counts.total += 1;

				if stored.embedding.is_some() {
					counts.with_embedding += 1;
				}
			}

			Ok(counts)
		})
	}
}

pub fn sample_transaction(
	tenant_id: &str,
	description: &str,
	category_name: Option<&str>,
	amount_minor: i64,
	direction: Direction,
	created_at: OffsetDateTime,
) -> TransactionRecord {
	TransactionRecord {
		transaction_id: Uuid::new_v4(),
		tenant_id: tenant_id.to_string(),
		description: description.to_string(),
		counterparty_name: None,
		amount_minor,
		direction,
		category_name: category_name.map(str::to_string),
		has_embedding: false,
		created_at,
	}
}

fn open_task(state: &MemoryState, transaction_id: Uuid) -> Option<Uuid> {
	state
		.tasks
		.values()
		.find(|task| {
			task.transaction_id == transaction_id
				&& matches!(task.status, TaskStatus::Pending | TaskStatus::Processing)
		})
		.map(|task| task.task_id)
}

fn enqueue_locked(state: &mut MemoryState, transaction_id: Uuid, now: OffsetDateTime) -> Uuid {
	if let Some(task_id) = open_task(state, transaction_id) {
		return task_id;
	}

	let task_id = Uuid::new_v4();

	state.tasks.insert(
		task_id,
		EnrichmentTask {
			task_id,
			transaction_id,
			status: TaskStatus::Pending,
			attempts: 0,
			error_message: None,
			created_at: now,
			processed_at: None,
			updated_at: now,
		},
	);

	task_id
}
