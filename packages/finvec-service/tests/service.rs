use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use finvec_config::OnDemand;
use finvec_domain::Direction;
use finvec_providers::EmbeddingProvider;
use finvec_service::{EnqueueRequest, EnrichBatchRequest, EnrichStatus, EnrichmentService, Error};
use finvec_testkit::{MemoryStore, ScriptedEmbedding, StubEmbedding, sample_transaction};

const DIM: u32 = 6;

fn on_demand() -> OnDemand {
	OnDemand { default_page_size: 50, max_page_size: 3, preview_len: 4, store_timeout_ms: 50 }
}

fn service(store: &Arc<MemoryStore>, embedding: Arc<dyn EmbeddingProvider>) -> EnrichmentService {
	EnrichmentService::new(on_demand(), store.clone(), store.clone(), embedding)
}

fn insert(store: &MemoryStore, tenant_id: &str, description: &str, age_minutes: i64) -> Uuid {
	let record = sample_transaction(
		tenant_id,
		description,
		None,
		-2_500,
		Direction::Expense,
		OffsetDateTime::now_utc() - Duration::minutes(age_minutes),
	);
	let transaction_id = record.transaction_id;

	store.insert_transaction(record);

	transaction_id
}

#[tokio::test]
async fn coverage_of_empty_tenant_is_zero() {
	let store = Arc::new(MemoryStore::new());
	let report = service(&store, Arc::new(StubEmbedding::new(DIM)))
		.coverage("tenant-a")
		.await
		.expect("Coverage failed.");

	assert_eq!(report.total_transactions, 0);
	assert_eq!(report.with_vector, 0);
	assert_eq!(report.without_vector, 0);
	assert_eq!(report.coverage_percent, 0.0);
}

#[tokio::test]
async fn coverage_counts_add_up_after_enrichment() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let first = insert(&store, "tenant-a", "Bakery", 3);

	insert(&store, "tenant-a", "Cinema", 2);
	insert(&store, "tenant-a", "Taxi", 1);
	insert(&store, "tenant-b", "Elsewhere", 1);

	svc.enrich_one("tenant-a", first).await.expect("Enrichment failed.");

	let report = svc.coverage("tenant-a").await.expect("Coverage failed.");

	assert_eq!(report.total_transactions, 3);
	assert_eq!(report.with_vector, 1);
	assert_eq!(report.with_vector + report.without_vector, report.total_transactions);
	assert_eq!(report.coverage_percent, 33.33);
}

#[tokio::test]
async fn enrich_one_for_unknown_transaction_fails_without_creating_a_task() {
	let store = Arc::new(MemoryStore::new());
	let embedding = Arc::new(ScriptedEmbedding::new(DIM));
	let svc = service(&store, embedding.clone());
	let response = svc.enrich_one("tenant-a", Uuid::new_v4()).await.expect("Call failed.");

	assert_eq!(response.status, EnrichStatus::Failed);
	assert_eq!(response.detail.as_deref(), Some("transaction not found"));
	assert!(store.tasks().is_empty());
	assert_eq!(embedding.calls(), 0);
}

#[tokio::test]
async fn enrich_one_does_not_cross_tenants() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let foreign = insert(&store, "tenant-b", "Private", 1);
	let response = svc.enrich_one("tenant-a", foreign).await.expect("Call failed.");

	assert_eq!(response.status, EnrichStatus::Failed);
	assert!(store.embedding(foreign).is_none());
}

#[tokio::test]
async fn enrich_one_stores_vector_and_leaves_tasks_alone() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let transaction_id = insert(&store, "tenant-a", "Grocery run", 1);
	let before = store.tasks();
	let response = svc.enrich_one("tenant-a", transaction_id).await.expect("Call failed.");

	assert_eq!(response.status, EnrichStatus::Success);
	assert_eq!(response.dimensions, Some(DIM as usize));
	assert_eq!(response.preview.len(), 4);
	assert!(response.text.as_deref().is_some_and(|text| text.contains("uncategorized")));
	assert_eq!(store.embedding(transaction_id).map(|vector| vector.len()), Some(DIM as usize));
	assert_eq!(store.tasks(), before);

	// A second call overwrites rather than skipping.
	let again = svc.enrich_one("tenant-a", transaction_id).await.expect("Call failed.");

	assert_eq!(again.status, EnrichStatus::Success);
}

#[tokio::test]
async fn enrich_one_reports_provider_failure() {
	let store = Arc::new(MemoryStore::new());
	let embedding = Arc::new(ScriptedEmbedding::new(DIM).fail_when_contains("Outage"));
	let svc = service(&store, embedding);
	let transaction_id = insert(&store, "tenant-a", "Outage", 1);
	let response = svc.enrich_one("tenant-a", transaction_id).await.expect("Call failed.");

	assert_eq!(response.status, EnrichStatus::Failed);
	assert!(response.detail.is_some());
	assert!(store.embedding(transaction_id).is_none());
}

#[tokio::test]
async fn enrich_batch_isolates_item_failures_and_clamps_page_size() {
	let store = Arc::new(MemoryStore::new());
	let embedding = Arc::new(ScriptedEmbedding::new(DIM).fail_when_contains("Broken"));
	let svc = service(&store, embedding);

	insert(&store, "tenant-a", "Oldest", 10);
	insert(&store, "tenant-a", "Older", 4);

	let broken = insert(&store, "tenant-a", "Broken", 3);
	let newer = insert(&store, "tenant-a", "Newer", 2);
	let newest = insert(&store, "tenant-a", "Newest", 1);
	let response = svc
		.enrich_batch("tenant-a", EnrichBatchRequest { skip_existing: true, page_size: Some(99) })
		.await
		.expect("Batch failed.");

	assert_eq!(response.total, 3);
	assert_eq!((response.processed, response.failed), (2, 1));
	assert_eq!(
		response.items.iter().map(|item| item.transaction_id).collect::<Vec<_>>(),
		[newest, newer, broken]
	);

	let failed = &response.items[2];

	assert_eq!(failed.status, EnrichStatus::Failed);
	assert!(failed.detail.is_some());
	assert!(store.tasks().iter().all(|task| task.attempts == 0));
}

#[tokio::test]
async fn enrich_batch_with_nothing_to_do_returns_message() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let transaction_id = insert(&store, "tenant-a", "Done already", 1);

	svc.enrich_one("tenant-a", transaction_id).await.expect("Call failed.");

	let response = svc
		.enrich_batch("tenant-a", EnrichBatchRequest::default())
		.await
		.expect("Batch failed.");

	assert_eq!(response.total, 0);
	assert!(response.items.is_empty());
	assert!(response.message.is_some());

	let everything = svc
		.enrich_batch("tenant-a", EnrichBatchRequest { skip_existing: false, page_size: None })
		.await
		.expect("Batch failed.");

	assert_eq!(everything.total, 1);
	assert_eq!(everything.processed, 1);
}

#[tokio::test]
async fn stalled_embedding_writes_fail_each_item_instead_of_hanging() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let first = insert(&store, "tenant-a", "Stuck write", 2);

	insert(&store, "tenant-a", "Also stuck", 1);
	store.stall_embedding_writes(true);

	let one = tokio::time::timeout(StdDuration::from_secs(2), svc.enrich_one("tenant-a", first))
		.await
		.expect("Single enrichment hung.")
		.expect("Call failed.");

	assert_eq!(one.status, EnrichStatus::Failed);
	assert!(
		one.detail.as_deref().is_some_and(|detail| detail.contains("timed out")),
		"Unexpected detail: {:?}",
		one.detail
	);

	let batch = tokio::time::timeout(
		StdDuration::from_secs(2),
		svc.enrich_batch("tenant-a", EnrichBatchRequest::default()),
	)
	.await
	.expect("Batch enrichment hung.")
	.expect("Batch failed.");

	assert_eq!((batch.total, batch.processed, batch.failed), (2, 0, 2));
	assert!(batch.items.iter().all(|item| item.status == EnrichStatus::Failed));

	store.stall_embedding_writes(false);

	let recovered = svc.enrich_one("tenant-a", first).await.expect("Call failed.");

	assert_eq!(recovered.status, EnrichStatus::Success);
}

#[tokio::test]
async fn enqueue_missing_skips_transactions_with_open_tasks() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let imported = sample_transaction(
		"tenant-a",
		"Imported",
		Some("Travel"),
		-9_900,
		Direction::Expense,
		OffsetDateTime::now_utc(),
	);
	let imported_id = imported.transaction_id;

	insert(&store, "tenant-a", "Queued", 1);
	store.insert_untracked(imported);
	store.insert_untracked(sample_transaction(
		"tenant-b",
		"Other tenant",
		None,
		100,
		Direction::Income,
		OffsetDateTime::now_utc(),
	));

	let response = svc
		.enqueue_missing("tenant-a", EnqueueRequest::default())
		.await
		.expect("Enqueue failed.");

	assert_eq!(response.enqueued, 1);
	assert_eq!(store.tasks().len(), 2);
	assert!(store.tasks().iter().any(|task| task.transaction_id == imported_id));

	let again = svc
		.enqueue_missing("tenant-a", EnqueueRequest::default())
		.await
		.expect("Enqueue failed.");

	assert_eq!(again.enqueued, 0);
}

#[tokio::test]
async fn blank_tenant_is_rejected() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));
	let err = svc.coverage("  ").await.expect_err("Expected a validation error.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn unavailable_store_propagates_coverage_error() {
	let store = Arc::new(MemoryStore::new());
	let svc = service(&store, Arc::new(StubEmbedding::new(DIM)));

	store.set_unavailable(true);

	let err = svc.coverage("tenant-a").await.expect_err("Expected a storage error.");

	assert!(matches!(err, Error::Storage { .. }));
}
