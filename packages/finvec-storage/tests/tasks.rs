use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use finvec_config::Postgres;
use finvec_domain::{Direction, TaskStatus};
use finvec_storage::{
	TaskStore, TransactionStore,
	db::Db,
	models::NewTransaction,
	tasks, transactions,
};
use finvec_testkit::TestDatabase;

const DIM: u32 = 3;

async fn setup(test_name: &str) -> Option<(TestDatabase, Db)> {
	let Some(base_dsn) = finvec_testkit::env_dsn() else {
		eprintln!("Skipping {test_name}; set FINVEC_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(DIM).await.expect("Failed to ensure schema.");

	Some((test_db, db))
}

fn new_transaction(tenant_id: &str, created_at: OffsetDateTime) -> NewTransaction {
	NewTransaction {
		transaction_id: Uuid::new_v4(),
		tenant_id: tenant_id.to_string(),
		description: "Coffee beans".to_string(),
		counterparty_name: Some("Roastery".to_string()),
		amount_minor: -1_250,
		direction: Direction::Expense,
		category_id: None,
		created_at,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn inserting_a_transaction_enqueues_one_pending_task() {
	let Some((test_db, db)) = setup("inserting_a_transaction_enqueues_one_pending_task").await
	else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let category_id = Uuid::new_v4();
	let new = NewTransaction { category_id: Some(category_id), ..new_transaction("t1", now) };

	transactions::insert_category(&db.pool, category_id, "t1", "Coffee")
		.await
		.expect("Failed to insert category.");

	let task_id =
		transactions::insert_transaction(&db, &new).await.expect("Failed to insert transaction.");
	let task = db.get(task_id).await.expect("Failed to load task.").expect("Missing task.");

	assert_eq!(task.transaction_id, new.transaction_id);
	assert_eq!(task.status, TaskStatus::Pending);
	assert_eq!(task.attempts, 0);
	assert!(task.error_message.is_none());

	let record = db
		.fetch(new.transaction_id)
		.await
		.expect("Failed to fetch transaction.")
		.expect("Missing transaction.");

	assert_eq!(record.category_name.as_deref(), Some("Coffee"));
	assert_eq!(record.direction, Direction::Expense);
	assert!(!record.has_embedding);

	let again = db.enqueue(new.transaction_id, now).await.expect("Failed to enqueue.");

	assert_eq!(again, task_id);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn claims_are_fifo_and_exclusive() {
	let Some((test_db, db)) = setup("claims_are_fifo_and_exclusive").await else {
		return;
	};
	let base = OffsetDateTime::now_utc() - Duration::minutes(10);
	let mut expected = Vec::new();

	for offset in 0..6 {
		let new = new_transaction("t1", base + Duration::seconds(offset));

		expected.push(
			transactions::insert_transaction(&db, &new)
				.await
				.expect("Failed to insert transaction."),
		);
	}

	let now = OffsetDateTime::now_utc();
	let first = db.claim_pending(2, now).await.expect("Failed to claim.");

	assert_eq!(first.iter().map(|task| task.task_id).collect::<Vec<_>>(), expected[..2]);
	assert!(first.iter().all(|task| task.status == TaskStatus::Processing && task.attempts == 1));

	let (left, right) = tokio::join!(db.claim_pending(3, now), db.claim_pending(3, now));
	let mut claimed = left.expect("Failed to claim.");

	claimed.extend(right.expect("Failed to claim."));

	let mut ids = claimed.iter().map(|task| task.task_id).collect::<Vec<_>>();

	ids.sort();
	ids.dedup();

	assert_eq!(ids.len(), claimed.len(), "A task was claimed twice.");
	assert_eq!(ids.len(), 4);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn transitions_require_processing_status() {
	let Some((test_db, db)) = setup("transitions_require_processing_status").await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let task_id = transactions::insert_transaction(&db, &new_transaction("t1", now))
		.await
		.expect("Failed to insert transaction.");

	assert!(!db.mark_completed(task_id, 0, now).await.expect("Failed to complete."));

	let claimed = db.claim_pending(1, now).await.expect("Failed to claim.");
	let attempts = claimed[0].attempts;

	assert!(db.touch_claim(task_id, attempts, now).await.expect("Failed to touch."));
	assert!(db.mark_completed(task_id, attempts, now).await.expect("Failed to complete."));
	assert!(!db.mark_completed(task_id, attempts, now).await.expect("Failed to complete."));
	assert!(!db.mark_failed(task_id, attempts, "late", now).await.expect("Failed to fail."));
	assert!(!db.touch_claim(task_id, attempts, now).await.expect("Failed to touch."));

	let task = db.get(task_id).await.expect("Failed to load task.").expect("Missing task.");

	assert_eq!(task.status, TaskStatus::Completed);
	assert_eq!(task.processed_at, Some(task.updated_at));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn stale_claims_return_to_pending_without_resetting_attempts() {
	let test_name = "stale_claims_return_to_pending_without_resetting_attempts";
	let Some((test_db, db)) = setup(test_name).await else {
		return;
	};
	let claimed_at = OffsetDateTime::now_utc() - Duration::hours(1);
	let task_id = transactions::insert_transaction(&db, &new_transaction("t1", claimed_at))
		.await
		.expect("Failed to insert transaction.");

	db.claim_pending(1, claimed_at).await.expect("Failed to claim.");

	let now = OffsetDateTime::now_utc();
	let requeued = tasks::requeue_stale_tasks(
		&db.pool,
		now - Duration::minutes(10),
		"claim expired",
		now,
	)
	.await
	.expect("Failed to requeue.");
	let task = db.get(task_id).await.expect("Failed to load task.").expect("Missing task.");

	assert_eq!(requeued, 1);
	assert_eq!(task.status, TaskStatus::Pending);
	assert_eq!(task.attempts, 1);
	assert_eq!(task.error_message.as_deref(), Some("claim expired"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn superseded_claims_cannot_settle_the_task() {
	let Some((test_db, db)) = setup("superseded_claims_cannot_settle_the_task").await else {
		return;
	};
	let claimed_at = OffsetDateTime::now_utc() - Duration::hours(1);
	let task_id = transactions::insert_transaction(&db, &new_transaction("t1", claimed_at))
		.await
		.expect("Failed to insert transaction.");
	let first = db.claim_pending(1, claimed_at).await.expect("Failed to claim.");
	let now = OffsetDateTime::now_utc();

	db.requeue_stale(now - Duration::minutes(10), "claim expired", now)
		.await
		.expect("Failed to requeue.");

	let second = db.claim_pending(1, now).await.expect("Failed to claim.");

	assert_eq!((first[0].attempts, second[0].attempts), (1, 2));
	assert!(!db.touch_claim(task_id, 1, now).await.expect("Failed to touch."));
	assert!(!db.mark_completed(task_id, 1, now).await.expect("Failed to complete."));
	assert!(!db.release_for_retry(task_id, 1, "late", now).await.expect("Failed to release."));

	let task = db.get(task_id).await.expect("Failed to load task.").expect("Missing task.");

	assert_eq!(task.status, TaskStatus::Processing);
	assert_eq!(task.attempts, 2);
	assert!(db.mark_completed(task_id, 2, now).await.expect("Failed to complete."));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set FINVEC_PG_DSN to run."]
async fn embeddings_feed_coverage_and_missing_enqueue() {
	let Some((test_db, db)) = setup("embeddings_feed_coverage_and_missing_enqueue").await else {
		return;
	};
	let now = OffsetDateTime::now_utc();
	let first = new_transaction("t1", now);
	let second = new_transaction("t1", now + Duration::seconds(1));
	let other_tenant = new_transaction("t2", now);

	for new in [&first, &second, &other_tenant] {
		transactions::insert_transaction(&db, new).await.expect("Failed to insert transaction.");
	}

	assert!(
		db.store_embedding(first.transaction_id, &[0.1, 0.2, 0.3])
			.await
			.expect("Failed to store embedding.")
	);
	assert!(!db.store_embedding(Uuid::new_v4(), &[0.1, 0.2, 0.3]).await.expect("Store failed."));

	let counts = db.coverage("t1").await.expect("Failed to count coverage.");

	assert_eq!((counts.total, counts.with_embedding), (2, 1));

	let listed = db.list_for_enrichment("t1", true, 10).await.expect("Failed to list.");

	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].transaction_id, second.transaction_id);
	assert!(!listed[0].has_embedding);

	// Both open tasks still exist, so nothing new is enqueued.
	assert_eq!(db.enqueue_missing("t1", 10, now).await.expect("Failed to enqueue."), 0);

	transactions::delete_transaction(&db.pool, second.transaction_id)
		.await
		.expect("Failed to delete transaction.");

	assert!(db.fetch(second.transaction_id).await.expect("Failed to fetch.").is_none());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
