use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
	Result, tasks,
	db::Db,
	models::{CoverageCounts, NewTransaction, TransactionRecord, TransactionRow},
};

const TRANSACTION_SELECT: &str = "\
SELECT
\tt.transaction_id,
\tt.tenant_id,
\tt.description,
\tt.counterparty_name,
\tt.amount_minor,
\tt.direction,
\tc.name AS category_name,
\t(t.embedding IS NOT NULL) AS has_embedding,
\tt.created_at
FROM transactions t
LEFT JOIN categories c ON c.category_id = t.category_id";

/// Inserts a transaction and, in the same database transaction, enqueues its enrichment task.
pub async fn insert_transaction(db: &Db, new: &NewTransaction) -> Result<Uuid> {
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO transactions (
\ttransaction_id,
\ttenant_id,
\tdescription,
\tcounterparty_name,
\tamount_minor,
\tdirection,
\tcategory_id,
\tcreated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
	)
	.bind(new.transaction_id)
	.bind(new.tenant_id.as_str())
	.bind(new.description.as_str())
	.bind(new.counterparty_name.as_deref())
	.bind(new.amount_minor)
	.bind(new.direction.as_str())
	.bind(new.category_id)
	.bind(new.created_at)
	.execute(&mut *tx)
	.await?;

	let task_id = tasks::enqueue_task(&mut *tx, new.transaction_id, new.created_at).await?;

	tx.commit().await?;

	Ok(task_id)
}

pub async fn insert_category<'e, E>(
	executor: E,
	category_id: Uuid,
	tenant_id: &str,
	name: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("INSERT INTO categories (category_id, tenant_id, name) VALUES ($1, $2, $3)")
		.bind(category_id)
		.bind(tenant_id)
		.bind(name)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn delete_transaction<'e, E>(executor: E, transaction_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM transactions WHERE transaction_id = $1")
		.bind(transaction_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn fetch_transaction<'e, E>(
	executor: E,
	transaction_id: Uuid,
) -> Result<Option<TransactionRecord>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("{TRANSACTION_SELECT}\nWHERE t.transaction_id = $1");
	let row = sqlx::query_as::<_, TransactionRow>(&sql)
		.bind(transaction_id)
		.fetch_optional(executor)
		.await?;

	row.map(TransactionRecord::try_from).transpose()
}

/// Most recently created transactions of a tenant, optionally only those without a vector.
pub async fn list_for_enrichment<'e, E>(
	executor: E,
	tenant_id: &str,
	skip_existing: bool,
	limit: u32,
) -> Result<Vec<TransactionRecord>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"{TRANSACTION_SELECT}
WHERE t.tenant_id = $1
\tAND (NOT $2 OR t.embedding IS NULL)
ORDER BY t.created_at DESC, t.transaction_id DESC
LIMIT $3"
	);
	let rows = sqlx::query_as::<_, TransactionRow>(&sql)
		.bind(tenant_id)
		.bind(skip_existing)
		.bind(i64::from(limit))
		.fetch_all(executor)
		.await?;

	rows.into_iter().map(TransactionRecord::try_from).collect()
}

/// Writes the vector onto the transaction row. Returns `false` when the transaction is gone.
pub async fn store_embedding<'e, E>(
	executor: E,
	transaction_id: Uuid,
	vector: &[f32],
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let vec_text = format_vector_text(vector);
	let result = sqlx::query(
		"UPDATE transactions SET embedding = $1::text::vector WHERE transaction_id = $2",
	)
	.bind(vec_text.as_str())
	.bind(transaction_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn coverage_counts<'e, E>(executor: E, tenant_id: &str) -> Result<CoverageCounts>
where
	E: PgExecutor<'e>,
{
	let (total, with_embedding): (i64, i64) = sqlx::query_as(
		"SELECT count(*), count(embedding) FROM transactions WHERE tenant_id = $1",
	)
	.bind(tenant_id)
	.fetch_one(executor)
	.await?;

	Ok(CoverageCounts { total, with_embedding })
}

pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8 + 2);

	out.push('[');

	for (idx, value) in vec.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}
