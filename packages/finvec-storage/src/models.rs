use time::OffsetDateTime;
use uuid::Uuid;

use finvec_domain::{Direction, TaskStatus};

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentTask {
	pub task_id: Uuid,
	pub transaction_id: Uuid,
	pub status: TaskStatus,
	pub attempts: i32,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub processed_at: Option<OffsetDateTime>,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct EnrichmentTaskRow {
	pub task_id: Uuid,
	pub transaction_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub processed_at: Option<OffsetDateTime>,
	pub updated_at: OffsetDateTime,
}
impl TryFrom<EnrichmentTaskRow> for EnrichmentTask {
	type Error = Error;

	fn try_from(row: EnrichmentTaskRow) -> Result<Self, Self::Error> {
		let status = row.status.parse().map_err(|err| Error::InvalidData(format!("{err}")))?;

		Ok(Self {
			task_id: row.task_id,
			transaction_id: row.transaction_id,
			status,
			attempts: row.attempts,
			error_message: row.error_message,
			created_at: row.created_at,
			processed_at: row.processed_at,
			updated_at: row.updated_at,
		})
	}
}

/// The fields of a transaction this pipeline reads. The vector itself is never read back.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
	pub transaction_id: Uuid,
	pub tenant_id: String,
	pub description: String,
	pub counterparty_name: Option<String>,
	pub amount_minor: i64,
	pub direction: Direction,
	pub category_name: Option<String>,
	pub has_embedding: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
	pub transaction_id: Uuid,
	pub tenant_id: String,
	pub description: String,
	pub counterparty_name: Option<String>,
	pub amount_minor: i64,
	pub direction: String,
	pub category_name: Option<String>,
	pub has_embedding: bool,
	pub created_at: OffsetDateTime,
}
impl TryFrom<TransactionRow> for TransactionRecord {
	type Error = Error;

	fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
		let direction = row.direction.parse().map_err(|err| Error::InvalidData(format!("{err}")))?;

		Ok(Self {
			transaction_id: row.transaction_id,
			tenant_id: row.tenant_id,
			description: row.description,
			counterparty_name: row.counterparty_name,
			amount_minor: row.amount_minor,
			direction,
			category_name: row.category_name,
			has_embedding: row.has_embedding,
			created_at: row.created_at,
		})
	}
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
	pub transaction_id: Uuid,
	pub tenant_id: String,
	pub description: String,
	pub counterparty_name: Option<String>,
	pub amount_minor: i64,
	pub direction: Direction,
	pub category_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverageCounts {
	pub total: i64,
	pub with_embedding: i64,
}
