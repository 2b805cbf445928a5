use serde::Serialize;

use finvec_storage::models::CoverageCounts;

use crate::{EnrichmentService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageReport {
	pub total_transactions: i64,
	pub with_vector: i64,
	pub without_vector: i64,
	/// Share of transactions with a vector, in percent, rounded to two decimals.
	pub coverage_percent: f64,
}
impl From<CoverageCounts> for CoverageReport {
	fn from(counts: CoverageCounts) -> Self {
		let coverage_percent = if counts.total == 0 {
			0.0
		} else {
			let ratio = counts.with_embedding as f64 / counts.total as f64;

			(ratio * 10_000.0).round() / 100.0
		};

		Self {
			total_transactions: counts.total,
			with_vector: counts.with_embedding,
			without_vector: counts.total - counts.with_embedding,
			coverage_percent,
		}
	}
}

impl EnrichmentService {
	pub async fn coverage(&self, tenant_id: &str) -> Result<CoverageReport> {
		let tenant_id = crate::require_tenant(tenant_id)?;
		let counts =
			crate::bounded(&self.cfg, "coverage", self.transactions.coverage(tenant_id)).await?;

		Ok(counts.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn percent_is_rounded_to_two_decimals() {
		let report = CoverageReport::from(CoverageCounts { total: 3, with_embedding: 1 });

		assert_eq!(report.coverage_percent, 33.33);
		assert_eq!(report.without_vector, 2);
	}

	#[test]
	fn empty_tenant_reports_zero_percent() {
		let report = CoverageReport::from(CoverageCounts::default());

		assert_eq!(report.coverage_percent, 0.0);
		assert_eq!(report.total_transactions, 0);
	}
}
