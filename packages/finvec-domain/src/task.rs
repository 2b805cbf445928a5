use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
	Pending,
	Processing,
	Completed,
	Failed,
}
impl TaskStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TaskStatus {
	type Err = ParseStatusError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			_ => Err(ParseStatusError { value: raw.to_string() }),
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown enrichment task status {value:?}.")]
pub struct ParseStatusError {
	pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	/// Return the task to the queue for a later run.
	Retry,
	/// The retry budget is spent.
	Fail,
}

/// Attempt budget shared by every retryable failure. `attempts` is the counter value after the
/// claim that produced the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
}
impl RetryPolicy {
	pub fn new(max_attempts: u32) -> Self {
		Self { max_attempts: max_attempts.max(1) }
	}

	pub fn decide(&self, attempts: i32) -> RetryDecision {
		if attempts.max(0) as u32 >= self.max_attempts {
			RetryDecision::Fail
		} else {
			RetryDecision::Retry
		}
	}
}
