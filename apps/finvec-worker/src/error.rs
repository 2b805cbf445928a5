pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures that abort a whole run (claim or sweep).
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] finvec_storage::Error),
	#[error("Store call timed out during {operation}.")]
	Timeout { operation: &'static str },
}

/// Outcome of a single task, decided before the task's status is written back.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
	#[error("transaction not found")]
	NotFound,
	#[error(transparent)]
	Provider(#[from] finvec_providers::Error),
	#[error("store failure: {0}")]
	Store(Error),
}
