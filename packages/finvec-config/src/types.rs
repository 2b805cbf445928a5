use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub on_demand: OnDemand,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
	/// Optional. Bearer token required on the admin router when set.
	pub admin_auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Worker {
	/// Upper bound on tasks claimed per run.
	pub batch_size: u32,
	/// Total attempts a task gets before it is marked failed.
	pub max_attempts: u32,
	/// Delay between scheduled runs when the worker drives its own loop.
	pub poll_interval_ms: u64,
	/// Age after which a `processing` claim is considered abandoned and requeued. Must outlast a
	/// full batch, see [`crate::validate`].
	pub stale_claim_seconds: i64,
	/// Bound on each store read or write performed for a single task.
	pub store_timeout_ms: u64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			batch_size: 10,
			max_attempts: 3,
			poll_interval_ms: 60_000,
			stale_claim_seconds: 600,
			store_timeout_ms: 5_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OnDemand {
	pub default_page_size: u32,
	pub max_page_size: u32,
	/// Number of leading vector components echoed back by single-transaction enrichment.
	pub preview_len: u32,
	/// Bound on each store read or write made while serving a request.
	pub store_timeout_ms: u64,
}
impl Default for OnDemand {
	fn default() -> Self {
		Self { default_page_size: 50, max_page_size: 500, preview_len: 5, store_timeout_ms: 5_000 }
	}
}
