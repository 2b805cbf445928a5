mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, OnDemand, Postgres, Providers, Service, Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("providers.embedding.api_base", &cfg.providers.embedding.api_base),
		("providers.embedding.model", &cfg.providers.embedding.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "providers.embedding.default_headers values must be strings.".to_string(),
		});
	}
	if cfg.worker.batch_size == 0 {
		return Err(Error::Validation {
			message: "worker.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.stale_claim_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.stale_claim_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.store_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "worker.store_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if (cfg.worker.stale_claim_seconds as u64).saturating_mul(1_000) <= worst_case_batch_ms(cfg) {
		return Err(Error::Validation {
			message: format!(
				"worker.stale_claim_seconds must exceed the worst-case batch duration of {}ms.",
				worst_case_batch_ms(cfg)
			),
		});
	}
	if cfg.on_demand.default_page_size == 0 {
		return Err(Error::Validation {
			message: "on_demand.default_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.on_demand.default_page_size > cfg.on_demand.max_page_size {
		return Err(Error::Validation {
			message: "on_demand.default_page_size must be on_demand.max_page_size or less."
				.to_string(),
		});
	}
	if cfg.on_demand.store_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "on_demand.store_timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

/// Longest a claimed task can wait before its owner reaches it: every task ahead of it in the
/// batch may spend a claim touch, a fetch, an embedding call, a write and a settle.
pub fn worst_case_batch_ms(cfg: &Config) -> u64 {
	let per_task = cfg.providers.embedding.timeout_ms + 4 * cfg.worker.store_timeout_ms;

	u64::from(cfg.worker.batch_size).saturating_mul(per_task)
}

fn normalize(cfg: &mut Config) {
	if cfg
		.service
		.admin_auth_token
		.as_deref()
		.map(|token| token.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.service.admin_auth_token = None;
	}
	if !cfg.providers.embedding.path.is_empty() && !cfg.providers.embedding.path.starts_with('/') {
		cfg.providers.embedding.path = format!("/{}", cfg.providers.embedding.path);
	}

	cfg.providers.embedding.api_base =
		cfg.providers.embedding.api_base.trim_end_matches('/').to_string();
}
