use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};

use finvec_config::EmbeddingProviderConfig;
use finvec_providers::{EmbeddingProvider, embedding::HttpEmbedding};

fn unreachable_provider() -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "test".to_string(),
		dimensions: 3,
		timeout_ms: 500,
		default_headers: Map::new(),
	}
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		finvec_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut defaults = Map::new();

	defaults.insert("X-Org".to_string(), Value::from(7));

	let err = finvec_providers::auth_headers("secret", &defaults)
		.expect_err("Expected invalid header config error.");

	assert!(err.to_string().contains("must be strings"), "Unexpected error: {err}");
}

#[tokio::test]
async fn unreachable_provider_returns_error_instead_of_panicking() {
	let provider = HttpEmbedding::new(&unreachable_provider()).expect("Failed to build provider.");
	let result = provider.embed("Transaction: Rent. Category: Housing.").await;

	assert!(result.is_err());
}
