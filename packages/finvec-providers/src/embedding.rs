use std::time::Duration;

use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};

use finvec_config::EmbeddingProviderConfig;
use finvec_domain::BoxFuture;

use crate::{EmbeddingProvider, Error, Result};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
	model: &'a str,
	input: [&'a str; 1],
	dimensions: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	#[serde(default)]
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client. The whole request, connect included, is bounded by
/// `timeout_ms`.
pub struct HttpEmbedding {
	client: Client,
	headers: HeaderMap,
	url: String,
	model: String,
	dimensions: u32,
}
impl HttpEmbedding {
	pub fn new(cfg: &EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
		let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;

		Ok(Self {
			client,
			headers,
			url: format!("{}{}", cfg.api_base, cfg.path),
			model: cfg.model.clone(),
			dimensions: cfg.dimensions,
		})
	}

	pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
		let body =
			EmbeddingRequest { model: &self.model, input: [text], dimensions: self.dimensions };
		let res = self
			.client
			.post(&self.url)
			.headers(self.headers.clone())
			.json(&body)
			.send()
			.await?;
		let bytes = res.error_for_status()?.bytes().await?;
		let vector = first_embedding(&bytes)?;

		validate_dimensions(&vector, self.dimensions)?;

		Ok(vector)
	}
}

impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(self.embed_text(text))
	}
}

pub fn validate_dimensions(vector: &[f32], expected: u32) -> Result<()> {
	if vector.len() != expected as usize {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding dimension {} does not match configured dimensions {expected}.",
				vector.len()
			),
		});
	}
	if vector.iter().any(|value| !value.is_finite()) {
		return Err(Error::InvalidResponse {
			message: "Embedding vector contains a non-finite value.".to_string(),
		});
	}

	Ok(())
}

/// Picks the vector answering the single input of a request. `index` is optional in some
/// compatible servers; without it, the position in `data` is used.
fn first_embedding(body: &[u8]) -> Result<Vec<f32>> {
	let response = serde_json::from_slice::<EmbeddingResponse>(body).map_err(|err| {
		Error::InvalidResponse { message: format!("Malformed embedding response: {err}.") }
	})?;

	response
		.data
		.into_iter()
		.enumerate()
		.min_by_key(|(position, item)| item.index.unwrap_or(*position))
		.map(|(_, item)| item.embedding)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Embedding provider returned no vectors.".to_string(),
		})
}
