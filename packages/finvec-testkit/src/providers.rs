use std::{
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use finvec_domain::BoxFuture;
use finvec_providers::{EmbeddingProvider, Error as ProviderError, Result as ProviderResult};

/// Deterministic embedding derived from the bytes of the input text.
pub struct StubEmbedding {
	pub dimensions: u32,
}
impl StubEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self { dimensions }
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, ProviderResult<Vec<f32>>> {
		Box::pin(async move { Ok(stub_vector(text, self.dimensions)) })
	}
}

/// Fails for any text containing one of the configured markers, echoing the input in the error,
/// and otherwise behaves like [`StubEmbedding`]. Every call is counted.
pub struct ScriptedEmbedding {
	dimensions: u32,
	failing_markers: Mutex<Vec<String>>,
	delay: Option<Duration>,
	calls: AtomicUsize,
}
impl ScriptedEmbedding {
	pub fn new(dimensions: u32) -> Self {
		Self {
			dimensions,
			failing_markers: Mutex::new(Vec::new()),
			delay: None,
			calls: AtomicUsize::new(0),
		}
	}

	/// Every call sleeps for `delay` before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn fail_when_contains(self, marker: &str) -> Self {
		self.lock_markers().push(marker.to_string());

		self
	}

	pub fn clear_failures(&self) {
		self.lock_markers().clear();
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn lock_markers(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
		self.failing_markers.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl EmbeddingProvider for ScriptedEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, ProviderResult<Vec<f32>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			let failing = self.lock_markers().iter().any(|marker| text.contains(marker.as_str()));

			if failing {
				return Err(ProviderError::InvalidResponse {
					message: format!("Scripted provider failure for input: {text}"),
				});
			}

			Ok(stub_vector(text, self.dimensions))
		})
	}
}

fn stub_vector(text: &str, dimensions: u32) -> Vec<f32> {
	let seed = text.bytes().fold(0_u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as u32));

	(0..dimensions).map(|idx| ((seed.wrapping_add(idx) % 1_000) as f32) / 1_000.0).collect()
}
