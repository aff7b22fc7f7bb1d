//! Disposable Qdrant collections for integration tests.

mod error;

pub use error::{Error, Result};

use std::{collections::HashMap, env, thread, time::Duration};

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{
		CreateCollectionBuilder, Distance, Document, Modifier, PointStruct,
		SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Vector,
		VectorParamsBuilder, VectorsConfigBuilder,
	},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

use kbr_storage::{
	payload::{PAYLOAD_CHUNK_ID, PAYLOAD_DOCUMENT_ID, PAYLOAD_KNOWLEDGE_ID, PAYLOAD_TEXT},
	qdrant::{BM25_MODEL, BM25_VECTOR_NAME, DENSE_VECTOR_NAME},
};

const QDRANT_TIMEOUT: Duration = Duration::from_secs(10);

/// A chunk to seed into a test collection.
#[derive(Clone, Debug)]
pub struct TestChunk {
	pub chunk_id: String,
	pub knowledge_id: String,
	pub document_id: String,
	pub text: String,
	pub vector: Vec<f32>,
}

/// A uniquely named collection with the dense and BM25 vectors the retriever queries.
///
/// The collection is deleted by [`TestCollection::cleanup`] or, failing that, on drop.
pub struct TestCollection {
	name: String,
	url: String,
	client: Qdrant,
	cleaned: bool,
}
impl TestCollection {
	pub async fn create(url: &str, prefix: &str, vector_dim: u64) -> Result<Self> {
		let client = Qdrant::from_url(url)
			.build()
			.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;
		let name = format!("{prefix}_{}", Uuid::new_v4().simple());
		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(vector_dim, Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		time::timeout(
			QDRANT_TIMEOUT,
			client.create_collection(
				CreateCollectionBuilder::new(name.clone())
					.vectors_config(vectors_config)
					.sparse_vectors_config(sparse_vectors_config),
			),
		)
		.await
		.map_err(|_| Error::Message("Qdrant create_collection timed out.".to_string()))??;

		Ok(Self { name, url: url.to_string(), client, cleaned: false })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn upsert(&self, chunks: &[TestChunk]) -> Result<()> {
		let points = chunks
			.iter()
			.map(|chunk| {
				let mut payload = Payload::new();

				payload.insert(PAYLOAD_CHUNK_ID, chunk.chunk_id.clone());
				payload.insert(PAYLOAD_KNOWLEDGE_ID, chunk.knowledge_id.clone());
				payload.insert(PAYLOAD_DOCUMENT_ID, chunk.document_id.clone());
				payload.insert(PAYLOAD_TEXT, chunk.text.clone());

				let mut vectors = HashMap::new();

				vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(chunk.vector.clone()));
				vectors.insert(
					BM25_VECTOR_NAME.to_string(),
					Vector::from(Document::new(chunk.text.clone(), BM25_MODEL)),
				);

				PointStruct::new(Uuid::new_v4().to_string(), vectors, payload)
			})
			.collect::<Vec<_>>();

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.name.clone(), points).wait(true))
			.await?;

		Ok(())
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleaned = true;

		delete_collection(&self.client, &self.name).await
	}
}
impl Drop for TestCollection {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let url = self.url.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test collection cleanup failed: {err}.");

					return;
				},
			};
			let result = runtime.block_on(async {
				let client = Qdrant::from_url(&url).build()?;

				delete_collection(&client, &name).await
			});

			if let Err(err) = result {
				eprintln!("Test collection cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("KBR_QDRANT_URL").ok()
}

async fn delete_collection(client: &Qdrant, name: &str) -> Result<()> {
	let max_attempts = 4;
	let mut backoff = Duration::from_millis(100);

	for attempt in 1..=max_attempts {
		match time::timeout(QDRANT_TIMEOUT, client.delete_collection(name.to_string())).await {
			Ok(Ok(_)) => return Ok(()),
			Ok(Err(err)) if attempt == max_attempts => {
				return Err(Error::Message(format!(
					"Failed to delete Qdrant collection {name:?} after {attempt} attempts: {err}."
				)));
			},
			Err(_) if attempt == max_attempts => {
				return Err(Error::Message(format!(
					"Timed out deleting Qdrant collection {name:?} after {attempt} attempts."
				)));
			},
			_ => {},
		}

		time::sleep(backoff).await;

		backoff = backoff.saturating_mul(2).min(Duration::from_secs(2));
	}

	Ok(())
}
