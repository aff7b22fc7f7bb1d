use std::{collections::BTreeMap, sync::Arc};

use kbr_config::{EmbeddingProviderConfig, RetrievalOversample};
use kbr_storage::{filter::KnowledgeFilter, payload, qdrant::QdrantStore};

use crate::{
	BoxFuture, Dependency, EmbeddingProvider, Error, Result, VectorStore,
	types::{
		Candidate, Channel, METADATA_CHANNEL, METADATA_CHUNK_ID, METADATA_COLLECTION,
		METADATA_DOCUMENT_ID, METADATA_KNOWLEDGE_ID,
	},
};

/// One similarity search against the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
	pub collection: String,
	pub text: String,
	pub filter: KnowledgeFilter,
	pub limit: u64,
	pub channel: Channel,
}

/// A raw vector-store hit, before score adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
	pub id: String,
	pub content: String,
	pub score: f64,
	pub metadata: BTreeMap<String, String>,
}

/// Oversampling search front-end shared by every retrieval task.
#[derive(Clone)]
pub struct VectorSearchClient {
	store: Arc<dyn VectorStore>,
	oversample: RetrievalOversample,
}
impl VectorSearchClient {
	pub fn new(store: Arc<dyn VectorStore>, oversample: RetrievalOversample) -> Self {
		Self { store, oversample }
	}

	/// Searches `collection` for `query_text` and returns candidates scoped by `filter`.
	///
	/// The store is asked for `max(top_k * factor, floor)` hits. Store errors propagate as is.
	/// Dense scores above one are shifted down by one. BM25 scores are unbounded, so they are
	/// divided by the best BM25 score of this search instead.
	pub async fn search(
		&self,
		collection: &str,
		query_text: &str,
		filter: &KnowledgeFilter,
		top_k: usize,
		channel: Channel,
	) -> Result<Vec<Candidate>> {
		let query = VectorQuery {
			collection: collection.to_string(),
			text: query_text.to_string(),
			filter: filter.clone(),
			limit: oversampled_limit(top_k, &self.oversample),
			channel,
		};
		let hits = self.store.search(&query).await?;
		let mut candidates = Vec::with_capacity(hits.len());

		for hit in hits {
			if filter.excludes(&hit.id) {
				tracing::warn!(
					chunk_id = %hit.id,
					channel = channel.as_str(),
					filter = %filter,
					"Vector store returned an excluded chunk."
				);

				continue;
			}

			let score = match channel {
				Channel::Dense => shift_score(hit.score),
				Channel::Bm25 => hit.score,
			};

			candidates.push(Candidate {
				id: hit.id,
				content: hit.content,
				score,
				metadata: hit.metadata,
			});
		}

		if channel == Channel::Bm25 {
			normalize_by_max(&mut candidates);
		}

		tracing::debug!(
			channel = channel.as_str(),
			limit = query.limit,
			hits = candidates.len(),
			filter = %filter,
			"Vector search completed."
		);

		Ok(candidates)
	}
}

/// Qdrant-backed [`VectorStore`] with dense and BM25 channels.
pub struct QdrantVectorStore {
	store: QdrantStore,
	embedding: Arc<dyn EmbeddingProvider>,
	embedding_cfg: EmbeddingProviderConfig,
}
impl QdrantVectorStore {
	pub fn new(
		store: QdrantStore,
		embedding: Arc<dyn EmbeddingProvider>,
		embedding_cfg: EmbeddingProviderConfig,
	) -> Self {
		Self { store, embedding, embedding_cfg }
	}

	async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
		let texts = [text.to_string()];
		let vector = self
			.embedding
			.embed(&self.embedding_cfg, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::Upstream {
				dependency: Dependency::Embedding,
				message: "Embedding provider returned no vectors.".to_string(),
			})?;

		if vector.len() != self.store.vector_dim as usize {
			return Err(Error::Upstream {
				dependency: Dependency::Embedding,
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}

	async fn search_points(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
		let points = match query.channel {
			Channel::Dense => {
				let vector = self.embed_query(&query.text).await?;

				self.store
					.search_dense(&query.collection, vector, &query.filter, query.limit)
					.await?
			},
			Channel::Bm25 => {
				self.store
					.search_bm25(&query.collection, &query.text, &query.filter, query.limit)
					.await?
			},
		};
		let mut hits = Vec::with_capacity(points.len());

		for point in &points {
			let Some(hit) = payload::decode_hit(point) else {
				tracing::warn!(
					collection = %query.collection,
					point_id = ?point.id,
					"Skipping point without chunk id or text."
				);

				continue;
			};
			let mut metadata = BTreeMap::new();

			metadata.insert(METADATA_CHUNK_ID.to_string(), hit.id.clone());
			metadata.insert(METADATA_COLLECTION.to_string(), query.collection.clone());
			metadata.insert(METADATA_CHANNEL.to_string(), query.channel.as_str().to_string());

			if let Some(knowledge_id) = hit.knowledge_id {
				metadata.insert(METADATA_KNOWLEDGE_ID.to_string(), knowledge_id);
			}
			if let Some(document_id) = hit.document_id {
				metadata.insert(METADATA_DOCUMENT_ID.to_string(), document_id);
			}

			hits.push(VectorHit {
				id: hit.id,
				content: hit.content,
				score: f64::from(hit.score),
				metadata,
			});
		}

		Ok(hits)
	}
}
impl VectorStore for QdrantVectorStore {
	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>> {
		Box::pin(self.search_points(query))
	}
}

pub fn oversampled_limit(top_k: usize, oversample: &RetrievalOversample) -> u64 {
	let scaled = (top_k as u64).saturating_mul(u64::from(oversample.factor));

	scaled.max(u64::from(oversample.floor))
}

/// Scores above one are shifted down by one.
pub fn shift_score(score: f64) -> f64 {
	if score > 1.0 { score - 1.0 } else { score }
}

/// Divides every score by the highest one. Leaves the scores alone when none is positive.
pub fn normalize_by_max(candidates: &mut [Candidate]) {
	let best = candidates.iter().map(|candidate| candidate.score).fold(0.0, f64::max);

	if best <= 0.0 {
		return;
	}

	for candidate in candidates {
		candidate.score /= best;
	}
}
