pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

use qdrant_client::qdrant::{Document, Query, QueryPointsBuilder, ScoredPoint};

use crate::{Error, Result, filter::KnowledgeFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMode {
	Shared,
	PerKnowledge,
}
impl CollectionMode {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"shared" => Some(Self::Shared),
			"per_knowledge" => Some(Self::PerKnowledge),
			_ => None,
		}
	}
}

/// Qdrant client for chunk searches. The collection is chosen per call.
pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &kbr_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, vector_dim: cfg.vector_dim })
	}

	pub async fn search_dense(
		&self,
		collection: &str,
		vector: Vec<f32>,
		filter: &KnowledgeFilter,
		limit: u64,
	) -> Result<Vec<ScoredPoint>> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Query vector has {} dimensions, collection expects {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		let search = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(filter.to_qdrant())
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result)
	}

	pub async fn search_bm25(
		&self,
		collection: &str,
		text: &str,
		filter: &KnowledgeFilter,
		limit: u64,
	) -> Result<Vec<ScoredPoint>> {
		let search = QueryPointsBuilder::new(collection)
			.query(Query::new_nearest(Document::new(text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.filter(filter.to_qdrant())
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(response.result)
	}
}

pub fn resolve_collection(mode: CollectionMode, shared: &str, knowledge_id: &str) -> String {
	match mode {
		CollectionMode::Shared => shared.to_string(),
		CollectionMode::PerKnowledge => knowledge_id.to_string(),
	}
}
