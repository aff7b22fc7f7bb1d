use std::{collections::HashSet, sync::Arc};

use kbr_storage::filter::KnowledgeFilter;

use crate::{
	Result,
	rerank::RerankService,
	types::{Candidate, Channel, ResolvedRequest},
	vector::VectorSearchClient,
};

/// Search, rerank, and threshold for a single query string.
#[derive(Clone)]
pub struct RetrievalTask {
	search: VectorSearchClient,
	rerank: RerankService,
	channels: Vec<Channel>,
	collection: String,
	request: Arc<ResolvedRequest>,
}
impl RetrievalTask {
	pub fn new(
		search: VectorSearchClient,
		rerank: RerankService,
		channels: Vec<Channel>,
		collection: String,
		request: Arc<ResolvedRequest>,
	) -> Self {
		Self { search, rerank, channels, collection, request }
	}

	/// Runs every channel in order. Each channel excludes the ids earlier channels returned.
	pub async fn run(&self, query: &str) -> Result<Vec<Candidate>> {
		let request = &self.request;
		let mut filter = KnowledgeFilter::new(&request.knowledge_id);
		let mut pooled = Vec::new();

		for channel in &self.channels {
			let hits = self
				.search
				.search(&self.collection, query, &filter, request.top_k, *channel)
				.await?;

			filter = filter.excluding(hits.iter().map(|hit| hit.id.clone()));

			pooled.extend(hits);
		}

		let candidates = dedup_first(pooled);
		let recalled = candidates.len();
		let ranked = self
			.rerank
			.rerank(query, candidates, request.top_k, request.retrieve_mode, request.rerank_weight)
			.await?;
		let threshold = request.effective_threshold();
		let kept = ranked
			.into_iter()
			.filter(|candidate| candidate.score >= threshold)
			.collect::<Vec<_>>();

		tracing::debug!(
			query,
			recalled,
			kept = kept.len(),
			threshold,
			"Retrieval task completed."
		);

		Ok(kept)
	}
}

/// Drops repeated ids, keeping the first occurrence.
pub fn dedup_first(candidates: Vec<Candidate>) -> Vec<Candidate> {
	let mut seen = HashSet::new();

	candidates.into_iter().filter(|candidate| seen.insert(candidate.id.clone())).collect()
}
