pub mod fusion;
pub mod lexical;
pub mod window;

use std::{cmp::Ordering, sync::Arc};

use kbr_config::{ProviderConfig, Ranking};

use crate::{
	Dependency, Error, RerankProvider, Result,
	assemble::{self, cmp_f64_desc},
	rerank::{fusion::reciprocal_rank_fusion, lexical::Bm25},
	types::{Candidate, RetrieveMode},
};

/// Re-scores one task's candidates and keeps the best `top_k`.
#[derive(Clone)]
pub struct RerankService {
	provider: Arc<dyn RerankProvider>,
	provider_cfg: ProviderConfig,
	ranking: Ranking,
}
impl RerankService {
	pub fn new(
		provider: Arc<dyn RerankProvider>,
		provider_cfg: ProviderConfig,
		ranking: Ranking,
	) -> Self {
		Self { provider, provider_cfg, ranking }
	}

	pub async fn rerank(
		&self,
		query: &str,
		mut candidates: Vec<Candidate>,
		top_k: usize,
		mode: RetrieveMode,
		weight: Option<f64>,
	) -> Result<Vec<Candidate>> {
		if candidates.is_empty() {
			return Ok(candidates);
		}

		match mode {
			RetrieveMode::Simple => {},
			RetrieveMode::Rerank => {
				let scores = self.cross_encoder_scores(query, &candidates).await?;

				for (candidate, score) in candidates.iter_mut().zip(scores) {
					candidate.score = score;
				}
			},
			RetrieveMode::Rrf => {
				let fused = self.fused_scores(query, &candidates);

				match weight.filter(|weight| *weight > 0.0) {
					Some(weight) => {
						let scores = self.cross_encoder_scores(query, &candidates).await?;

						for ((candidate, fused), score) in
							candidates.iter_mut().zip(fused).zip(scores)
						{
							candidate.score = fusion::blend(score, fused, weight);
						}
					},
					None => {
						for (candidate, fused) in candidates.iter_mut().zip(fused) {
							candidate.score = fused;
						}
					},
				}
			},
		}

		assemble::sort_candidates(&mut candidates);
		candidates.truncate(top_k);

		tracing::debug!(
			mode = mode.as_str(),
			kept = candidates.len(),
			top_score = candidates.first().map(|candidate| candidate.score),
			"Rerank completed."
		);

		Ok(candidates)
	}

	async fn cross_encoder_scores(
		&self,
		query: &str,
		candidates: &[Candidate],
	) -> Result<Vec<f64>> {
		let docs = candidates.iter().map(|candidate| candidate.content.clone()).collect::<Vec<_>>();
		let scores = if self.ranking.sub_chunk.enabled {
			window::score_windows(
				self.provider.as_ref(),
				&self.provider_cfg,
				&self.ranking.sub_chunk,
				query,
				&docs,
			)
			.await?
		} else {
			self.provider.rerank(&self.provider_cfg, query, &docs).await?
		};

		if scores.len() != docs.len() {
			return Err(Error::Upstream {
				dependency: Dependency::Rerank,
				message: format!(
					"Rerank returned {} scores for {} candidates.",
					scores.len(),
					docs.len()
				),
			});
		}

		Ok(scores)
	}

	/// RRF of the vector-score ranking and the BM25 ranking, aligned with `candidates`.
	fn fused_scores(&self, query: &str, candidates: &[Candidate]) -> Vec<f64> {
		let vector_scores = candidates.iter().map(|candidate| candidate.score).collect::<Vec<_>>();
		let bm25 = Bm25::new(
			candidates.iter().map(|candidate| candidate.content.as_str()),
			&self.ranking.bm25,
		);
		let lexical_scores = bm25.scores(query);
		let rankings =
			[rank_ids(candidates, &vector_scores), rank_ids(candidates, &lexical_scores)];
		let fused = reciprocal_rank_fusion(&rankings, self.ranking.rrf.k);

		candidates
			.iter()
			.map(|candidate| fused.get(&candidate.id).copied().unwrap_or(0.0))
			.collect()
	}
}

/// Candidate ids ordered by `scores`, highest first, ties by id.
fn rank_ids(candidates: &[Candidate], scores: &[f64]) -> Vec<String> {
	let mut order = (0..candidates.len()).collect::<Vec<_>>();

	order.sort_by(|&a, &b| {
		let by_score = cmp_f64_desc(scores[a], scores[b]);

		if by_score == Ordering::Equal { candidates[a].id.cmp(&candidates[b].id) } else { by_score }
	});

	order.into_iter().map(|index| candidates[index].id.clone()).collect()
}
