use std::collections::HashMap;

/// Reciprocal rank fusion over ranked id lists.
///
/// Ranks are 1-based. Each list adds `1 / (k + rank)` for the ids it contains. The sum is divided
/// by the best possible score, `lists / (k + 1)`, so a document ranked first everywhere scores 1.0.
pub fn reciprocal_rank_fusion(rankings: &[Vec<String>], k: u32) -> HashMap<String, f64> {
	let mut fused: HashMap<String, f64> = HashMap::new();

	if rankings.is_empty() {
		return fused;
	}

	for ranking in rankings {
		for (index, id) in ranking.iter().enumerate() {
			*fused.entry(id.clone()).or_insert(0.0) += rrf_term(index + 1, k);
		}
	}

	let max_possible = rankings.len() as f64 * rrf_term(1, k);

	for score in fused.values_mut() {
		*score = (*score / max_possible).min(1.0);
	}

	fused
}

pub fn rrf_term(rank: usize, k: u32) -> f64 {
	1.0 / (f64::from(k) + rank as f64)
}

/// `weight * rerank + (1 - weight) * fused`.
pub fn blend(rerank: f64, fused: f64, weight: f64) -> f64 {
	weight * rerank + (1.0 - weight) * fused
}
