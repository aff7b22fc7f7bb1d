use std::cmp::Ordering;

use futures::future;

use kbr_config::{ProviderConfig, RankingSubChunk};

use crate::{Dependency, Error, RerankProvider, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
	Max,
	Mean,
	TopKMean(usize),
}
impl Aggregate {
	pub fn from_config(cfg: &RankingSubChunk) -> Result<Self> {
		match cfg.aggregate.as_str() {
			"max" => Ok(Self::Max),
			"mean" => Ok(Self::Mean),
			"topk_mean" => Ok(Self::TopKMean(cfg.top_k_for_mean.max(1) as usize)),
			other => Err(Error::configuration(format!(
				"ranking.sub_chunk.aggregate {other:?} is not a known strategy."
			))),
		}
	}

	pub fn apply(self, scores: &[f64]) -> f64 {
		if scores.is_empty() {
			return 0.0;
		}

		match self {
			Self::Max => scores.iter().copied().fold(f64::MIN, f64::max),
			Self::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
			Self::TopKMean(k) => {
				let mut sorted = scores.to_vec();

				sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
				sorted.truncate(k);

				sorted.iter().sum::<f64>() / sorted.len() as f64
			},
		}
	}
}

/// Splits `content` into overlapping windows of `window` characters.
///
/// Content that fits in one window is returned whole. `max_windows` of zero means unlimited.
pub fn split_windows(
	content: &str,
	window: usize,
	overlap: usize,
	max_windows: usize,
) -> Vec<String> {
	if content.is_empty() || window == 0 {
		return Vec::new();
	}

	let chars = content.chars().collect::<Vec<_>>();

	if chars.len() <= window {
		return vec![content.to_string()];
	}

	let step = if overlap < window { window - overlap } else { window };
	let mut windows = Vec::new();
	let mut start = 0;

	while start < chars.len() {
		let end = (start + window).min(chars.len());

		windows.push(chars[start..end].iter().collect::<String>());

		if end == chars.len() || (max_windows > 0 && windows.len() >= max_windows) {
			break;
		}

		start += step;
	}

	windows
}

/// Keeps scores of at least `threshold * best`. The best score always survives.
pub fn filter_relative(scores: &[f64], threshold: f64) -> Vec<f64> {
	if scores.is_empty() || threshold <= 0.0 {
		return scores.to_vec();
	}

	let best = scores.iter().copied().fold(f64::MIN, f64::max);

	if best <= 0.0 {
		return scores.to_vec();
	}

	let cutoff = best * threshold;
	let kept = scores.iter().copied().filter(|score| *score >= cutoff).collect::<Vec<_>>();

	if kept.is_empty() { vec![best] } else { kept }
}

/// Scores each document by reranking its windows and aggregating the window scores.
///
/// Windows are sent in batches of `cfg.batch_size`, all batches concurrently.
pub async fn score_windows(
	provider: &dyn RerankProvider,
	provider_cfg: &ProviderConfig,
	cfg: &RankingSubChunk,
	query: &str,
	docs: &[String],
) -> Result<Vec<f64>> {
	let aggregate = Aggregate::from_config(cfg)?;
	let mut owners = Vec::new();
	let mut windows = Vec::new();

	for (doc_index, doc) in docs.iter().enumerate() {
		for window in split_windows(
			doc,
			cfg.window_chars as usize,
			cfg.overlap_chars as usize,
			cfg.max_windows_per_doc as usize,
		) {
			owners.push(doc_index);
			windows.push(window);
		}
	}

	let batch_size = cfg.batch_size.max(1) as usize;
	let batches = windows.chunks(batch_size).collect::<Vec<_>>();
	let batch_scores = future::try_join_all(batches.iter().map(|batch| async move {
		let scores = provider.rerank(provider_cfg, query, batch).await?;

		if scores.len() != batch.len() {
			return Err(Error::Upstream {
				dependency: Dependency::Rerank,
				message: format!(
					"Rerank returned {} scores for {} windows.",
					scores.len(),
					batch.len()
				),
			});
		}

		Ok(scores)
	}))
	.await?;
	let mut per_doc = vec![Vec::new(); docs.len()];

	for (owner, score) in owners.into_iter().zip(batch_scores.into_iter().flatten()) {
		per_doc[owner].push(score);
	}

	tracing::debug!(
		docs = docs.len(),
		windows = windows.len(),
		batches = batches.len(),
		"Window rerank completed."
	);

	Ok(per_doc
		.iter()
		.map(|scores| aggregate.apply(&filter_relative(scores, cfg.relative_threshold)))
		.collect())
}
