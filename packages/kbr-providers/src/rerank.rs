use serde_json::Value;

use crate::{Error, Result};

/// Scores `docs` against `query` with a cross-encoder endpoint.
///
/// The returned vector is aligned with `docs`. Documents the endpoint leaves out score zero.
pub async fn rerank(
	cfg: &kbr_config::ProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f64>> {
	if docs.is_empty() {
		return Ok(Vec::new());
	}

	let client = crate::client(cfg.timeout_ms)?;
	let body = serde_json::json!({
		"model": cfg.model,
		"query": query,
		"documents": docs,
		"top_n": docs.len(),
	});
	let res = client
		.post(crate::endpoint(&cfg.api_base, &cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f64>> {
	let mut scores = vec![0.0; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Rerank response is missing results array.".to_string(),
		})?;

	for item in results {
		let index = item.get("index").and_then(|v| v.as_u64()).ok_or_else(|| {
			Error::InvalidResponse { message: "Rerank result missing index.".to_string() }
		})? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| Error::InvalidResponse {
				message: "Rerank result missing score.".to_string(),
			})?;

		match scores.get_mut(index) {
			Some(slot) => *slot = score,
			None => tracing::warn!(index, doc_count, "Rerank result index is out of range."),
		}
	}

	Ok(scores)
}
