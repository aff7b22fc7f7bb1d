mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig, Providers, Qdrant, Ranking,
	RankingBm25, RankingRrf, RankingSubChunk, Retrieval, RetrievalOversample, Service, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub const RETRIEVE_MODES: [&str; 3] = ["simple", "rerank", "rrf"];
pub const CHANNELS: [&str; 2] = ["dense", "bm25"];
pub const COLLECTION_MODES: [&str; 2] = ["shared", "per_knowledge"];
pub const SUB_CHUNK_AGGREGATES: [&str; 3] = ["max", "mean", "topk_mean"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: Box::new(err) })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	validate_service(cfg)?;
	validate_storage(cfg)?;
	validate_providers(cfg)?;
	validate_retrieval(cfg)?;
	validate_ranking(cfg)?;

	Ok(())
}

/// Lower-cases enumerated string options and drops blank channel entries.
pub fn normalize(cfg: &mut Config) {
	for value in [
		&mut cfg.storage.qdrant.collection_mode,
		&mut cfg.retrieval.retrieve_mode,
		&mut cfg.ranking.sub_chunk.aggregate,
	] {
		*value = value.trim().to_ascii_lowercase();
	}

	cfg.storage.qdrant.collection = cfg.storage.qdrant.collection.trim().to_string();
	cfg.retrieval.channels = cfg
		.retrieval
		.channels
		.iter()
		.map(|channel| channel.trim().to_ascii_lowercase())
		.filter(|channel| !channel.is_empty())
		.collect();

	for api_base in [
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.rerank.api_base,
		&mut cfg.providers.llm_rewrite.api_base,
	] {
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}
}

fn validate_service(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}

	Ok(())
}

fn validate_storage(cfg: &Config) -> Result<()> {
	let qdrant = &cfg.storage.qdrant;

	if qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if !COLLECTION_MODES.contains(&qdrant.collection_mode.as_str()) {
		return Err(Error::Validation {
			message: "storage.qdrant.collection_mode must be one of shared or per_knowledge."
				.to_string(),
		});
	}
	if qdrant.collection_mode == "shared" && qdrant.collection.is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty when collection_mode is shared."
				.to_string(),
		});
	}
	if qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_providers(cfg: &Config) -> Result<()> {
	let providers = &cfg.providers;

	if providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, api_base, api_key, timeout_ms) in [
		(
			"embedding",
			&providers.embedding.api_base,
			&providers.embedding.api_key,
			providers.embedding.timeout_ms,
		),
		(
			"rerank",
			&providers.rerank.api_base,
			&providers.rerank.api_key,
			providers.rerank.timeout_ms,
		),
		(
			"llm_rewrite",
			&providers.llm_rewrite.api_base,
			&providers.llm_rewrite.api_key,
			providers.llm_rewrite.timeout_ms,
		),
	] {
		if api_base.is_empty() {
			return Err(Error::Validation {
				message: format!("providers.{label}.api_base must be non-empty."),
			});
		}
		if api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
		if timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("providers.{label}.timeout_ms must be greater than zero."),
			});
		}
	}

	let temperature = providers.llm_rewrite.temperature;

	if !temperature.is_finite() || temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm_rewrite.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !retrieval.score_threshold.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.score_threshold must be a finite number.".to_string(),
		});
	}
	if retrieval.score_threshold < 0.0 {
		return Err(Error::Validation {
			message: "retrieval.score_threshold must be zero or greater.".to_string(),
		});
	}
	if retrieval.rewrite_attempts == 0 {
		return Err(Error::Validation {
			message: "retrieval.rewrite_attempts must be greater than zero.".to_string(),
		});
	}
	if !RETRIEVE_MODES.contains(&retrieval.retrieve_mode.as_str()) {
		return Err(Error::Validation {
			message: "retrieval.retrieve_mode must be one of simple, rerank, or rrf.".to_string(),
		});
	}
	if let Some(weight) = retrieval.rerank_weight {
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: "retrieval.rerank_weight must be a finite number.".to_string(),
			});
		}
		if !(0.0..=1.0).contains(&weight) {
			return Err(Error::Validation {
				message: "retrieval.rerank_weight must be in the range 0.0-1.0.".to_string(),
			});
		}
	}
	if retrieval.channels.is_empty() {
		return Err(Error::Validation {
			message: "retrieval.channels must be non-empty.".to_string(),
		});
	}

	let mut seen = HashSet::new();

	for channel in &retrieval.channels {
		if !CHANNELS.contains(&channel.as_str()) {
			return Err(Error::Validation {
				message: format!("retrieval.channels entry {channel:?} must be dense or bm25."),
			});
		}
		if !seen.insert(channel.as_str()) {
			return Err(Error::Validation {
				message: format!("retrieval.channels entry {channel:?} is duplicated."),
			});
		}
	}

	if retrieval.max_fan_out == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_fan_out must be greater than zero.".to_string(),
		});
	}
	if retrieval.oversample.factor == 0 {
		return Err(Error::Validation {
			message: "retrieval.oversample.factor must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(cfg: &Config) -> Result<()> {
	let ranking = &cfg.ranking;

	if !ranking.bm25.k1.is_finite() || ranking.bm25.k1 < 0.0 {
		return Err(Error::Validation {
			message: "ranking.bm25.k1 must be a finite number, zero or greater.".to_string(),
		});
	}
	if !ranking.bm25.b.is_finite() || !(0.0..=1.0).contains(&ranking.bm25.b) {
		return Err(Error::Validation {
			message: "ranking.bm25.b must be in the range 0.0-1.0.".to_string(),
		});
	}

	let sub_chunk = &ranking.sub_chunk;

	if !sub_chunk.enabled {
		return Ok(());
	}
	if sub_chunk.window_chars == 0 {
		return Err(Error::Validation {
			message: "ranking.sub_chunk.window_chars must be greater than zero.".to_string(),
		});
	}
	if sub_chunk.overlap_chars >= sub_chunk.window_chars {
		return Err(Error::Validation {
			message: "ranking.sub_chunk.overlap_chars must be less than window_chars."
				.to_string(),
		});
	}
	if !SUB_CHUNK_AGGREGATES.contains(&sub_chunk.aggregate.as_str()) {
		return Err(Error::Validation {
			message: "ranking.sub_chunk.aggregate must be one of max, mean, or topk_mean."
				.to_string(),
		});
	}
	if sub_chunk.top_k_for_mean == 0 {
		return Err(Error::Validation {
			message: "ranking.sub_chunk.top_k_for_mean must be greater than zero.".to_string(),
		});
	}
	if !sub_chunk.relative_threshold.is_finite()
		|| !(0.0..=1.0).contains(&sub_chunk.relative_threshold)
	{
		return Err(Error::Validation {
			message: "ranking.sub_chunk.relative_threshold must be in the range 0.0-1.0."
				.to_string(),
		});
	}
	if sub_chunk.batch_size == 0 {
		return Err(Error::Validation {
			message: "ranking.sub_chunk.batch_size must be greater than zero.".to_string(),
		});
	}

	Ok(())
}
