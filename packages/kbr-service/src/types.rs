use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub const METADATA_KNOWLEDGE_ID: &str = "knowledge_id";
pub const METADATA_DOCUMENT_ID: &str = "document_id";
pub const METADATA_CHUNK_ID: &str = "chunk_id";
pub const METADATA_COLLECTION: &str = "collection";
pub const METADATA_CHANNEL: &str = "channel";

/// Cross-encoder weight used by `rrf` when neither the request nor the config sets one.
pub const DEFAULT_RRF_RERANK_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMode {
	/// Keep the vector-search score.
	Simple,
	/// Replace the score with a cross-encoder score.
	Rerank,
	/// Fuse vector and BM25 ranks, optionally blended with a cross-encoder score.
	Rrf,
}
impl RetrieveMode {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"simple" => Some(Self::Simple),
			"rerank" => Some(Self::Rerank),
			"rrf" => Some(Self::Rrf),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Simple => "simple",
			Self::Rerank => "rerank",
			Self::Rrf => "rrf",
		}
	}
}

/// A retrieval path within one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Dense,
	Bm25,
}
impl Channel {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"dense" => Some(Self::Dense),
			"bm25" => Some(Self::Bm25),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Dense => "dense",
			Self::Bm25 => "bm25",
		}
	}
}

/// Caller input. Unset options fall back to the `[retrieval]` configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveRequest {
	pub query: String,
	pub knowledge_id: String,
	pub top_k: Option<u32>,
	pub score_threshold: Option<f64>,
	pub enable_rewrite: Option<bool>,
	pub rewrite_attempts: Option<u32>,
	pub retrieve_mode: Option<RetrieveMode>,
	pub rerank_weight: Option<f64>,
}
impl RetrieveRequest {
	pub fn new(query: impl Into<String>, knowledge_id: impl Into<String>) -> Self {
		Self { query: query.into(), knowledge_id: knowledge_id.into(), ..Default::default() }
	}

	/// Fills unset options from `defaults` and validates the result.
	pub fn resolve(&self, defaults: &kbr_config::Retrieval) -> Result<ResolvedRequest> {
		let query = self.query.trim();
		let knowledge_id = self.knowledge_id.trim();

		if query.is_empty() {
			return Err(Error::invalid_request("query must be non-empty."));
		}
		if knowledge_id.is_empty() {
			return Err(Error::invalid_request("knowledge_id must be non-empty."));
		}

		let top_k = self.top_k.unwrap_or(defaults.top_k);

		if top_k == 0 {
			return Err(Error::invalid_request("top_k must be greater than zero."));
		}

		let score_threshold = self.score_threshold.unwrap_or(defaults.score_threshold);

		if !score_threshold.is_finite() {
			return Err(Error::invalid_request("score_threshold must be a finite number."));
		}
		if score_threshold < 0.0 {
			return Err(Error::invalid_request("score_threshold must be zero or greater."));
		}

		let rewrite_attempts = self.rewrite_attempts.unwrap_or(defaults.rewrite_attempts);

		if rewrite_attempts == 0 {
			return Err(Error::invalid_request("rewrite_attempts must be greater than zero."));
		}

		let retrieve_mode = match self.retrieve_mode {
			Some(mode) => mode,
			None => RetrieveMode::parse(&defaults.retrieve_mode).ok_or_else(|| {
				Error::configuration(format!(
					"retrieval.retrieve_mode {:?} is not a known mode.",
					defaults.retrieve_mode
				))
			})?,
		};
		let rerank_weight = match self.rerank_weight.or(defaults.rerank_weight) {
			None if retrieve_mode == RetrieveMode::Rrf => Some(DEFAULT_RRF_RERANK_WEIGHT),
			weight => weight,
		};

		if let Some(weight) = rerank_weight
			&& (!weight.is_finite() || !(0.0..=1.0).contains(&weight))
		{
			return Err(Error::invalid_request("rerank_weight must be in the range 0.0-1.0."));
		}

		Ok(ResolvedRequest {
			query: query.to_string(),
			knowledge_id: knowledge_id.to_string(),
			top_k: top_k as usize,
			score_threshold,
			enable_rewrite: self.enable_rewrite.unwrap_or(defaults.enable_rewrite),
			rewrite_attempts,
			retrieve_mode,
			rerank_weight,
		})
	}
}

/// A validated request with every option filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
	pub query: String,
	pub knowledge_id: String,
	pub top_k: usize,
	pub score_threshold: f64,
	pub enable_rewrite: bool,
	pub rewrite_attempts: u32,
	pub retrieve_mode: RetrieveMode,
	pub rerank_weight: Option<f64>,
}
impl ResolvedRequest {
	/// Threshold compared against post-rerank scores.
	pub fn effective_threshold(&self) -> f64 {
		effective_threshold(self.score_threshold)
	}

	/// Number of retrieval tasks the call fans out to.
	pub fn task_count(&self) -> u32 {
		if self.enable_rewrite { self.rewrite_attempts } else { 1 }
	}

	/// Whether ranking needs the cross-encoder for this request.
	pub fn uses_cross_encoder(&self) -> bool {
		match self.retrieve_mode {
			RetrieveMode::Simple => false,
			RetrieveMode::Rerank => true,
			RetrieveMode::Rrf => self.rerank_weight.is_some_and(|weight| weight > 0.0),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub id: String,
	pub content: String,
	pub score: f64,
	#[serde(default)]
	pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
	pub trace_id: Uuid,
	/// Sorted by score, highest first, at most `top_k` long.
	pub items: Vec<Candidate>,
	/// The query each retrieval task ran with, in dispatch order.
	pub queries: Vec<String>,
	pub failed_tasks: usize,
}

/// Thresholds of 1.0 or more are shifted down by one.
pub fn effective_threshold(threshold: f64) -> f64 {
	if threshold >= 1.0 { threshold - 1.0 } else { threshold }
}
