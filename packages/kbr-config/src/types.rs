use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub ranking: Ranking,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	/// Collection used when `collection_mode` is `shared`.
	#[serde(default)]
	pub collection: String,
	/// `shared` keeps every knowledge base in `collection`; `per_knowledge` names the collection
	/// after the knowledge id.
	#[serde(default = "default_collection_mode")]
	pub collection_mode: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
	pub llm_rewrite: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Request defaults and fan-out limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
	/// Values of 1.0 or more are shifted down by one before comparison.
	pub score_threshold: f64,
	pub enable_rewrite: bool,
	pub rewrite_attempts: u32,
	pub retrieve_mode: String,
	pub rerank_weight: Option<f64>,
	/// Ordered retrieval channels, each one of `dense` or `bm25`.
	pub channels: Vec<String>,
	pub max_fan_out: u32,
	/// Upper bound for a whole retrieve call. Zero disables the bound.
	pub request_timeout_ms: u64,
	pub fail_when_all_tasks_fail: bool,
	pub oversample: RetrievalOversample,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			top_k: 5,
			score_threshold: 0.2,
			enable_rewrite: false,
			rewrite_attempts: 3,
			retrieve_mode: "rerank".to_string(),
			rerank_weight: None,
			channels: vec!["dense".to_string()],
			max_fan_out: 8,
			request_timeout_ms: 30_000,
			fail_when_all_tasks_fail: false,
			oversample: RetrievalOversample::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalOversample {
	pub factor: u32,
	pub floor: u32,
}
impl Default for RetrievalOversample {
	fn default() -> Self {
		Self { factor: 5, floor: 20 }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub rrf: RankingRrf,
	pub bm25: RankingBm25,
	pub sub_chunk: RankingSubChunk,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingRrf {
	pub k: u32,
}
impl Default for RankingRrf {
	fn default() -> Self {
		Self { k: 60 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingBm25 {
	pub k1: f64,
	pub b: f64,
}
impl Default for RankingBm25 {
	fn default() -> Self {
		Self { k1: 1.5, b: 0.75 }
	}
}

/// Window-level rerank for long chunks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingSubChunk {
	pub enabled: bool,
	pub window_chars: u32,
	pub overlap_chars: u32,
	/// One of `max`, `mean`, or `topk_mean`.
	pub aggregate: String,
	pub top_k_for_mean: u32,
	/// Zero means unlimited.
	pub max_windows_per_doc: u32,
	/// Window scores below `relative_threshold * best` are discarded before aggregation.
	pub relative_threshold: f64,
	pub batch_size: u32,
}
impl Default for RankingSubChunk {
	fn default() -> Self {
		Self {
			enabled: false,
			window_chars: 250,
			overlap_chars: 50,
			aggregate: "max".to_string(),
			top_k_for_mean: 2,
			max_windows_per_doc: 0,
			relative_threshold: 0.6,
			batch_size: 30,
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_collection_mode() -> String {
	"shared".to_string()
}
