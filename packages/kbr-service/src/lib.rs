//! Multi-rewrite retrieval: query expansion, vector search, reranking, and result fusion.

pub mod assemble;
pub mod expansion;
pub mod rerank;
pub mod retrieve;
pub mod task;
pub mod types;
pub mod vector;

mod error;

pub use error::{Dependency, Error, Result};
pub use retrieve::FanOutState;
pub use types::{
	Candidate, Channel, ResolvedRequest, RetrieveMode, RetrieveRequest, RetrieveResponse,
};
pub use vector::{QdrantVectorStore, VectorHit, VectorQuery};

use std::{future::Future, pin::Pin, sync::Arc};

use kbr_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use kbr_providers::chat::{self, ChatMessage};
use kbr_storage::qdrant::QdrantStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait RewriteProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<String>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	/// Scores aligned with `docs`.
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f64>>>;
}

pub trait VectorStore
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<VectorHit>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub vector: Arc<dyn VectorStore>,
	pub rerank: Arc<dyn RerankProvider>,
	pub rewrite: Arc<dyn RewriteProvider>,
}
impl Providers {
	pub fn new(
		vector: Arc<dyn VectorStore>,
		rerank: Arc<dyn RerankProvider>,
		rewrite: Arc<dyn RewriteProvider>,
	) -> Self {
		Self { vector, rerank, rewrite }
	}
}

pub struct RetrievalService {
	pub cfg: Arc<Config>,
	pub providers: Providers,
}
impl RetrievalService {
	/// Wires the HTTP providers and a Qdrant-backed vector store.
	pub fn new(cfg: Config, qdrant: QdrantStore) -> Self {
		let defaults = Arc::new(DefaultProviders);
		let vector =
			QdrantVectorStore::new(qdrant, defaults.clone(), cfg.providers.embedding.clone());
		let providers = Providers::new(Arc::new(vector), defaults.clone(), defaults);

		Self { cfg: Arc::new(cfg), providers }
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		Self { cfg: Arc::new(cfg), providers }
	}
}

struct DefaultProviders;
impl RewriteProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			chat::generate(cfg, messages).await.map_err(|err| Error::upstream(Dependency::Llm, err))
		})
	}
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			kbr_providers::embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::upstream(Dependency::Embedding, err))
		})
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f64>>> {
		Box::pin(async move {
			kbr_providers::rerank::rerank(cfg, query, docs)
				.await
				.map_err(|err| Error::upstream(Dependency::Rerank, err))
		})
	}
}
