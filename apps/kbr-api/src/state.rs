use std::sync::Arc;

use kbr_service::RetrievalService;
use kbr_storage::qdrant::QdrantStore;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RetrievalService>,
}
impl AppState {
	pub fn new(config: kbr_config::Config) -> color_eyre::Result<Self> {
		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		Ok(Self { service: Arc::new(RetrievalService::new(config, qdrant)) })
	}

	pub fn from_service(service: RetrievalService) -> Self {
		Self { service: Arc::new(service) }
	}
}
