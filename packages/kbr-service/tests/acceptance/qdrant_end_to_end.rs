use std::sync::Arc;

use crate::acceptance::{SpyRewrite, StubEmbedding, TableRerank, test_config};
use kbr_service::{Providers, QdrantVectorStore, RetrievalService, RetrieveMode, RetrieveRequest};
use kbr_storage::qdrant::QdrantStore;
use kbr_testkit::{TestChunk, TestCollection};

fn chunk(chunk_id: &str, knowledge_id: &str, text: &str, vector: [f32; 3]) -> TestChunk {
	TestChunk {
		chunk_id: chunk_id.to_string(),
		knowledge_id: knowledge_id.to_string(),
		document_id: format!("doc_{chunk_id}"),
		text: text.to_string(),
		vector: vector.to_vec(),
	}
}

#[tokio::test]
#[ignore = "Requires external Qdrant. Set KBR_QDRANT_URL to run."]
async fn dense_search_is_scoped_to_the_knowledge_base() {
	let Some(qdrant_url) = kbr_testkit::env_qdrant_url() else {
		eprintln!("Skipping qdrant_end_to_end; set KBR_QDRANT_URL to run this test.");

		return;
	};
	let collection = TestCollection::create(&qdrant_url, "kbr_acceptance", 3)
		.await
		.expect("Failed to create test collection.");

	collection
		.upsert(&[
			chunk("c1", "kb1", "RAG grounds answers in retrieved text.", [1.0, 0.0, 0.0]),
			chunk("c2", "kb1", "Vector search ranks chunks by similarity.", [0.6, 0.8, 0.0]),
			chunk("c3", "kb2", "A chunk from another knowledge base.", [1.0, 0.0, 0.0]),
		])
		.await
		.expect("Failed to seed test collection.");

	let mut cfg = test_config(3, collection.name());

	cfg.storage.qdrant.url = qdrant_url;

	let store = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to build Qdrant store.");
	let vector = QdrantVectorStore::new(
		store,
		Arc::new(StubEmbedding { vector: vec![1.0, 0.0, 0.0] }),
		cfg.providers.embedding.clone(),
	);
	let providers = Providers::new(
		Arc::new(vector),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let service = RetrievalService::with_providers(cfg, providers);
	let request = RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Simple),
		score_threshold: Some(0.0),
		..RetrieveRequest::new("What is RAG?", "kb1")
	};
	let response = service.retrieve(request).await.expect("Retrieve should succeed.");
	let ids = response.items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["c1", "c2"]);
	assert_eq!(response.items[0].metadata.get("knowledge_id").map(String::as_str), Some("kb1"));
	assert_eq!(response.items[0].metadata.get("document_id").map(String::as_str), Some("doc_c1"));

	collection.cleanup().await.expect("Failed to clean up test collection.");
}
