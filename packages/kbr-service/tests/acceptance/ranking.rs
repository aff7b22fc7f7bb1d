use std::sync::Arc;

use crate::acceptance::{ScriptedStore, SpyRewrite, TableRerank, build_service, hit, test_config};
use kbr_service::{RetrieveMode, RetrieveRequest};

#[tokio::test]
async fn thresholds_above_one_are_shifted_before_filtering() {
	let store = Arc::new(ScriptedStore::default().respond("q", vec![hit("a", 0.9), hit("b", 0.8)]));
	let service = build_service(
		test_config(3, "chunks"),
		store,
		Arc::new(TableRerank::new(&[("content of a", 0.6), ("content of b", 0.4)])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let request =
		RetrieveRequest { score_threshold: Some(1.5), ..RetrieveRequest::new("q", "kb1") };
	let response = service.retrieve(request).await.expect("Retrieve should succeed.");

	assert_eq!(response.items.len(), 1);
	assert_eq!(response.items[0].id, "a");
	assert!((response.items[0].score - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn simple_mode_shifts_vector_scores_above_one() {
	let store = Arc::new(ScriptedStore::default().respond("q", vec![hit("a", 1.3), hit("b", 0.1)]));
	let rerank = Arc::new(TableRerank::new(&[]));
	let service = build_service(
		test_config(3, "chunks"),
		store,
		rerank.clone(),
		Arc::new(SpyRewrite::new(&[])),
	);
	let request = RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Simple),
		..RetrieveRequest::new("q", "kb1")
	};
	let response = service.retrieve(request).await.expect("Retrieve should succeed.");

	assert_eq!(response.items.len(), 1);
	assert!((response.items[0].score - 0.3).abs() < 1e-9);
	assert_eq!(rerank.count(), 0);
}

#[tokio::test]
async fn rrf_weight_moves_between_fusion_and_cross_encoder_order() {
	let store = Arc::new(
		ScriptedStore::default().respond("What is RAG?", vec![hit("a", 0.9), hit("b", 0.5)]),
	);
	let rerank = Arc::new(TableRerank::new(&[("content of a", 0.1), ("content of b", 0.9)]));
	let service = build_service(
		test_config(3, "chunks"),
		store,
		rerank.clone(),
		Arc::new(SpyRewrite::new(&[])),
	);
	let request = |weight| RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Rrf),
		rerank_weight: weight,
		score_threshold: Some(0.0),
		..RetrieveRequest::new("What is RAG?", "kb1")
	};
	let ids = |response: &kbr_service::RetrieveResponse| {
		response.items.iter().map(|item| item.id.clone()).collect::<Vec<_>>()
	};
	let cross_encoder =
		service.retrieve(request(Some(1.0))).await.expect("Weighted retrieve should succeed.");

	assert_eq!(ids(&cross_encoder), vec!["b", "a"]);
	assert!((cross_encoder.items[0].score - 0.9).abs() < 1e-9);
	assert_eq!(rerank.count(), 1);

	let fused = service.retrieve(request(Some(0.0))).await.expect("Fused retrieve should succeed.");

	assert_eq!(ids(&fused), vec!["a", "b"]);
	assert!((fused.items[0].score - 1.0).abs() < 1e-9);

	assert_eq!(rerank.count(), 1);

	let unweighted = service.retrieve(request(None)).await.expect("RRF retrieve should succeed.");

	assert_eq!(ids(&unweighted), vec!["b", "a"]);
	assert!((unweighted.items[0].score - 0.9).abs() < 1e-9);
	assert_eq!(rerank.count(), 2);
}

#[tokio::test]
async fn windowed_rerank_scores_long_chunks_by_their_best_window() {
	let mut cfg = test_config(3, "chunks");

	cfg.ranking.sub_chunk.enabled = true;
	cfg.ranking.sub_chunk.window_chars = 12;
	cfg.ranking.sub_chunk.overlap_chars = 0;

	let store = Arc::new(ScriptedStore::default().respond("q", vec![hit("long_chunk", 0.9)]));
	let rerank = Arc::new(TableRerank::new(&[("ong_chunk", 0.7)]));
	let service = build_service(cfg, store, rerank.clone(), Arc::new(SpyRewrite::new(&[])));
	let response = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect("Retrieve should succeed.");

	// "content of long_chunk" splits into "content of l" and "ong_chunk".
	assert_eq!(response.items.len(), 1);
	assert!((response.items[0].score - 0.7).abs() < 1e-9);
	assert_eq!(rerank.count(), 1);
}
