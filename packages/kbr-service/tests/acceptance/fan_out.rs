use std::{collections::BTreeSet, sync::Arc, time::Duration};

use crate::acceptance::{ScriptedStore, SpyRewrite, TableRerank, build_service, hit, test_config};
use kbr_service::{Dependency, Error, RetrieveMode, RetrieveRequest};

const REWRITES: [&str; 3] = ["rag definition", "retrieval augmented generation", "rag pipeline"];

fn rewrite_config() -> kbr_config::Config {
	let mut cfg = test_config(3, "chunks");

	cfg.retrieval.enable_rewrite = true;
	cfg.retrieval.rewrite_attempts = 3;
	cfg.retrieval.top_k = 5;

	cfg
}

#[tokio::test]
async fn rewrites_fan_out_and_merge_to_top_k() {
	let store = Arc::new(
		ScriptedStore::default()
			.respond(REWRITES[0], vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7), hit("d", 0.6)])
			.respond(REWRITES[1], vec![hit("c", 0.9), hit("e", 0.8), hit("f", 0.7), hit("g", 0.6)])
			.respond(REWRITES[2], vec![hit("a", 0.9), hit("g", 0.8), hit("h", 0.7), hit("i", 0.6)]),
	);
	let rerank = Arc::new(TableRerank::new(&[
		("content of a", 0.95),
		("content of b", 0.9),
		("content of c", 0.85),
		("content of d", 0.3),
		("content of e", 0.8),
		("content of f", 0.75),
		("content of g", 0.7),
		("content of h", 0.65),
		("content of i", 0.1),
	]));
	let rewrite = Arc::new(SpyRewrite::new(&REWRITES));
	let service = build_service(rewrite_config(), store.clone(), rerank.clone(), rewrite.clone());
	let response = service
		.retrieve(RetrieveRequest::new("What is RAG?", "kb1"))
		.await
		.expect("Retrieve should succeed.");
	let ids = response.items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["a", "b", "c", "e", "f"]);
	assert!(response.items.windows(2).all(|pair| pair[0].score >= pair[1].score));
	assert_eq!(response.queries, REWRITES.to_vec());
	assert_eq!(response.failed_tasks, 0);
	assert_eq!(rewrite.count(), 3);
	assert_eq!(rerank.count(), 3);

	let queries = store.queries();
	let texts = queries.iter().map(|query| query.text.as_str()).collect::<BTreeSet<_>>();

	assert_eq!(queries.len(), 3);
	assert_eq!(texts, REWRITES.into_iter().collect::<BTreeSet<_>>());
	assert!(queries.iter().all(|query| query.limit == 25));
	assert!(queries.iter().all(|query| query.collection == "chunks"));
	assert!(queries.iter().all(|query| query.filter.knowledge_id == "kb1"));

	let prompts = rewrite.prompts();

	assert!(prompts[0][0].content.contains("Queries already used:\n(none)"));
	assert!(prompts[1][0].content.contains("- rag definition"));
	assert!(prompts[2][0].content.contains("- rag definition\n- retrieval augmented generation"));
	assert_eq!(prompts[2][1].content, "Question: What is RAG?");
}

#[tokio::test]
async fn duplicate_chunks_keep_their_best_score() {
	let store = Arc::new(
		ScriptedStore::default()
			.respond(REWRITES[0], vec![hit("doc_42", 0.7), hit("doc_1", 0.5)])
			.respond(REWRITES[1], vec![hit("doc_42", 0.9)])
			.respond(REWRITES[2], vec![hit("doc_42", 0.8), hit("doc_2", 0.3)]),
	);
	let service = build_service(
		rewrite_config(),
		store,
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&REWRITES)),
	);
	let request = RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Simple),
		..RetrieveRequest::new("What is RAG?", "kb1")
	};
	let response = service.retrieve(request).await.expect("Retrieve should succeed.");
	let doc_42 = response
		.items
		.iter()
		.filter(|item| item.id == "doc_42")
		.collect::<Vec<_>>();

	assert_eq!(doc_42.len(), 1);
	assert!((doc_42[0].score - 0.9).abs() < 1e-9);
	assert_eq!(response.items[0].id, "doc_42");
	assert_eq!(response.items.len(), 3);
}

#[tokio::test]
async fn rewrite_failure_fails_the_call() {
	let store = Arc::new(ScriptedStore::default().respond(REWRITES[0], vec![hit("a", 0.9)]));
	let rewrite = Arc::new(SpyRewrite::new(&REWRITES).failing_at(1));
	let service = build_service(
		rewrite_config(),
		store,
		Arc::new(TableRerank::new(&[("content of a", 0.9)])),
		rewrite.clone(),
	);
	let err = service
		.retrieve(RetrieveRequest::new("What is RAG?", "kb1"))
		.await
		.expect_err("Rewrite failure should fail the call.");

	match err {
		Error::Upstream { dependency, .. } => assert_eq!(dependency, Dependency::Llm),
		other => panic!("Expected an upstream LLM error, got {other:?}"),
	}

	assert_eq!(rewrite.count(), 2);
}

#[tokio::test]
async fn rewrite_disabled_runs_the_original_query_once() {
	let store = Arc::new(ScriptedStore::default().respond("What is RAG?", vec![hit("a", 0.9)]));
	let rewrite = Arc::new(SpyRewrite::new(&REWRITES));
	let service = build_service(
		test_config(3, "chunks"),
		store.clone(),
		Arc::new(TableRerank::new(&[("content of a", 0.8)])),
		rewrite.clone(),
	);
	let request = RetrieveRequest {
		enable_rewrite: Some(false),
		rewrite_attempts: Some(3),
		..RetrieveRequest::new("  What is RAG?  ", "kb1")
	};
	let response = service.retrieve(request).await.expect("Retrieve should succeed.");

	assert_eq!(rewrite.count(), 0);
	assert_eq!(response.queries, vec!["What is RAG?".to_string()]);
	assert_eq!(store.queries().len(), 1);
	assert_eq!(store.queries()[0].text, "What is RAG?");
	assert_eq!(response.items.len(), 1);
	assert!((response.items[0].score - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn concurrent_tasks_respect_the_fan_out_limit() {
	let mut cfg = rewrite_config();

	cfg.retrieval.rewrite_attempts = 4;
	cfg.retrieval.max_fan_out = 2;

	let store = Arc::new(ScriptedStore::default().delay(Duration::from_millis(30)));
	let service = build_service(
		cfg,
		store.clone(),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let response = service
		.retrieve(RetrieveRequest::new("What is RAG?", "kb1"))
		.await
		.expect("Retrieve should succeed.");

	assert!(response.items.is_empty());
	assert_eq!(response.queries.len(), 4);
	assert_eq!(store.queries().len(), 4);
	assert_eq!(store.peak_concurrency(), 2);
}

#[tokio::test]
async fn each_task_searches_while_the_next_rewrite_is_generated() {
	let store = Arc::new(ScriptedStore::default());
	let rewrite = Arc::new(SpyRewrite::new(&REWRITES).delay(Duration::from_millis(100)));
	let service = build_service(
		rewrite_config(),
		store.clone(),
		Arc::new(TableRerank::new(&[])),
		rewrite.clone(),
	);
	let request = RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Simple),
		..RetrieveRequest::new("What is RAG?", "kb1")
	};

	service.retrieve(request).await.expect("Retrieve should succeed.");

	let searched = store.search_times();
	let rewritten = rewrite.return_times();

	assert_eq!(searched.len(), 3);
	assert_eq!(rewritten.len(), 3);
	assert!(searched[0] < rewritten[1], "task 0 should search before rewrite 1 returns");
	assert!(searched[1] < rewritten[2], "task 1 should search before rewrite 2 returns");
}
