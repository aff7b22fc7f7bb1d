use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::acceptance::{ScriptedStore, SpyRewrite, TableRerank, build_service, hit, test_config};
use kbr_service::{Error, RetrieveMode, RetrieveRequest};

const REWRITES: [&str; 3] = ["first rewrite", "second rewrite", "third rewrite"];

fn rewrite_config() -> kbr_config::Config {
	let mut cfg = test_config(3, "chunks");

	cfg.retrieval.enable_rewrite = true;
	cfg.retrieval.rewrite_attempts = 3;
	cfg.retrieval.retrieve_mode = "simple".to_string();

	cfg
}

fn all_failing_store() -> ScriptedStore {
	REWRITES.iter().fold(ScriptedStore::default(), |store, text| store.fail_on(text))
}

#[tokio::test]
async fn a_failed_task_does_not_fail_the_call() {
	let store = Arc::new(
		ScriptedStore::default()
			.respond(REWRITES[0], vec![hit("a", 0.9)])
			.fail_on(REWRITES[1])
			.respond(REWRITES[2], vec![hit("c", 0.5)]),
	);
	let service = build_service(
		rewrite_config(),
		store,
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&REWRITES)),
	);
	let response = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect("Retrieve should tolerate one failed task.");
	let ids = response.items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();

	assert_eq!(ids, vec!["a", "c"]);
	assert_eq!(response.failed_tasks, 1);
	assert_eq!(response.queries.len(), 3);
}

#[tokio::test]
async fn all_failed_tasks_return_empty_by_default() {
	let service = build_service(
		rewrite_config(),
		Arc::new(all_failing_store()),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&REWRITES)),
	);
	let response = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect("Lenient policy should return an empty result.");

	assert!(response.items.is_empty());
	assert_eq!(response.failed_tasks, 3);
}

#[tokio::test]
async fn all_failed_tasks_error_when_configured() {
	let mut cfg = rewrite_config();

	cfg.retrieval.fail_when_all_tasks_fail = true;

	let service = build_service(
		cfg,
		Arc::new(all_failing_store()),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&REWRITES)),
	);
	let err = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect_err("Strict policy should fail.");

	assert!(matches!(err, Error::AllTasksFailed { attempts: 3 }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn cancellation_stops_in_flight_work() {
	let store = Arc::new(
		ScriptedStore::default()
			.respond("q", vec![hit("a", 0.9)])
			.delay(Duration::from_millis(300)),
	);
	let service = build_service(
		test_config(3, "chunks"),
		store.clone(),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	let started = Instant::now();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		trigger.cancel();
	});

	let err = service
		.retrieve_with_cancel(RetrieveRequest::new("q", "kb1"), cancel)
		.await
		.expect_err("Cancelled retrieve should fail.");

	assert!(matches!(err, Error::Cancelled), "unexpected error: {err:?}");
	assert!(started.elapsed() < Duration::from_millis(250));
	assert_eq!(store.queries().len(), 1);

	// Long enough for the search to finish had it not been aborted.
	tokio::time::sleep(Duration::from_millis(500)).await;

	assert_eq!(store.completed(), 0);
}

#[tokio::test]
async fn slow_calls_time_out() {
	let mut cfg = test_config(3, "chunks");

	cfg.retrieval.request_timeout_ms = 100;

	let store = Arc::new(ScriptedStore::default().delay(Duration::from_secs(5)));
	let service = build_service(
		cfg,
		store,
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let err = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect_err("Slow retrieve should time out.");

	assert!(matches!(err, Error::Timeout { timeout_ms: 100 }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn cross_encoder_modes_require_a_rerank_model() {
	let mut cfg = test_config(3, "chunks");

	cfg.providers.rerank.model = String::new();

	let store = Arc::new(ScriptedStore::default().respond("q", vec![hit("a", 0.9)]));
	let service = build_service(
		cfg,
		store.clone(),
		Arc::new(TableRerank::new(&[])),
		Arc::new(SpyRewrite::new(&[])),
	);
	let err = service
		.retrieve(RetrieveRequest::new("q", "kb1"))
		.await
		.expect_err("Rerank mode without a model should fail.");

	assert!(matches!(err, Error::Configuration { .. }), "unexpected error: {err:?}");
	assert!(store.queries().is_empty());

	let request = RetrieveRequest {
		retrieve_mode: Some(RetrieveMode::Simple),
		..RetrieveRequest::new("q", "kb1")
	};
	let response = service.retrieve(request).await.expect("Simple mode needs no rerank model.");

	assert_eq!(response.items.len(), 1);
}

#[tokio::test]
async fn invalid_requests_touch_no_provider() {
	let store = Arc::new(ScriptedStore::default());
	let rewrite = Arc::new(SpyRewrite::new(&[]));
	let service = build_service(
		rewrite_config(),
		store.clone(),
		Arc::new(TableRerank::new(&[])),
		rewrite.clone(),
	);
	let err = service
		.retrieve(RetrieveRequest::new("   ", "kb1"))
		.await
		.expect_err("Blank query should be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "unexpected error: {err:?}");
	assert!(store.queries().is_empty());
	assert_eq!(rewrite.count(), 0);
}
