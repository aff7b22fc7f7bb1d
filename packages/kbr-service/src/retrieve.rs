use std::{sync::Arc, time::Duration};

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use kbr_storage::qdrant::{self, CollectionMode};

use crate::{
	Error, Result, RetrievalService,
	assemble::{self, MergedResultSet},
	expansion::{QueryExpander, RewriteState},
	rerank::RerankService,
	task::RetrievalTask,
	types::{Candidate, Channel, ResolvedRequest, RetrieveRequest, RetrieveResponse},
	vector::VectorSearchClient,
};

/// Lifecycle of one retrieve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutState {
	Expanding,
	Dispatching,
	Awaiting,
	Merging,
	Done,
	Failed,
}
impl FanOutState {
	pub fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Expanding, Self::Dispatching)
				| (Self::Dispatching, Self::Expanding)
				| (Self::Dispatching, Self::Awaiting)
				| (Self::Awaiting, Self::Merging)
				| (Self::Merging, Self::Done)
				| (Self::Expanding, Self::Failed)
				| (Self::Merging, Self::Failed)
		)
	}

	fn advance(&mut self, next: Self) {
		debug_assert!(
			self.can_transition_to(next),
			"Invalid fan-out transition {self:?} -> {next:?}."
		);

		tracing::trace!(from = ?self, to = ?next, "Fan-out state changed.");

		*self = next;
	}
}

/// Where one call's tasks search.
struct SearchPlan {
	collection: String,
	channels: Vec<Channel>,
}

impl RetrievalService {
	pub async fn retrieve(&self, req: RetrieveRequest) -> Result<RetrieveResponse> {
		self.retrieve_with_cancel(req, CancellationToken::new()).await
	}

	/// Like [`RetrievalService::retrieve`], but stops with [`Error::Cancelled`] once `cancel`
	/// fires. In-flight tasks are aborted either way.
	pub async fn retrieve_with_cancel(
		&self,
		req: RetrieveRequest,
		cancel: CancellationToken,
	) -> Result<RetrieveResponse> {
		let request = req.resolve(&self.cfg.retrieval)?;
		let plan = self.plan(&request)?;
		let trace_id = Uuid::new_v4();
		let timeout_ms = self.cfg.retrieval.request_timeout_ms;
		let span = tracing::info_span!(
			"retrieve",
			%trace_id,
			knowledge_id = %request.knowledge_id,
			mode = request.retrieve_mode.as_str(),
			tasks = request.task_count()
		);

		async move {
			let work = self.fan_out(trace_id, Arc::new(request), plan);
			let bounded = async {
				if timeout_ms == 0 {
					return work.await;
				}

				tokio::time::timeout(Duration::from_millis(timeout_ms), work)
					.await
					.map_err(|_| Error::Timeout { timeout_ms })?
			};

			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					tracing::warn!("Retrieval cancelled by caller.");

					Err(Error::Cancelled)
				},
				result = bounded => {
					if let Err(err) = &result {
						tracing::warn!(error = %err, "Retrieval failed.");
					}

					result
				},
			}
		}
		.instrument(span)
		.await
	}

	fn plan(&self, request: &ResolvedRequest) -> Result<SearchPlan> {
		let cfg = &self.cfg;

		if request.uses_cross_encoder() && cfg.providers.rerank.model.trim().is_empty() {
			return Err(Error::configuration(format!(
				"providers.rerank.model must be set for retrieve_mode {}.",
				request.retrieve_mode.as_str()
			)));
		}
		if request.enable_rewrite && cfg.providers.llm_rewrite.model.trim().is_empty() {
			return Err(Error::configuration(
				"providers.llm_rewrite.model must be set when rewrite is enabled.",
			));
		}

		let mut channels = Vec::with_capacity(cfg.retrieval.channels.len());

		for raw in &cfg.retrieval.channels {
			let channel = Channel::parse(raw).ok_or_else(|| {
				Error::configuration(format!("retrieval.channels entry {raw:?} is not a channel."))
			})?;

			if !channels.contains(&channel) {
				channels.push(channel);
			}
		}

		if channels.is_empty() {
			return Err(Error::configuration("retrieval.channels must be non-empty."));
		}

		let qdrant_cfg = &cfg.storage.qdrant;
		let mode = CollectionMode::parse(&qdrant_cfg.collection_mode).ok_or_else(|| {
			Error::configuration(format!(
				"storage.qdrant.collection_mode {:?} is not a known mode.",
				qdrant_cfg.collection_mode
			))
		})?;
		let collection =
			qdrant::resolve_collection(mode, &qdrant_cfg.collection, &request.knowledge_id);

		if collection.is_empty() {
			return Err(Error::configuration("storage.qdrant.collection must be non-empty."));
		}

		Ok(SearchPlan { collection, channels })
	}

	async fn fan_out(
		&self,
		trace_id: Uuid,
		request: Arc<ResolvedRequest>,
		plan: SearchPlan,
	) -> Result<RetrieveResponse> {
		let cfg = &self.cfg;
		let oversample = cfg.retrieval.oversample.clone();
		let search = VectorSearchClient::new(self.providers.vector.clone(), oversample);
		let task = RetrievalTask::new(
			search,
			RerankService::new(
				self.providers.rerank.clone(),
				cfg.providers.rerank.clone(),
				cfg.ranking.clone(),
			),
			plan.channels,
			plan.collection,
			request.clone(),
		);
		let expander =
			QueryExpander::new(self.providers.rewrite.clone(), cfg.providers.llm_rewrite.clone());
		let limiter = Arc::new(Semaphore::new(cfg.retrieval.max_fan_out.max(1) as usize));
		let total = request.task_count();
		let mut state = FanOutState::Expanding;
		let mut rewrites = RewriteState::default();
		let mut queries = Vec::with_capacity(total as usize);
		let mut tasks = JoinSet::new();

		for attempt in 0..total {
			if attempt > 0 {
				state.advance(FanOutState::Expanding);
			}

			let query = if request.enable_rewrite {
				match expander.expand(&request.query, &request.knowledge_id, &rewrites).await {
					Ok(query) => query,
					Err(err) => {
						state.advance(FanOutState::Failed);
						tasks.abort_all();

						tracing::error!(attempt, error = %err, "Query rewrite failed.");

						return Err(err);
					},
				}
			} else {
				request.query.clone()
			};

			if request.enable_rewrite {
				tracing::debug!(attempt, query = %query, "Query rewritten.");

				rewrites.record(query.clone());
			}

			state.advance(FanOutState::Dispatching);

			let task = task.clone();
			let limiter = limiter.clone();
			let task_query = query.clone();

			tasks.spawn(
				async move {
					let Ok(_permit) = limiter.acquire_owned().await else {
						return (attempt, Err(Error::Cancelled));
					};

					(attempt, task.run(&task_query).await)
				}
				.instrument(tracing::debug_span!("retrieval_task", attempt)),
			);
			queries.push(query);
		}

		state.advance(FanOutState::Awaiting);

		let mut outputs: Vec<(u32, Vec<Candidate>)> = Vec::with_capacity(total as usize);
		let mut failed_tasks = 0;

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((attempt, Ok(items))) => outputs.push((attempt, items)),
				Ok((attempt, Err(err))) => {
					failed_tasks += 1;

					tracing::warn!(attempt, error = %err, "Retrieval task failed.");
				},
				Err(err) => {
					failed_tasks += 1;

					tracing::warn!(error = %err, "Retrieval task did not complete.");
				},
			}
		}

		state.advance(FanOutState::Merging);

		if outputs.is_empty() && cfg.retrieval.fail_when_all_tasks_fail {
			state.advance(FanOutState::Failed);

			tracing::error!(failed_tasks, "All retrieval tasks failed.");

			return Err(Error::AllTasksFailed { attempts: failed_tasks });
		}

		outputs.sort_by_key(|(attempt, _)| *attempt);

		let mut merged = MergedResultSet::default();

		for (_, items) in outputs {
			merged.extend(items);
		}

		let unique = merged.unique_count();
		let items = assemble::assemble(merged, request.top_k);

		state.advance(FanOutState::Done);

		tracing::info!(
			tasks = total,
			failed_tasks,
			unique,
			returned = items.len(),
			"Retrieval completed."
		);

		Ok(RetrieveResponse { trace_id, items, queries, failed_tasks })
	}
}
