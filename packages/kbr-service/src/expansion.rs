use std::sync::Arc;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use kbr_config::LlmProviderConfig;
use kbr_providers::chat::ChatMessage;

use crate::{Dependency, Error, Result, RewriteProvider};

/// Rewrites produced so far in one retrieve call.
#[derive(Debug, Clone, Default)]
pub struct RewriteState {
	used: Vec<String>,
}
impl RewriteState {
	pub fn record(&mut self, rewrite: impl Into<String>) {
		self.used.push(rewrite.into());
	}

	pub fn used(&self) -> &[String] {
		&self.used
	}
}

/// Turns the caller's question into keyword queries, one LLM call per rewrite.
#[derive(Clone)]
pub struct QueryExpander {
	provider: Arc<dyn RewriteProvider>,
	cfg: LlmProviderConfig,
}
impl QueryExpander {
	pub fn new(provider: Arc<dyn RewriteProvider>, cfg: LlmProviderConfig) -> Self {
		Self { provider, cfg }
	}

	pub async fn expand(
		&self,
		question: &str,
		knowledge_id: &str,
		state: &RewriteState,
	) -> Result<String> {
		let messages =
			build_rewrite_messages(question, knowledge_id, state.used(), OffsetDateTime::now_utc());
		let raw = self.provider.generate(&self.cfg, &messages).await?;

		normalize_rewrite(&raw).ok_or_else(|| Error::Upstream {
			dependency: Dependency::Llm,
			message: "Query rewrite returned empty text.".to_string(),
		})
	}
}

pub fn build_rewrite_messages(
	question: &str,
	knowledge_id: &str,
	used: &[String],
	now: OffsetDateTime,
) -> Vec<ChatMessage> {
	let now = now.format(&Rfc3339).unwrap_or_else(|_| now.unix_timestamp().to_string());
	let used = if used.is_empty() {
		"(none)".to_string()
	} else {
		used.iter().map(|rewrite| format!("- {rewrite}")).collect::<Vec<_>>().join("\n")
	};
	let system = format!(
		"You rewrite questions into search queries for a knowledge base.\n\
		Current time: {now}\n\
		Knowledge base: {knowledge_id}\n\
		Queries already used:\n{used}\n\n\
		Rules:\n\
		1. Reply with the search query only, without explanation or quotes.\n\
		2. Use three to five concise keywords that capture the intent of the question.\n\
		3. Do not repeat a query that was already used; choose different wording.\n\
		4. Do not include the knowledge base name in the query."
	);

	vec![ChatMessage::system(system), ChatMessage::user(format!("Question: {question}"))]
}

/// Trims the reply, strips wrapping quotes, and collapses whitespace.
pub fn normalize_rewrite(raw: &str) -> Option<String> {
	let trimmed = raw.trim().trim_matches(|ch| matches!(ch, '"' | '\'' | '`' | '“' | '”'));
	let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

	if collapsed.is_empty() { None } else { Some(collapsed) }
}
