use std::{
	collections::BTreeSet,
	fmt::{Display, Formatter},
};

use qdrant_client::qdrant::{Condition, Filter};

use crate::payload::{PAYLOAD_CHUNK_ID, PAYLOAD_KNOWLEDGE_ID};

/// Restricts a search to one knowledge base, optionally hiding chunks that were already selected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnowledgeFilter {
	pub knowledge_id: String,
	pub exclude_ids: BTreeSet<String>,
}
impl KnowledgeFilter {
	pub fn new(knowledge_id: impl Into<String>) -> Self {
		Self { knowledge_id: knowledge_id.into(), exclude_ids: BTreeSet::new() }
	}

	pub fn excluding<I, S>(mut self, ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.exclude_ids.extend(ids.into_iter().map(Into::into));

		self
	}

	pub fn excludes(&self, id: &str) -> bool {
		self.exclude_ids.contains(id)
	}

	/// Renders the filter as `knowledge_id == "kb1" && id not in ["a", "b"]`.
	pub fn expression(&self) -> String {
		let mut expr = format!("knowledge_id == {}", quote(&self.knowledge_id));

		if !self.exclude_ids.is_empty() {
			let ids = self.exclude_ids.iter().map(|id| quote(id)).collect::<Vec<_>>();

			expr.push_str(&format!(" && id not in [{}]", ids.join(", ")));
		}

		expr
	}

	pub fn to_qdrant(&self) -> Filter {
		let must_not = if self.exclude_ids.is_empty() {
			Vec::new()
		} else {
			vec![Condition::matches(
				PAYLOAD_CHUNK_ID,
				self.exclude_ids.iter().cloned().collect::<Vec<_>>(),
			)]
		};

		Filter {
			must: vec![Condition::matches(PAYLOAD_KNOWLEDGE_ID, self.knowledge_id.clone())],
			should: Vec::new(),
			must_not,
			min_should: None,
		}
	}
}
impl Display for KnowledgeFilter {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.expression())
	}
}

fn quote(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len() + 2);

	out.push('"');

	for ch in raw.chars() {
		match ch {
			'"' => out.push_str("\\\""),
			'\\' => out.push_str("\\\\"),
			_ => out.push(ch),
		}
	}

	out.push('"');

	out
}
