use std::{cmp::Ordering, collections::HashMap};

use crate::types::Candidate;

/// Union of every task's candidates, keyed by chunk id.
#[derive(Debug, Default)]
pub struct MergedResultSet {
	by_id: HashMap<String, Candidate>,
}
impl MergedResultSet {
	/// Keeps the higher-scored copy of each id. On a tie the copy inserted first stays.
	pub fn insert(&mut self, candidate: Candidate) {
		match self.by_id.get_mut(&candidate.id) {
			Some(existing) =>
				if candidate.score > existing.score {
					*existing = candidate;
				},
			None => {
				self.by_id.insert(candidate.id.clone(), candidate);
			},
		}
	}

	pub fn extend(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
		for candidate in candidates {
			self.insert(candidate);
		}
	}

	pub fn get(&self, id: &str) -> Option<&Candidate> {
		self.by_id.get(id)
	}

	/// Number of distinct chunk ids merged so far.
	pub fn unique_count(&self) -> usize {
		self.by_id.len()
	}

	pub fn into_candidates(self) -> Vec<Candidate> {
		self.by_id.into_values().collect()
	}
}

/// Final ranking: score descending, id ascending, at most `top_k` items.
pub fn assemble(merged: MergedResultSet, top_k: usize) -> Vec<Candidate> {
	let mut items = merged.into_candidates();

	sort_candidates(&mut items);
	items.truncate(top_k);

	items
}

pub fn sort_candidates(candidates: &mut [Candidate]) {
	candidates.sort_by(cmp_candidates);
}

pub fn cmp_candidates(a: &Candidate, b: &Candidate) -> Ordering {
	cmp_f64_desc(a.score, b.score).then_with(|| a.id.cmp(&b.id))
}

/// Descending order with NaN last.
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
