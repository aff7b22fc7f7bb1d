use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

/// Okapi BM25 over a fixed set of documents.
pub struct Bm25 {
	k1: f64,
	b: f64,
	doc_freq: HashMap<String, usize>,
	term_freqs: Vec<HashMap<String, usize>>,
	doc_lens: Vec<usize>,
	avg_doc_len: f64,
}
impl Bm25 {
	pub fn new<'a, I>(docs: I, cfg: &kbr_config::RankingBm25) -> Self
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut doc_freq: HashMap<String, usize> = HashMap::new();
		let mut term_freqs = Vec::new();
		let mut doc_lens = Vec::new();

		for doc in docs {
			let terms = tokenize(doc);
			let mut freqs: HashMap<String, usize> = HashMap::new();

			doc_lens.push(terms.len());

			for term in terms {
				*freqs.entry(term).or_insert(0) += 1;
			}
			for term in freqs.keys() {
				*doc_freq.entry(term.clone()).or_insert(0) += 1;
			}

			term_freqs.push(freqs);
		}

		let avg_doc_len = if doc_lens.is_empty() {
			0.0
		} else {
			doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
		};

		Self { k1: cfg.k1, b: cfg.b, doc_freq, term_freqs, doc_lens, avg_doc_len }
	}

	/// Scores every document against `query`, in construction order.
	pub fn scores(&self, query: &str) -> Vec<f64> {
		let terms = tokenize(query);
		let total = self.term_freqs.len() as f64;

		self.term_freqs
			.iter()
			.zip(&self.doc_lens)
			.map(|(freqs, doc_len)| {
				let len_ratio =
					if self.avg_doc_len > 0.0 { *doc_len as f64 / self.avg_doc_len } else { 0.0 };

				terms
					.iter()
					.filter_map(|term| {
						let tf = *freqs.get(term)? as f64;
						let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
						let idf = (1.0 + (total - df + 0.5) / (df + 0.5)).ln();
						let norm = tf + self.k1 * (1.0 - self.b + self.b * len_ratio);

						Some(idf * (tf * (self.k1 + 1.0)) / norm)
					})
					.sum()
			})
			.collect()
	}
}

/// Lower-cased Unicode words.
pub fn tokenize(text: &str) -> Vec<String> {
	text.unicode_words().map(str::to_lowercase).collect()
}
