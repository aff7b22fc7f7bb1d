use std::fmt::{Display, Formatter};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// External collaborator behind an [`Error::Upstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
	Llm,
	Embedding,
	VectorStore,
	Rerank,
}
impl Dependency {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Llm => "llm",
			Self::Embedding => "embedding",
			Self::VectorStore => "vector store",
			Self::Rerank => "rerank",
		}
	}
}
impl Display for Dependency {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Upstream {dependency} error: {message}")]
	Upstream { dependency: Dependency, message: String },
	#[error("All {attempts} retrieval tasks failed.")]
	AllTasksFailed { attempts: usize },
	#[error("Retrieval was cancelled.")]
	Cancelled,
	#[error("Retrieval timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
}
impl Error {
	pub fn upstream(dependency: Dependency, err: impl Display) -> Self {
		Self::Upstream { dependency, message: err.to_string() }
	}

	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		Self::Configuration { message: message.into() }
	}
}

impl From<kbr_storage::Error> for Error {
	fn from(err: kbr_storage::Error) -> Self {
		match err {
			kbr_storage::Error::InvalidArgument(message) =>
				Self::Upstream { dependency: Dependency::VectorStore, message },
			kbr_storage::Error::Qdrant(inner) => Self::upstream(Dependency::VectorStore, inner),
		}
	}
}
