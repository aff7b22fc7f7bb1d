use std::collections::HashMap;

use qdrant_client::qdrant::{PointId, ScoredPoint, Value, point_id::PointIdOptions, value::Kind};

pub const PAYLOAD_CHUNK_ID: &str = "chunk_id";
pub const PAYLOAD_TEXT: &str = "text";
pub const PAYLOAD_KNOWLEDGE_ID: &str = "knowledge_id";
pub const PAYLOAD_DOCUMENT_ID: &str = "document_id";

/// A chunk decoded from a scored Qdrant point.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkHit {
	pub id: String,
	pub content: String,
	pub score: f32,
	pub knowledge_id: Option<String>,
	pub document_id: Option<String>,
}

/// Decodes a point into a [`ChunkHit`].
///
/// The payload `chunk_id` wins over the point id. Points without an id or text yield `None`.
pub fn decode_hit(point: &ScoredPoint) -> Option<ChunkHit> {
	let id = payload_string(&point.payload, PAYLOAD_CHUNK_ID)
		.or_else(|| point.id.as_ref().and_then(point_id_to_string))?;
	let content = payload_string(&point.payload, PAYLOAD_TEXT)?;

	Some(ChunkHit {
		id,
		content,
		score: point.score,
		knowledge_id: payload_string(&point.payload, PAYLOAD_KNOWLEDGE_ID),
		document_id: payload_string(&point.payload, PAYLOAD_DOCUMENT_ID),
	})
}

pub fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(num)) => Some(num.to_string()),
		None => None,
	}
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) if !text.is_empty() => Some(text.to_string()),
		Some(Kind::IntegerValue(number)) => Some(number.to_string()),
		_ => None,
	}
}
