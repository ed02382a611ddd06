//! In-process kNN vector store (§4.4).
//!
//! Debates run to at most a few hundred messages; brute-force cosine
//! similarity is fine at that scale and avoids pulling in an ANN index
//! dependency for something this crate only ever queries per-conversation.
//! The durable counterpart (pgvector-backed, queried the same way) lives in
//! `parley-persistence`; this store exists so analyzers can run against an
//! in-flight debate without a round-trip to Postgres on every turn.

use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Entry {
    message_id: Uuid,
    vector: Vec<f32>,
}

/// Per-conversation in-memory embedding index.
#[derive(Default)]
pub struct VectorStore {
    by_conversation: HashMap<Uuid, Vec<Entry>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conversation_id: Uuid, message_id: Uuid, vector: Vec<f32>) {
        self.by_conversation
            .entry(conversation_id)
            .or_default()
            .push(Entry { message_id, vector });
    }

    /// Return at most `k` messages from `conversation_id`, excluding
    /// `exclude`, ordered by descending cosine similarity and filtered by
    /// `similarity >= min_similarity`.
    pub fn knn(
        &self,
        conversation_id: Uuid,
        query: &[f32],
        k: usize,
        min_similarity: f64,
        exclude: Uuid,
    ) -> Vec<(Uuid, f64)> {
        let Some(entries) = self.by_conversation.get(&conversation_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(Uuid, f64)> = entries
            .iter()
            .filter(|e| e.message_id != exclude)
            .map(|e| (e.message_id, cosine_similarity(query, &e.vector)))
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Look up a previously inserted vector by message id, for callers
    /// (loop-detection fingerprinting) that need the raw embedding rather
    /// than a similarity ranking.
    pub fn get(&self, conversation_id: Uuid, message_id: Uuid) -> Option<Vec<f32>> {
        self.by_conversation
            .get(&conversation_id)?
            .iter()
            .find(|e| e.message_id == message_id)
            .map(|e| e.vector.clone())
    }

    pub fn len(&self, conversation_id: Uuid) -> usize {
        self.by_conversation
            .get(&conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, conversation_id: Uuid) -> bool {
        self.len(conversation_id) == 0
    }
}

/// Cosine similarity in `[-1, 1]`; callers treat `1 - cosine_distance` as
/// similarity, which for normalized dot-product cosine is the same value.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
