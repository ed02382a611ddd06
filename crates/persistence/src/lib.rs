//! Relational + vector hybrid persistence (§4.9): Postgres via `sqlx`,
//! embeddings via `pgvector`.

mod codec;
mod rows;
mod store;

pub use store::{ContradictionFilter, ConversationStore, LoopFilter, PgStore};
