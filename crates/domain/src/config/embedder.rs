use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// If absent, Analyzers run in text-only mode (§4.4).
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_dimension")]
    pub dimension: usize,
    #[serde(default = "d_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: d_model(),
            dimension: d_dimension(),
            batch_size: d_batch_size(),
        }
    }
}

fn d_model() -> String {
    "text-embedding-3-small".into()
}
fn d_dimension() -> usize {
    1536
}
fn d_batch_size() -> usize {
    16
}
