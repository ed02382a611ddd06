use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub contradiction: ContradictionConfig,
    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,
    #[serde(default)]
    pub health: HealthWeightsConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            contradiction: ContradictionConfig::default(),
            loop_detection: LoopDetectionConfig::default(),
            health: HealthWeightsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContradictionConfig {
    #[serde(default = "d_knn_k")]
    pub knn_k: usize,
    #[serde(default = "d_min_similarity")]
    pub min_similarity: f64,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            knn_k: d_knn_k(),
            min_similarity: d_min_similarity(),
        }
    }
}

fn d_knn_k() -> usize {
    10
}
fn d_min_similarity() -> f64 {
    0.85
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    #[serde(default = "d_window")]
    pub window: usize,
    #[serde(default = "d_min_pattern_length")]
    pub min_pattern_length: usize,
    #[serde(default = "d_min_repetitions")]
    pub min_repetitions: u32,
    #[serde(default = "d_intervention_threshold")]
    pub intervention_threshold: u32,
    /// Jaccard threshold for text-only-mode fingerprint equivalence
    /// (open question in the design notes; pinned at 0.8).
    #[serde(default = "d_text_mode_jaccard")]
    pub text_mode_jaccard_threshold: f64,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window: d_window(),
            min_pattern_length: d_min_pattern_length(),
            min_repetitions: d_min_repetitions(),
            intervention_threshold: d_intervention_threshold(),
            text_mode_jaccard_threshold: d_text_mode_jaccard(),
        }
    }
}

fn d_window() -> usize {
    20
}
fn d_min_pattern_length() -> usize {
    2
}
fn d_min_repetitions() -> u32 {
    2
}
fn d_intervention_threshold() -> u32 {
    3
}
fn d_text_mode_jaccard() -> f64 {
    0.8
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthWeightsConfig {
    #[serde(default = "d_w_coherence")]
    pub coherence: f64,
    #[serde(default = "d_w_contradiction")]
    pub contradiction: f64,
    #[serde(default = "d_w_loop")]
    pub r#loop: f64,
    #[serde(default = "d_w_citation")]
    pub citation: f64,
    /// Cosine similarity above which two consecutive assistant messages are
    /// considered "too similar" when scoring coherence.
    #[serde(default = "d_too_similar")]
    pub too_similar_threshold: f64,
}

impl Default for HealthWeightsConfig {
    fn default() -> Self {
        Self {
            coherence: d_w_coherence(),
            contradiction: d_w_contradiction(),
            r#loop: d_w_loop(),
            citation: d_w_citation(),
            too_similar_threshold: d_too_similar(),
        }
    }
}

impl HealthWeightsConfig {
    /// Clamp and re-normalize so weights always sum to 1.0.
    pub fn normalized(&self) -> Self {
        let sum = self.coherence + self.contradiction + self.r#loop + self.citation;
        if sum <= 0.0 {
            return HealthWeightsConfig::default();
        }
        Self {
            coherence: self.coherence / sum,
            contradiction: self.contradiction / sum,
            r#loop: self.r#loop / sum,
            citation: self.citation / sum,
            too_similar_threshold: self.too_similar_threshold,
        }
    }
}

fn d_w_coherence() -> f64 {
    0.40
}
fn d_w_contradiction() -> f64 {
    0.30
}
fn d_w_loop() -> f64 {
    0.20
}
fn d_w_citation() -> f64 {
    0.10
}
fn d_too_similar() -> f64 {
    0.92
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = HealthWeightsConfig::default();
        let sum = w.coherence + w.contradiction + w.r#loop + w.citation;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_rescales_skewed_weights() {
        let w = HealthWeightsConfig {
            coherence: 2.0,
            contradiction: 2.0,
            r#loop: 0.0,
            citation: 0.0,
            too_similar_threshold: 0.92,
        };
        let n = w.normalized();
        assert!((n.coherence - 0.5).abs() < 1e-9);
        assert!((n.contradiction - 0.5).abs() < 1e-9);
    }
}
