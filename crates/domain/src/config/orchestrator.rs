use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Wall-clock deadline from `turn.started` to the terminal delta (§5).
    #[serde(default = "d_turn_deadline_secs")]
    pub turn_deadline_secs: u64,
    /// Retry backoff schedule for streaming-transient errors (§4.7): 1s, 4s.
    #[serde(default = "d_retry_backoffs_ms")]
    pub retry_backoffs_ms: [u64; 2],
    /// Semaphore cap on concurrent provider streams process-wide (§5).
    #[serde(default = "d_max_concurrent_streams")]
    pub max_concurrent_streams: usize,
    /// Rounds after which the judge first becomes eligible to run, for
    /// `JudgeCadence::PerRound` (open question decision: judge runs from
    /// round 0 onward unless raised).
    #[serde(default)]
    pub min_rounds_before_judge: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_deadline_secs: d_turn_deadline_secs(),
            retry_backoffs_ms: d_retry_backoffs_ms(),
            max_concurrent_streams: d_max_concurrent_streams(),
            min_rounds_before_judge: 0,
        }
    }
}

fn d_turn_deadline_secs() -> u64 {
    120
}
fn d_retry_backoffs_ms() -> [u64; 2] {
    [1_000, 4_000]
}
fn d_max_concurrent_streams() -> usize {
    16
}
