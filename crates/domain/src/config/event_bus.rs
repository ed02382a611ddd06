use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Bounded queue depth; the Orchestrator blocks (never drops) when full.
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
    /// Ring buffer retained for `Last-Event-ID` resume after the consumer
    /// disconnects.
    #[serde(default = "d_ring_buffer_size")]
    pub ring_buffer_size: usize,
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: d_queue_capacity(),
            ring_buffer_size: d_ring_buffer_size(),
            heartbeat_interval_secs: d_heartbeat_secs(),
        }
    }
}

fn d_queue_capacity() -> usize {
    1024
}
fn d_ring_buffer_size() -> usize {
    256
}
fn d_heartbeat_secs() -> u64 {
    15
}
