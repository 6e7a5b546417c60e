use serde::{Deserialize, Serialize};

use crate::streaming::buffer::BufferMetrics;

/// Lifecycle state of a gaze stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", content = "data")]
pub enum StreamState {
    /// Not subscribed to the device
    #[default]
    Idle,

    /// Ingestion worker running
    Streaming { started_at_us: i64 },

    /// The worker stopped on a device failure
    Error { message: String },
}

impl StreamState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

/// Counters for one streamer
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StreamStats {
    pub callbacks_received: u64,
    pub samples_enqueued: u64,
    pub invalid_dropped: u64,
    pub marks_placed: u64,
    pub exports_started: u64,
    /// Measured from buffered timestamps; `None` with fewer than two samples
    pub sample_rate_hz: Option<f64>,
    pub buffer: BufferMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&StreamState::Streaming { started_at_us: 5 }).unwrap();
        assert_eq!(json, r#"{"type":"Streaming","data":{"started_at_us":5}}"#);

        let idle: StreamState = serde_json::from_str(r#"{"type":"Idle"}"#).unwrap();
        assert_eq!(idle, StreamState::Idle);
        assert!(!idle.is_streaming());
    }
}
