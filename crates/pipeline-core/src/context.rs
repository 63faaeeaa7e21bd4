//! Shared pipeline context.
//!
//! Provides a common context shared across the processing pipeline including
//! the stream name, statistics, and metadata. Operators use it to coordinate
//! and to prefix their log output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Statistics collected while a pipeline runs.
#[derive(Debug, Default)]
pub struct Statistics {
    /// Total number of packets handled by the chain.
    pub processed_packets: usize,
    /// Packets rejected by the filter stage.
    pub filtered_packets: usize,
    /// Count of keyframes seen.
    pub keyframes: usize,
    /// Total payload bytes handled.
    pub payload_bytes: usize,
    /// Total duration of processed media.
    pub duration: Duration,
}

/// Shared context for one pipeline instance.
#[derive(Debug, Clone)]
pub struct StreamerContext {
    /// Name of the stream being processed, used as a log prefix.
    pub name: String,
    /// Runtime statistics about the processing operation.
    pub statistics: Arc<Mutex<Statistics>>,
    /// Additional metadata properties.
    pub metadata: Arc<Mutex<HashMap<String, String>>>,
}

impl StreamerContext {
    pub fn new() -> Self {
        Self {
            name: "DefaultStreamer".to_string(),
            statistics: Arc::new(Mutex::new(Statistics::default())),
            metadata: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn arc_new() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }
}

impl Default for StreamerContext {
    fn default() -> Self {
        Self::new()
    }
}
