//! Wire shapes for the `ingest:metrics` / `ingest:logs` queues.
//!
//! Ingestion itself is out of scope (§1, Non-goals) - these are the illustrative payloads
//! an external ingestion collaborator is expected to `LPush` onto the queues named in §6's
//! persisted key layout, and that L1/L2 `RPop` off the tail.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedMetric {
    pub service: String,
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedLog {
    pub service: String,
    pub message: String,
    pub is_error: bool,
}

pub const METRIC_QUEUE_KEY: &str = "ingest:metrics";
pub const LOG_QUEUE_KEY: &str = "ingest:logs";
