//! Seam for an optional LLM-backed root-cause reasoner.
//!
//! Grounded on `original_source/src/detection/ai_analyzer.py`'s `AIIncidentAnalyzer`
//! (Ollama prompt asking for root cause + confidence + contributing factors + ranked actions);
//! this crate defines the contract and a `NullAiAnalyzer` fallback. A real HTTP-backed
//! implementation plugs in behind the same trait without touching the rest of the pipeline.

use async_trait::async_trait;
use autopilot_common::{Anomaly, Error, Result};

/// A single action the reasoner recommends, ranked by priority (1 = most confident).
#[derive(Debug, Clone, PartialEq)]
pub struct AiRecommendedAction {
    pub action_type: String,
    pub priority: u8,
}

/// The reasoner's full verdict on an incident.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAnalysis {
    pub root_cause_description: String,
    pub root_cause_confidence: f64,
    pub contributing_factors: Vec<String>,
    pub recommended_actions: Vec<AiRecommendedAction>,
    pub preventive_measures: Vec<String>,
}

impl AiAnalysis {
    /// True iff `action_type` appears anywhere in the reasoner's recommendations.
    pub fn recommends(&self, action_type: &str) -> Option<&AiRecommendedAction> {
        self.recommended_actions.iter().find(|a| a.action_type == action_type)
    }
}

/// The optional root-cause reasoning seam.
#[async_trait]
pub trait AiAnalyzer: Send + Sync {
    async fn analyze(&self, service: &str, anomalies: &[Anomaly], logs: &[String]) -> Result<AiAnalysis>;
}

/// No LLM configured: signals `AnalyzerUnavailable` so C5 falls back to its heuristic root-cause
/// chain (§4.4/§7) rather than returning a low-confidence stand-in that would otherwise win out
/// over a confident heuristic match.
pub struct NullAiAnalyzer;

#[async_trait]
impl AiAnalyzer for NullAiAnalyzer {
    async fn analyze(&self, _service: &str, _anomalies: &[Anomaly], _logs: &[String]) -> Result<AiAnalysis> {
        Err(Error::AnalyzerUnavailable("no AI analyzer configured".to_string()))
    }
}
