//! The symptom-keyed preventive action table, grounded on
//! `original_source/src/prevention/repeat_eliminator.py`'s `preventive_actions` dict.

#[derive(Debug, Clone)]
pub struct PreventiveMeasure {
    pub action_type: &'static str,
    pub params: &'static [(&'static str, &'static str)],
    pub base_confidence: f64,
    pub estimated_effectiveness: f64,
}

/// Primary symptom categories the eliminator recognizes, in the Python original's check order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymptomType {
    MemoryIssue,
    LatencySpike,
    ErrorRateSpike,
    CpuIssue,
    ConnectionExhaustion,
    PodCrash,
}

impl SymptomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymptomType::MemoryIssue => "memory_issue",
            SymptomType::LatencySpike => "latency_spike",
            SymptomType::ErrorRateSpike => "error_rate_spike",
            SymptomType::CpuIssue => "cpu_issue",
            SymptomType::ConnectionExhaustion => "connection_exhaustion",
            SymptomType::PodCrash => "pod_crash",
        }
    }

    /// Identify the primary symptom from lowercase symptom/root-cause text, preferring memory
    /// over latency over error-rate over cpu, matching the original's check order; falls back
    /// to a connection/pod-crash check and then to latency as the catch-all default.
    pub fn identify(symptom_text: &str) -> SymptomType {
        let text = symptom_text.to_lowercase();
        if text.contains("memory") || text.contains("oom") {
            SymptomType::MemoryIssue
        } else if text.contains("latency") {
            SymptomType::LatencySpike
        } else if text.contains("error_rate") || text.contains("error rate") {
            SymptomType::ErrorRateSpike
        } else if text.contains("cpu") {
            SymptomType::CpuIssue
        } else if text.contains("connection") {
            SymptomType::ConnectionExhaustion
        } else if text.contains("crash") || text.contains("crashloop") {
            SymptomType::PodCrash
        } else {
            SymptomType::LatencySpike
        }
    }
}

pub fn preventive_measures(symptom: SymptomType) -> &'static [PreventiveMeasure] {
    match symptom {
        SymptomType::LatencySpike => &[
            PreventiveMeasure { action_type: "scale_up", params: &[("target_replicas", "6")], base_confidence: 85.0, estimated_effectiveness: 0.8 },
            PreventiveMeasure { action_type: "update_resources", params: &[("cpu_limit", "2000m"), ("memory_limit", "4Gi")], base_confidence: 75.0, estimated_effectiveness: 0.7 },
        ],
        SymptomType::MemoryIssue => &[
            PreventiveMeasure { action_type: "restart_service", params: &[], base_confidence: 90.0, estimated_effectiveness: 0.85 },
            PreventiveMeasure { action_type: "update_resources", params: &[("memory_limit", "8Gi")], base_confidence: 80.0, estimated_effectiveness: 0.75 },
        ],
        SymptomType::ErrorRateSpike => &[
            PreventiveMeasure { action_type: "rollback", params: &[], base_confidence: 85.0, estimated_effectiveness: 0.8 },
            PreventiveMeasure { action_type: "scale_up", params: &[("target_replicas", "4")], base_confidence: 70.0, estimated_effectiveness: 0.6 },
        ],
        SymptomType::CpuIssue => &[
            PreventiveMeasure { action_type: "scale_up", params: &[("target_replicas", "5")], base_confidence: 80.0, estimated_effectiveness: 0.75 },
            PreventiveMeasure { action_type: "update_resources", params: &[("cpu_limit", "4000m")], base_confidence: 85.0, estimated_effectiveness: 0.8 },
        ],
        SymptomType::ConnectionExhaustion => &[
            PreventiveMeasure { action_type: "kill_connections", params: &[("idle_seconds", "300")], base_confidence: 90.0, estimated_effectiveness: 0.9 },
            PreventiveMeasure { action_type: "restart_service", params: &[], base_confidence: 75.0, estimated_effectiveness: 0.7 },
        ],
        SymptomType::PodCrash => &[
            PreventiveMeasure { action_type: "update_resources", params: &[("memory_limit", "4Gi")], base_confidence: 85.0, estimated_effectiveness: 0.8 },
            PreventiveMeasure { action_type: "restart_service", params: &[], base_confidence: 70.0, estimated_effectiveness: 0.65 },
        ],
    }
}
