//! Stable 16-hex-digit fingerprinting over `{service, rootCauseType, latencySpike?,
//! errorRateSpike?, memoryIssue?, cpuIssue?}`, grounded on
//! `original_source/src/prevention/repeat_eliminator.py::generate_pattern_fingerprint`.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymptomFlags {
    pub latency_spike: bool,
    pub error_rate_spike: bool,
    pub memory_issue: bool,
    pub cpu_issue: bool,
}

impl SymptomFlags {
    /// Derives the four coarse flags from an incident's symptom strings and root cause text.
    pub fn from_text(symptoms: &[String], root_cause: &str) -> Self {
        let joined = format!("{} {}", symptoms.join(" "), root_cause).to_lowercase();
        Self {
            latency_spike: joined.contains("latency"),
            error_rate_spike: joined.contains("error_rate") || joined.contains("error rate"),
            memory_issue: joined.contains("memory") || joined.contains("oom"),
            cpu_issue: joined.contains("cpu"),
        }
    }

    pub fn signature(&self) -> String {
        let mut map: BTreeMap<&str, bool> = BTreeMap::new();
        map.insert("latency_spike", self.latency_spike);
        map.insert("error_rate_spike", self.error_rate_spike);
        map.insert("memory_issue", self.memory_issue);
        map.insert("cpu_issue", self.cpu_issue);
        serde_json::to_string(&map).expect("map of bools always serializes")
    }
}

pub fn fingerprint(service: &str, root_cause: &str, flags: SymptomFlags) -> String {
    let mut map: BTreeMap<&str, String> = BTreeMap::new();
    map.insert("service", service.to_string());
    map.insert("root_cause_type", root_cause.to_string());
    map.insert("latency_spike", flags.latency_spike.to_string());
    map.insert("error_rate_spike", flags.error_rate_spike.to_string());
    map.insert("memory_issue", flags.memory_issue.to_string());
    map.insert("cpu_issue", flags.cpu_issue.to_string());
    let serialized = serde_json::to_string(&map).expect("map of strings always serializes");
    short_hash(&serialized, 16)
}

pub fn root_cause_hash(root_cause: &str) -> String {
    short_hash(root_cause, 16)
}

fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..len].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_16_hex_chars_and_stable() {
        let flags = SymptomFlags::from_text(&["OOMKilled: memory at 97%".to_string()], "Pod OOMKilled");
        let a = fingerprint("api", "Pod OOMKilled", flags);
        let b = fingerprint("api", "Pod OOMKilled", flags);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn differs_across_services() {
        let flags = SymptomFlags::default();
        assert_ne!(fingerprint("api", "x", flags), fingerprint("web", "x", flags));
    }
}
