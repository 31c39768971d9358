//! Stable incident fingerprinting (§3): a 24-hex-digit hash of the service plus the dedup'd,
//! sorted set of `{metric, type, severity, direction}` tuples across an incident's anomalies.
//! `type` is the constant `"anomaly"` literal, matching
//! `original_source/src/detection/anomaly_detector.py`'s `"type": "anomaly"` field — a second,
//! independently-sourced feature from `metric`, not a duplicate of it.

use autopilot_common::Anomaly;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

pub fn fingerprint(service: &str, anomalies: &[Anomaly]) -> String {
    let mut parts: BTreeSet<String> = anomalies
        .iter()
        .map(|a| {
            format!(
                "metric:{}:type:{}:severity:{}:direction:{}",
                a.metric,
                "anomaly",
                a.severity,
                match a.direction() {
                    autopilot_common::Direction::Above => "above",
                    autopilot_common::Direction::Below => "below",
                }
            )
        })
        .collect();
    parts.insert(format!("service:{service}"));

    let joined = parts.into_iter().collect::<Vec<_>>().join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..24].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_common::Severity;
    use chrono::Utc;

    fn anomaly(metric: &str, value: f64, mean: f64) -> Anomaly {
        Anomaly {
            service: "svc".to_string(),
            metric: metric.to_string(),
            value,
            mean,
            stddev: 1.0,
            z_score: 3.0,
            deviation_pct: 10.0,
            severity: Severity::High,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn stable_across_reordering_and_duplicates() {
        let a = vec![anomaly("cpu", 95.0, 50.0), anomaly("memory", 90.0, 40.0)];
        let b = vec![anomaly("memory", 90.0, 40.0), anomaly("cpu", 95.0, 50.0), anomaly("cpu", 95.0, 50.0)];
        assert_eq!(fingerprint("svc", &a), fingerprint("svc", &b));
    }

    #[test]
    fn is_24_hex_chars() {
        let fp = fingerprint("svc", &[anomaly("cpu", 95.0, 50.0)]);
        assert_eq!(fp.len(), 24);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
