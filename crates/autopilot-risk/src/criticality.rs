//! Service-name pattern matching for criticality tiers, grounded on
//! `original_source/src/deployment/risk_analyzer.py::_load_service_criticality`.

use autopilot_common::Tier;

const TIER_1: &[&str] = &["payment", "auth", "checkout", "api-gateway", "database-primary"];
const TIER_2: &[&str] = &["order", "user", "inventory", "kafka", "redis"];
const TIER_3: &[&str] = &["notification", "analytics", "logging", "monitoring"];
const TIER_4: &[&str] = &["dev", "test", "staging"];

/// Exact match first, then substring match, defaulting to Tier 2 ("important") when unknown.
pub fn identify_tier(service: &str) -> Tier {
    let lower = service.to_lowercase();
    for (patterns, tier) in [(TIER_1, Tier::Tier1), (TIER_2, Tier::Tier2), (TIER_3, Tier::Tier3), (TIER_4, Tier::Tier4)] {
        if patterns.contains(&lower.as_str()) {
            return tier;
        }
    }
    for (patterns, tier) in [(TIER_1, Tier::Tier1), (TIER_2, Tier::Tier2), (TIER_3, Tier::Tier3), (TIER_4, Tier::Tier4)] {
        if patterns.iter().any(|p| lower.contains(p)) {
            return tier;
        }
    }
    Tier::Tier2
}

pub fn tier_score(tier: Tier) -> f64 {
    match tier {
        Tier::Tier1 => 80.0,
        Tier::Tier2 => 55.0,
        Tier::Tier3 => 30.0,
        Tier::Tier4 => 10.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_partial_matches() {
        assert_eq!(identify_tier("payment"), Tier::Tier1);
        assert_eq!(identify_tier("payment-worker"), Tier::Tier1);
        assert_eq!(identify_tier("totally-unknown-svc"), Tier::Tier2);
    }
}
