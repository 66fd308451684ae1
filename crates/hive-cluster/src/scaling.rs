//! Per-device scaling rules
//!
//! Some devices report raw register values that need a model-specific
//! transform before they land in an item. Rules are a static ordered table
//! of `(model predicate, cluster, attr, transform)`; the first match wins
//! and no match means identity.

pub const CLUSTER_POWER_MEASUREMENT: u16 = 0x0B04;
pub const CLUSTER_METERING: u16 = 0x0702;

pub const ATTR_ACTIVE_POWER: u16 = 0x050B;
pub const ATTR_RMS_CURRENT: u16 = 0x0508;
pub const ATTR_CURRENT_SUMMATION: u16 = 0x0000;

/// One scaling rule.
struct ScalingRule {
    /// Matches when the model id starts with this prefix
    model_prefix: &'static str,
    cluster: u16,
    attr: u16,
    transform: fn(f64) -> f64,
}

/// Ordered rule table; first match wins.
static SCALING_RULES: &[ScalingRule] = &[
    // Innr smart plugs report active power in 0.1 W steps.
    ScalingRule {
        model_prefix: "SP 120",
        cluster: CLUSTER_POWER_MEASUREMENT,
        attr: ATTR_ACTIVE_POWER,
        transform: |v| v / 10.0,
    },
    ScalingRule {
        model_prefix: "SP 220",
        cluster: CLUSTER_POWER_MEASUREMENT,
        attr: ATTR_ACTIVE_POWER,
        transform: |v| v / 10.0,
    },
    // Develco meters report summation in 0.001 kWh.
    ScalingRule {
        model_prefix: "EMIZB-1",
        cluster: CLUSTER_METERING,
        attr: ATTR_CURRENT_SUMMATION,
        transform: |v| v / 1000.0,
    },
];

/// Apply the first matching rule, identity otherwise.
pub fn apply(model_id: &str, cluster: u16, attr: u16, value: f64) -> f64 {
    for rule in SCALING_RULES {
        if rule.cluster == cluster && rule.attr == attr && model_id.starts_with(rule.model_prefix) {
            return (rule.transform)(value);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sp120_active_power_divided() {
        let v = apply("SP 120", CLUSTER_POWER_MEASUREMENT, ATTR_ACTIVE_POWER, 273.0);
        assert_eq!(v, 27.3);
    }

    #[test]
    fn test_unmatched_model_is_identity() {
        let v = apply("LCT015", CLUSTER_POWER_MEASUREMENT, ATTR_ACTIVE_POWER, 273.0);
        assert_eq!(v, 273.0);
    }

    #[test]
    fn test_unmatched_attr_is_identity() {
        let v = apply("SP 120", CLUSTER_POWER_MEASUREMENT, ATTR_RMS_CURRENT, 42.0);
        assert_eq!(v, 42.0);
    }
}
