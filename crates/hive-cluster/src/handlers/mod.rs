//! Built-in cluster handlers
//!
//! One module per cluster. Every handler maps attribute records (and for
//! some clusters, cluster-specific commands) onto item writes; the
//! dispatcher owns everything else.

pub mod basic;
pub mod color;
pub mod humidity;
pub mod ias_zone;
pub mod level;
pub mod metering;
pub mod occupancy;
pub mod on_off;
pub mod power_measurement;
pub mod pressure;
pub mod temperature;
pub mod thermostat;

use crate::dispatch::ClusterHandler;

/// All built-in handlers, one per cluster id.
pub fn builtin() -> Vec<ClusterHandler> {
    vec![
        basic::handler(),
        on_off::handler(),
        level::handler(),
        color::handler(),
        temperature::handler(),
        humidity::handler(),
        pressure::handler(),
        occupancy::handler(),
        power_measurement::handler(),
        metering::handler(),
        thermostat::handler(),
        ias_zone::handler(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_cluster_ids_unique() {
        let handlers = builtin();
        let ids: HashSet<u16> = handlers.iter().map(|h| h.cluster).collect();
        assert_eq!(ids.len(), handlers.len());
    }
}
