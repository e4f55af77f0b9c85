//! Reduction of per-endpoint states into one overall status.

use serde::Serialize;

/// Message for a registry with nothing to monitor.
pub const NO_ENDPOINTS_MESSAGE: &str = "No Monitored Endpoints";

/// Overall health as shown in the dashboard banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Operational,
    PartialOutage,
    MajorOutage,
}

impl ServiceState {
    pub fn message(self) -> &'static str {
        match self {
            ServiceState::Operational => "All Systems Operational",
            ServiceState::PartialOutage => "Partial Service Disruption",
            ServiceState::MajorOutage => "Major Service Outage",
        }
    }
}

/// When a mix of healthy and failing endpoints counts as a major outage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutagePolicy {
    /// Major only when every endpoint is down.
    AllDown,
    /// Major once at least `major_percent` of endpoints are down.
    Threshold { major_percent: f64 },
}

/// Reduce the current up/down flags of all endpoints to an overall state and
/// its banner message. Order of the input does not matter.
pub fn reduce_status<I>(current: I, policy: OutagePolicy) -> (ServiceState, &'static str)
where
    I: IntoIterator<Item = bool>,
{
    let (total, down) = current
        .into_iter()
        .fold((0usize, 0usize), |(total, down), up| (total + 1, down + usize::from(!up)));

    if total == 0 {
        return (ServiceState::Operational, NO_ENDPOINTS_MESSAGE);
    }

    let state = if down == 0 {
        ServiceState::Operational
    } else if down == total {
        ServiceState::MajorOutage
    } else {
        match policy {
            OutagePolicy::AllDown => ServiceState::PartialOutage,
            OutagePolicy::Threshold { major_percent } => {
                let down_percent = down as f64 / total as f64 * 100.0;
                if down_percent >= major_percent {
                    ServiceState::MajorOutage
                } else {
                    ServiceState::PartialOutage
                }
            }
        }
    };

    (state, state.message())
}
