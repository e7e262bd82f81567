use serde::Serialize;

use crate::{
    aggregator::{HumidityStatus, Snapshot},
    controller::CycleOutcome,
    models::{Decision, Gate, Mode},
    relay::Actuation,
};

/// Human-facing summary of a cycle. Carries no control semantics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub mode: Mode,
    /// Only shown in automatic mode.
    pub gate: Option<Gate>,
    pub decision: Decision,
    /// Relay state this cycle settled on, `None` when it was left alone or
    /// the command failed.
    pub relay: Option<bool>,
    pub text: String,
    pub average_humidity: Option<f64>,
    pub humidity_status: Option<HumidityStatus>,
    /// Lowest average wet-room humidity outdoor air could bring the rooms to.
    pub reachable_humidity: Option<f64>,
}

impl StatusReport {
    pub fn new(outcome: &CycleOutcome, actuation: Option<Actuation>, snapshot: &Snapshot) -> Self {
        let mode = outcome.mode;
        let gate = (mode == Mode::Auto).then_some(outcome.gate);
        let relay = outcome
            .target
            .filter(|_| actuation.map_or(false, Actuation::is_success));

        let label = match gate {
            Some(gate) => format!("{mode} ({gate})"),
            None => mode.to_string(),
        };
        let state = match relay {
            Some(true) => "ON",
            Some(false) => "OFF",
            None => "unchanged",
        };
        let average_humidity = snapshot.average_wet_humidity();

        Self {
            mode,
            gate,
            decision: outcome.decision,
            relay,
            text: format!("{label}: {state}"),
            average_humidity: average_humidity.map(f64::round),
            humidity_status: average_humidity.map(HumidityStatus::classify),
            reachable_humidity: snapshot.reachable_humidity().map(f64::round),
        }
    }
}
