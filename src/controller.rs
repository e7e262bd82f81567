use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};

use crate::{
    aggregator::Snapshot,
    config::Config,
    decision::{self, DecisionInput, Thresholds},
    gate,
    models::{Decision, Gate, Mode},
    mode,
    ports::{ActuatorPort, SensorPort, StatusSink},
    relay::{Actuation, RelayDriver},
    state::ControlState,
    status::StatusReport,
};

/// What one cycle decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub mode: Mode,
    pub gate: Gate,
    pub decision: Decision,
    /// Relay state to drive towards, `None` to leave the relay alone.
    pub target: Option<bool>,
}

/// One control step: expire the timer, pick the gate, decide.
///
/// Pure function of its inputs; the returned state replaces `state`.
pub fn step(
    config: &Config,
    state: ControlState,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> (ControlState, CycleOutcome) {
    let state = mode::expire_timer(state, now);
    let gate = gate::select_gate(
        snapshot.outdoor_dew_point(),
        snapshot.target_dew_point(),
        *config.gate_epsilon(),
        state.last_gate,
    );
    let mut next = ControlState {
        last_gate: Some(gate),
        ..state
    };

    let (decision, target) = match mode::override_target(state.mode) {
        Some(target) => (Decision::from_target(target), Some(target)),
        None => {
            let input = DecisionInput::from(snapshot);
            let decision = decision::evaluate(&input, gate, &Thresholds::from(config));
            match decision.definite() {
                Some(on) => {
                    next.last_auto_decision = on;
                    (decision, Some(on))
                }
                None if input.humidities.is_empty() => (decision, None),
                None => (decision, Some(state.last_auto_decision)),
            }
        }
    };

    let outcome = CycleOutcome {
        mode: next.mode,
        gate,
        decision,
        target,
    };
    (next, outcome)
}

/// Owns the configuration and the control memory and drives the relay from
/// the sensor readings.
pub struct Controller<S, A, P> {
    config: Config,
    state: ControlState,
    sensors: S,
    relay: RelayDriver<A>,
    status: P,
    last_status: Option<StatusReport>,
}

impl<S, A, P> Controller<S, A, P>
where
    S: SensorPort,
    A: ActuatorPort,
    P: StatusSink,
{
    pub fn new(config: Config, sensors: S, actuator: A, status: P) -> Self {
        Self {
            config,
            state: ControlState::default(),
            sensors,
            relay: RelayDriver::new(actuator),
            status,
            last_status: None,
        }
    }

    /// Apply an external mode command. Takes effect on the next evaluation.
    #[tracing::instrument(skip(self))]
    pub fn set_mode(&mut self, mode: Mode, now: DateTime<Utc>) {
        self.state = mode::set_mode(self.state, mode, now, *self.config.timer_minutes());
        tracing::info!(deadline = ?self.state.timer_deadline, "Mode changed");
    }

    /// Decide for `snapshot` and commit the resulting state.
    pub fn on_cycle(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> CycleOutcome {
        let (state, outcome) = step(&self.config, self.state, snapshot, now);
        self.state = state;
        outcome
    }

    /// Read every configured sensor once and build the cycle's snapshot.
    pub async fn capture(&self) -> Snapshot {
        let groups = [
            self.config.outdoor_sensors(),
            self.config.normal_sensors(),
            self.config.wet_sensors(),
        ];

        let mut readings = HashMap::new();
        for id in groups.into_iter().flatten() {
            if readings.contains_key(id) {
                continue;
            }
            let reading = self.sensors.read_sensor(id).await;
            readings.insert(id.clone(), reading);
        }

        Snapshot::from_readings(&self.config, |id| readings.get(id).cloned().flatten())
    }

    /// Run a full cycle: capture, decide, actuate, report.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let snapshot = self.capture().await;
        let outcome = self.on_cycle(&snapshot, now);

        let actuation = match outcome.target {
            Some(target) => Some(self.relay.actuate(target).await),
            None => None,
        };
        tracing::debug!(
            mode = %outcome.mode,
            gate = %outcome.gate,
            decision = %outcome.decision,
            ?actuation,
            "Cycle completed"
        );
        if actuation == Some(Actuation::Failed) {
            tracing::warn!("Relay not updated, retrying next cycle");
        }

        let report = StatusReport::new(&outcome, actuation, &snapshot);
        self.publish_status(report).await;

        outcome
    }

    async fn publish_status(&mut self, report: StatusReport) {
        if self.last_status.as_ref() == Some(&report) {
            return;
        }
        match self.status.publish_status(&report).await {
            Ok(()) => self.last_status = Some(report),
            Err(e) => tracing::error!(error = %e, "Failed to publish status"),
        }
    }

    /// Run cycles on the configured period until the command channel closes.
    /// A mode command triggers a cycle right away.
    pub async fn run_until_completion(mut self, mut commands: mpsc::Receiver<Mode>) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(*self.config.cycle_seconds()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
                command = commands.recv() => {
                    let Some(mode) = command else {
                        anyhow::bail!("Mode command channel closed");
                    };
                    self.set_mode(mode, Utc::now());
                    self.run_cycle(Utc::now()).await;
                }
            }
        }
    }
}
