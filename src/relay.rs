use crate::ports::ActuatorPort;

/// Result of asking the relay for a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Actuation {
    /// A command was sent and acknowledged.
    Applied,
    /// The relay already was in the desired state, nothing was sent.
    Skipped,
    /// A command was sent and not acknowledged.
    Failed,
}

impl Actuation {
    pub fn is_success(self) -> bool {
        self != Self::Failed
    }
}

/// Drives the relay without sending redundant commands.
#[derive(Debug)]
pub struct RelayDriver<A> {
    actuator: A,
}

impl<A: ActuatorPort> RelayDriver<A> {
    pub fn new(actuator: A) -> Self {
        Self { actuator }
    }

    /// Bring the relay to `desired`, reading its state first. An unknown
    /// state always results in a command.
    #[tracing::instrument(skip(self))]
    pub async fn actuate(&self, desired: bool) -> Actuation {
        let current = self.actuator.read_actuator().await;
        if current == Some(desired) {
            tracing::trace!("Relay already in desired state");
            return Actuation::Skipped;
        }
        if current.is_none() {
            tracing::debug!("Relay state unknown, sending command anyway");
        }

        match self.actuator.write_actuator(desired).await {
            Ok(()) => {
                tracing::info!(?current, "Relay switched");
                Actuation::Applied
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to set relay state");
                Actuation::Failed
            }
        }
    }
}
