//! Boundaries between the control logic and the outside world.
//!
//! Adapters (the MQTT bridge in production, mocks in tests) implement these
//! traits; the controller only ever sees typed values through them.

use async_trait::async_trait;

use crate::{error::ControlError, models::Reading, status::StatusReport};

/// Source of sensor readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorPort: Send + Sync {
    /// Latest usable reading of sensor `id`. Decoding problems and stale
    /// data come back as `None`, never as an error.
    async fn read_sensor(&self, id: &str) -> Option<Reading>;
}

/// The boost relay.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActuatorPort: Send + Sync {
    /// Currently reported relay state, `None` when unknown.
    async fn read_actuator(&self) -> Option<bool>;

    /// Command the relay. `Ok` means the command was acknowledged.
    async fn write_actuator(&self, on: bool) -> Result<(), ControlError>;
}

/// Where the display-only status goes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_status(&self, report: &StatusReport) -> Result<(), ControlError>;
}
