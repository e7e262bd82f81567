use crate::models::SensorGroup;

/// Everything that can go wrong while controlling the boost relay.
///
/// None of these are fatal: each one is absorbed where it is detected and
/// replaced by a documented fallback, then logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("sensor {sensor} produced no usable reading")]
    MissingReading { sensor: String },

    #[error("no usable {field} reading in the {group} group")]
    EmptyAggregate {
        group: SensorGroup,
        field: &'static str,
    },

    #[error("communication failure: {0}")]
    CommunicationFailure(String),

    #[error("invalid value {value:?} for {field}, using {fallback}")]
    Configuration {
        field: &'static str,
        value: String,
        fallback: String,
    },

    #[error("inverted thresholds (low {low} > high {high}), swapping them")]
    InvertedThresholds { low: f64, high: f64 },
}
