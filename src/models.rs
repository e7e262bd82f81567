use derive_getters::Getters;
use serde::Serialize;

/// Describes the states the boost relay can be in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::Display,
)]
#[strum(ascii_case_insensitive)]
pub enum BoostState {
    #[strum(serialize = "OFF")]
    Off,
    #[strum(serialize = "ON")]
    On,
}

impl From<bool> for BoostState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<BoostState> for bool {
    fn from(state: BoostState) -> Self {
        state == BoostState::On
    }
}

/// One sensor's measurement for the current cycle. Either field may be
/// missing without invalidating the other.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct Reading {
    source_id: String,
    temperature: Option<f64>,
    relative_humidity: Option<f64>,
}

impl Reading {
    /// Non-finite values are dropped, so the core only ever sees usable
    /// numbers or nothing.
    pub fn new(
        source_id: impl Into<String>,
        temperature: Option<f64>,
        relative_humidity: Option<f64>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            temperature: temperature.filter(|t| t.is_finite()),
            relative_humidity: relative_humidity.filter(|h| h.is_finite()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.relative_humidity.is_none()
    }
}

/// The sensor groups the hub aggregates independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SensorGroup {
    #[strum(serialize = "outdoor")]
    Outdoor,
    #[strum(serialize = "normal rooms")]
    Normal,
    #[strum(serialize = "wet rooms")]
    Wet,
}

/// Strategy selected by the dew-point gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Gate {
    /// Outdoor air is dry enough to ventilate with.
    Dry,
    /// Outdoor air is humid itself, pilot on dew-point gaps only.
    Wet,
}

/// Operating mode of the hub.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::EnumString, strum::Display,
)]
#[strum(ascii_case_insensitive)]
pub enum Mode {
    #[default]
    Auto,
    Timer,
    Forced,
}

/// Outcome of one decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Decision {
    On,
    Off,
    /// Keep the previous automatic decision.
    Hold,
}

impl Decision {
    pub fn from_target(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    /// The definite relay state, if this is not a hold.
    pub fn definite(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Hold => None,
        }
    }
}
