//! ON/OFF/HOLD rules for the boost relay.
//!
//! Each gate has a rule that uses per-room dew points and a degraded rule
//! for cycles where the outdoor or room dew points are missing. The rules
//! are kept as separate functions so each can be checked on its own.

use crate::{
    aggregator::Snapshot,
    config::Config,
    models::{Decision, Gate},
};

/// Extra humidity margin the WET fallback requires before boosting, since
/// without dew points it cannot tell whether outdoor air would help.
pub const WET_FALLBACK_MARGIN: f64 = 5.0;

/// The subset of [`Config`] the rules read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
    pub boost_on_delta: f64,
    pub boost_off_delta: f64,
    pub outdoor_offset: f64,
}

impl From<&Config> for Thresholds {
    fn from(config: &Config) -> Self {
        Self {
            low: *config.low_threshold(),
            high: *config.high_threshold(),
            boost_on_delta: *config.boost_on_delta(),
            boost_off_delta: *config.boost_off_delta(),
            outdoor_offset: *config.outdoor_offset(),
        }
    }
}

/// Everything one decision depends on, taken from the cycle's snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInput {
    pub humidities: Vec<f64>,
    pub room_dew_points: Vec<f64>,
    pub outdoor_dew_point: Option<f64>,
    pub outdoor_humidity: Option<f64>,
}

impl From<&Snapshot> for DecisionInput {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            humidities: snapshot.humidities(),
            room_dew_points: snapshot.room_dew_points(),
            outdoor_dew_point: snapshot.outdoor_dew_point(),
            outdoor_humidity: snapshot.outdoor.avg_humidity,
        }
    }
}

fn on_off_or_hold(on: bool, off: bool) -> Decision {
    if on {
        Decision::On
    } else if off {
        Decision::Off
    } else {
        Decision::Hold
    }
}

/// Evaluate the rule of `gate` for one cycle.
pub fn evaluate(input: &DecisionInput, gate: Gate, thresholds: &Thresholds) -> Decision {
    if input.humidities.is_empty() {
        return Decision::Hold;
    }

    let outdoor_dew_point = input
        .outdoor_dew_point
        .filter(|_| !input.room_dew_points.is_empty());

    match (gate, outdoor_dew_point) {
        (Gate::Dry, Some(outdoor)) => dry_with_potential(
            &input.humidities,
            &input.room_dew_points,
            outdoor,
            thresholds,
        ),
        (Gate::Dry, None) => dry_fallback(&input.humidities, thresholds),
        (Gate::Wet, Some(outdoor)) => {
            wet_with_dew_points(&input.room_dew_points, outdoor, thresholds)
        }
        (Gate::Wet, None) => wet_fallback(&input.humidities, input.outdoor_humidity, thresholds),
    }
}

/// DRY gate without dew points: plain humidity hysteresis.
pub fn dry_fallback(humidities: &[f64], thresholds: &Thresholds) -> Decision {
    on_off_or_hold(
        humidities.iter().any(|&h| h >= thresholds.high),
        humidities.iter().all(|&h| h <= thresholds.low),
    )
}

/// DRY gate with dew points: a humid room is only boosted when outdoor air
/// has enough drying potential for that room.
pub fn dry_with_potential(
    humidities: &[f64],
    room_dew_points: &[f64],
    outdoor_dew_point: f64,
    thresholds: &Thresholds,
) -> Decision {
    let rooms = move || {
        humidities
            .iter()
            .zip(room_dew_points)
            .map(move |(&h, &td)| (h, td - outdoor_dew_point))
    };

    on_off_or_hold(
        rooms().any(|(h, potential)| {
            h >= thresholds.high && potential >= thresholds.boost_on_delta
        }),
        rooms().all(|(h, potential)| {
            h <= thresholds.low || potential <= thresholds.boost_off_delta
        }),
    )
}

/// WET gate without dew points: the OFF threshold follows outdoor humidity
/// and the ON threshold is widened.
pub fn wet_fallback(
    humidities: &[f64],
    outdoor_humidity: Option<f64>,
    thresholds: &Thresholds,
) -> Decision {
    let low = outdoor_humidity
        .map(|h| (h + thresholds.outdoor_offset).clamp(0.0, 100.0))
        .unwrap_or(thresholds.low);
    let high = thresholds.high + WET_FALLBACK_MARGIN;

    on_off_or_hold(
        humidities.iter().any(|&h| h >= high),
        humidities.iter().all(|&h| h <= low),
    )
}

/// WET gate with dew points: pilot on the gap between each room and outdoor
/// air only.
pub fn wet_with_dew_points(
    room_dew_points: &[f64],
    outdoor_dew_point: f64,
    thresholds: &Thresholds,
) -> Decision {
    on_off_or_hold(
        room_dew_points
            .iter()
            .any(|&td| td >= outdoor_dew_point + thresholds.boost_on_delta),
        room_dew_points
            .iter()
            .all(|&td| td <= outdoor_dew_point + thresholds.boost_off_delta),
    )
}
