//! Magnus-Tetens conversions between relative humidity and dew point.

const MAGNUS_A: f64 = 17.62;
const MAGNUS_B: f64 = 243.12;

/// Lower humidity bound used before taking the logarithm.
const MIN_HUMIDITY: f64 = 0.1;

fn gamma(temperature: f64, relative_humidity: f64) -> f64 {
    (relative_humidity / 100.0).ln() + MAGNUS_A * temperature / (MAGNUS_B + temperature)
}

/// Dew point (°C) of air at `temperature` (°C) and `relative_humidity` (%).
pub fn dew_point(temperature: Option<f64>, relative_humidity: Option<f64>) -> Option<f64> {
    let temperature = temperature.filter(|t| t.is_finite())?;
    let relative_humidity = relative_humidity
        .filter(|h| h.is_finite())?
        .clamp(MIN_HUMIDITY, 100.0);

    let gamma = gamma(temperature, relative_humidity);
    let dew_point = MAGNUS_B * gamma / (MAGNUS_A - gamma);
    dew_point.is_finite().then_some(dew_point)
}

/// Relative humidity (%) that air with the given dew point reaches once
/// brought to `temperature`. Used to estimate the lowest humidity a room can
/// get to when ventilated with outdoor air.
pub fn relative_humidity_from_dew_point(temperature: f64, dew_point: f64) -> Option<f64> {
    if !temperature.is_finite() || !dew_point.is_finite() {
        return None;
    }

    let exponent = MAGNUS_A * dew_point / (MAGNUS_B + dew_point)
        - MAGNUS_A * temperature / (MAGNUS_B + temperature);
    let relative_humidity = 100.0 * exponent.exp();
    relative_humidity
        .is_finite()
        .then(|| relative_humidity.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dew_point_matches_reference_values() {
        let td = dew_point(Some(20.0), Some(50.0)).unwrap();
        assert!((td - 9.26).abs() < 0.05, "got {td}");

        let td = dew_point(Some(25.0), Some(100.0)).unwrap();
        assert!((td - 25.0).abs() < 1e-9);
    }

    #[test]
    fn dew_point_is_unavailable_without_both_inputs() {
        assert_eq!(dew_point(None, Some(50.0)), None);
        assert_eq!(dew_point(Some(20.0), None), None);
        assert_eq!(dew_point(Some(f64::INFINITY), Some(50.0)), None);
    }

    #[test]
    fn dew_point_clamps_humidity_instead_of_failing() {
        let zero = dew_point(Some(20.0), Some(0.0)).unwrap();
        let floor = dew_point(Some(20.0), Some(0.1)).unwrap();
        assert_eq!(zero, floor);

        let over = dew_point(Some(20.0), Some(130.0)).unwrap();
        assert!((over - 20.0).abs() < 1e-9);
    }

    #[test]
    fn inverse_recovers_relative_humidity() {
        for t in (-10..=40).step_by(5) {
            for rh in (5..=100).step_by(5) {
                let (t, rh) = (f64::from(t), f64::from(rh));
                let td = dew_point(Some(t), Some(rh)).unwrap();
                let back = relative_humidity_from_dew_point(t, td).unwrap();
                assert!((back - rh).abs() < 0.1, "T={t} RH={rh} got {back}");
            }
        }
    }

    #[test]
    fn inverse_is_clamped() {
        assert_eq!(relative_humidity_from_dew_point(10.0, 20.0), Some(100.0));
        assert_eq!(relative_humidity_from_dew_point(f64::NAN, 20.0), None);
    }
}
