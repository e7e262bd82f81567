use crate::models::Gate;

/// Pick the strategy for this cycle.
///
/// Outdoor air counts as dry once its dew point is more than `epsilon` below
/// the target (normal rooms) dew point. Without both dew points the
/// previous gate is kept, and the stricter WET strategy is used on the very
/// first cycle.
pub fn select_gate(
    outdoor_dew_point: Option<f64>,
    target_dew_point: Option<f64>,
    epsilon: f64,
    last_gate: Option<Gate>,
) -> Gate {
    match (outdoor_dew_point, target_dew_point) {
        (Some(outdoor), Some(target)) if outdoor < target - epsilon => Gate::Dry,
        (Some(_), Some(_)) => Gate::Wet,
        _ => last_gate.unwrap_or(Gate::Wet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_only_below_the_epsilon_band() {
        assert_eq!(select_gate(Some(9.0), Some(10.0), 0.5, None), Gate::Dry);
        assert_eq!(select_gate(Some(9.5), Some(10.0), 0.5, None), Gate::Wet);
        assert_eq!(select_gate(Some(12.0), Some(10.0), 0.5, Some(Gate::Dry)), Gate::Wet);
    }

    #[test]
    fn missing_data_keeps_the_last_gate() {
        assert_eq!(select_gate(None, Some(10.0), 0.5, Some(Gate::Dry)), Gate::Dry);
        assert_eq!(select_gate(Some(3.0), None, 0.5, Some(Gate::Wet)), Gate::Wet);
        assert_eq!(select_gate(None, None, 0.5, None), Gate::Wet);
    }

    #[test]
    fn gate_is_stable_on_one_side_of_the_boundary() {
        let target = 12.0;
        let mut gate = None;
        for outdoor in [11.4, 11.0, 8.0, 11.49, 2.0] {
            let next = select_gate(Some(outdoor), Some(target), 0.5, gate);
            if let Some(previous) = gate {
                assert_eq!(previous, next);
            }
            gate = Some(next);
        }
        assert_eq!(gate, Some(Gate::Dry));

        for outdoor in [11.5, 14.0, 11.6, 30.0] {
            let next = select_gate(Some(outdoor), Some(target), 0.5, gate);
            assert_eq!(next, Gate::Wet);
            gate = Some(next);
        }
    }
}
