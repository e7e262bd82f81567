use chrono::{DateTime, Utc};

use crate::models::{Gate, Mode};

/// Control memory carried from one cycle to the next.
///
/// Every step takes the current value and returns the next one; the
/// controller replaces its copy in one assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    /// Gate picked by the previous cycle, `None` until the first one.
    pub last_gate: Option<Gate>,
    /// Last definite decision taken in automatic mode.
    pub last_auto_decision: bool,
    pub mode: Mode,
    /// When the running timer ends. Only set in [`Mode::Timer`].
    pub timer_deadline: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_auto_without_memory() {
        let state = ControlState::default();
        assert_eq!(state.last_gate, None);
        assert!(!state.last_auto_decision);
        assert_eq!(state.mode, Mode::Auto);
        assert_eq!(state.timer_deadline, None);
    }
}
