use chrono::{DateTime, Duration, Utc};

use crate::{models::Mode, state::ControlState};

/// Apply an external mode command.
///
/// Entering [`Mode::Timer`] (again) arms the deadline `now + timer_minutes`;
/// any other mode cancels it.
pub fn set_mode(
    state: ControlState,
    mode: Mode,
    now: DateTime<Utc>,
    timer_minutes: i64,
) -> ControlState {
    let timer_deadline = match mode {
        Mode::Timer => Some(now + Duration::minutes(timer_minutes)),
        Mode::Auto | Mode::Forced => None,
    };

    ControlState {
        mode,
        timer_deadline,
        ..state
    }
}

/// Return to [`Mode::Auto`] once the timer deadline has passed.
pub fn expire_timer(state: ControlState, now: DateTime<Utc>) -> ControlState {
    match (state.mode, state.timer_deadline) {
        (Mode::Timer, Some(deadline)) if now >= deadline => {
            tracing::info!(%deadline, "Boost timer expired, back to automatic mode");
            ControlState {
                mode: Mode::Auto,
                timer_deadline: None,
                ..state
            }
        }
        (Mode::Timer, None) => {
            tracing::warn!("Timer mode without deadline, back to automatic mode");
            ControlState {
                mode: Mode::Auto,
                ..state
            }
        }
        _ => state,
    }
}

/// Relay target imposed by the mode, `None` when the engine decides.
pub fn override_target(mode: Mode) -> Option<bool> {
    match mode {
        Mode::Auto => None,
        Mode::Timer | Mode::Forced => Some(true),
    }
}
