use std::fmt;

/// Whether the managed disks are currently considered spun up or spun down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Active,
    Idle,
}

impl IdleState {
    pub fn label(&self) -> &'static str {
        match self {
            IdleState::Active => "active",
            IdleState::Idle   => "idle",
        }
    }
}

/// Direction of a power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Up,
    Down,
}

impl Spin {
    /// State the array is in once this transition has succeeded.
    pub fn resulting_state(&self) -> IdleState {
        match self {
            Spin::Up   => IdleState::Active,
            Spin::Down => IdleState::Idle,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Spin::Up   => "spin-up",
            Spin::Down => "spin-down",
        }
    }
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something the coordinator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ActivityObserved,
    IdleTimeoutElapsed,
    MonitorStopped,
}

/// What the coordinator does in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Wait,
    SpinUp,
    SpinDown,
    Stop,
}

/// Transition table of the idle state machine.
///
/// Active races activity against the idle timer: activity just restarts the
/// wait, the timer spins the disks down. Idle waits for activity and spins up.
pub fn plan(state: IdleState, event: Event) -> Action {
    match (state, event) {
        (_, Event::MonitorStopped)                    => Action::Stop,
        (IdleState::Active, Event::ActivityObserved)   => Action::Wait,
        (IdleState::Active, Event::IdleTimeoutElapsed) => Action::SpinDown,
        (IdleState::Idle,   Event::ActivityObserved)   => Action::SpinUp,
        // The idle wait has no timer; a stray timeout changes nothing.
        (IdleState::Idle,   Event::IdleTimeoutElapsed) => Action::Wait,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_spins_down_only_on_timeout() {
        assert_eq!(plan(IdleState::Active, Event::ActivityObserved), Action::Wait);
        assert_eq!(plan(IdleState::Active, Event::IdleTimeoutElapsed), Action::SpinDown);
    }

    #[test]
    fn idle_never_spins_down_again() {
        assert_eq!(plan(IdleState::Idle, Event::ActivityObserved), Action::SpinUp);
        assert_eq!(plan(IdleState::Idle, Event::IdleTimeoutElapsed), Action::Wait);
    }

    #[test]
    fn monitor_stop_ends_either_state() {
        assert_eq!(plan(IdleState::Active, Event::MonitorStopped), Action::Stop);
        assert_eq!(plan(IdleState::Idle, Event::MonitorStopped), Action::Stop);
    }

    #[test]
    fn spin_direction_maps_to_state() {
        assert_eq!(Spin::Up.resulting_state(), IdleState::Active);
        assert_eq!(Spin::Down.resulting_state(), IdleState::Idle);
    }
}
