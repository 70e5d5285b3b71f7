use crate::control::power::PowerControl;
use crate::error::Result;
use crate::models::array::{ActivitySnapshot, RaidArray};
use crate::models::power::{plan, Action, Event, IdleState, Spin};
use crate::util::event_log::EventLog;
use crate::util::human::fmt_duration;
use crate::util::slot::{SlotReceiver, Wait};
use std::time::{Duration, Instant};

/// Owns the array's power state and decides when to spin its disks up or down.
pub struct IdleCoordinator<P: PowerControl> {
    array:        String,
    devices:      Vec<String>,
    power:        P,
    idle_timeout: Duration,
    activity:     SlotReceiver<ActivitySnapshot>,
    state:        IdleState,
    events:       Option<EventLog>,
}

impl<P: PowerControl> IdleCoordinator<P> {
    /// Spin every member up, whatever state it is really in, and start tracking.
    pub fn start(
        array: &RaidArray,
        power: P,
        idle_timeout: Duration,
        activity: SlotReceiver<ActivitySnapshot>,
        events: Option<EventLog>,
    ) -> Result<Self> {
        let mut coordinator = Self {
            array:    array.name.clone(),
            devices:  array.members.clone(),
            power,
            idle_timeout,
            activity,
            state:    IdleState::Active,
            events,
        };
        coordinator.state = coordinator.transition(Spin::Up)?;
        Ok(coordinator)
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Run until the activity monitor goes away or a power command fails.
    pub fn run(mut self) -> Result<()> {
        while self.step()? {}
        tracing::info!("activity monitor stopped, leaving {} {}", self.array, self.state().label());
        Ok(())
    }

    /// Wait for one event and act on it. `Ok(false)` means the loop is over.
    pub fn step(&mut self) -> Result<bool> {
        let event = self.next_event();
        match plan(self.state, event) {
            Action::Wait => {
                tracing::trace!("{:?} while {}, idle timer restarted", event, self.state.label());
                Ok(true)
            }
            Action::SpinUp => {
                self.state = self.transition(Spin::Up)?;
                Ok(true)
            }
            Action::SpinDown => {
                tracing::info!("{} idle for {}", self.array, fmt_duration(self.idle_timeout));
                self.state = self.transition(Spin::Down)?;
                Ok(true)
            }
            Action::Stop => Ok(false),
        }
    }

    fn next_event(&self) -> Event {
        match self.state {
            IdleState::Active => match self.activity.wait_timeout(self.idle_timeout) {
                Wait::Ready(_)  => Event::ActivityObserved,
                Wait::TimedOut  => Event::IdleTimeoutElapsed,
                Wait::Closed    => Event::MonitorStopped,
            },
            IdleState::Idle => match self.activity.wait() {
                Some(_) => Event::ActivityObserved,
                None    => Event::MonitorStopped,
            },
        }
    }

    fn transition(&self, spin: Spin) -> Result<IdleState> {
        tracing::info!("start {} of {} {:?}", spin, self.array, self.devices);
        let started = Instant::now();
        let result = self.power.set_power(&self.devices, spin);

        match &result {
            Ok(_)  => tracing::info!("finished {} in {}", spin, fmt_duration(started.elapsed())),
            Err(e) => tracing::error!("{} of {} failed: {}", spin, self.array, e),
        }
        if let Some(log) = &self.events {
            let err = result.as_ref().err().map(|e| e.to_string());
            log.append(&self.array, spin, &self.devices, err.as_deref());
        }
        result
    }
}
