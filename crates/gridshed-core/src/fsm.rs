//! Load-shedding finite state machine.
//!
//! [`transition`] is the whole decision table as one exhaustive match over
//! `(state, timer_expired, stable)`. [`LoadShedController`] wraps it with
//! the side effects: maintenance override, switch folding, shedding,
//! reconnecting, debounce rearming and latency recording.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ControllerConfig;
use crate::context::ControlContext;
use crate::debounce::DebounceTimer;
use crate::loads::{LoadBank, LoadOutputs, SwitchPolicy};
use crate::metrics::ControlMetrics;
use crate::state::OperatingState;

/// What the controller does on one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing beyond refreshing outputs.
    Idle,
    /// First shed of an episode: shed, record reaction latency, rearm.
    ShedFirst,
    /// Debounce window elapsed while shedding: rearm, shed one more.
    ShedNext,
    /// Debounce window elapsed while recovering: reconnect one, rearm.
    Reconnect,
    /// Restart the debounce window only.
    Rearm,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ShedFirst => "shed_first",
            Self::ShedNext => "shed_next",
            Self::Reconnect => "reconnect",
            Self::Rearm => "rearm",
        }
    }
}

/// Inputs sampled at the start of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inputs {
    pub timer_expired: bool,
    pub stable: bool,
    /// No desired load is waiting for reconnection.
    pub all_reconnected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: OperatingState,
}

const fn go(action: Action, next: OperatingState) -> Transition {
    Transition { action, next }
}

/// The decision table.
#[must_use]
pub const fn transition(state: OperatingState, inputs: Inputs) -> Transition {
    use Action::{Idle, Rearm, Reconnect, ShedFirst, ShedNext};
    use OperatingState::{Maintenance, MonitoringStable, MonitoringUnstable, NormalOperation};

    match (state, inputs.timer_expired, inputs.stable) {
        (Maintenance, _, _) => go(Idle, Maintenance),

        (NormalOperation, _, true) => go(Idle, NormalOperation),
        (NormalOperation, _, false) => go(ShedFirst, MonitoringUnstable),

        (MonitoringUnstable, true, _) => go(ShedNext, MonitoringUnstable),
        (MonitoringUnstable, false, false) => go(Idle, MonitoringUnstable),
        (MonitoringUnstable, false, true) => go(Rearm, MonitoringStable),

        (MonitoringStable, true, _) => {
            if inputs.all_reconnected {
                go(Idle, NormalOperation)
            } else {
                go(Reconnect, MonitoringStable)
            }
        }
        (MonitoringStable, false, false) => go(Rearm, MonitoringUnstable),
        (MonitoringStable, false, true) => go(Idle, MonitoringStable),
    }
}

/// Outcome of one [`LoadShedController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Clock reading the iteration ran at.
    pub at: Duration,
    /// Mode at the start of the iteration, before any override.
    pub from: OperatingState,
    /// Mode after the iteration.
    pub state: OperatingState,
    pub action: Action,
    pub shed: Option<usize>,
    pub reconnected: Option<usize>,
    /// Reaction latency recorded this iteration.
    pub latency: Option<Duration>,
    pub outputs: LoadOutputs,
}

impl TickReport {
    #[must_use]
    pub fn changed_state(&self) -> bool {
        self.from != self.state
    }
}

/// The controller task's private state plus its view of shared state.
#[derive(Debug)]
pub struct LoadShedController {
    ctx: Arc<ControlContext>,
    state: OperatingState,
    saved: Option<OperatingState>,
    loads: LoadBank,
    timer: DebounceTimer,
}

impl LoadShedController {
    /// A controller in `NormalOperation` with every load off until the
    /// first switch read.
    #[must_use]
    pub fn new(ctx: Arc<ControlContext>, config: &ControllerConfig) -> Self {
        Self::with_loads(ctx, config, LoadBank::new(config.load_count))
    }

    /// Same as [`Self::new`] with a pre-populated load bank.
    #[must_use]
    pub fn with_loads(ctx: Arc<ControlContext>, config: &ControllerConfig, loads: LoadBank) -> Self {
        ctx.state.store(OperatingState::NormalOperation);
        Self {
            ctx,
            state: OperatingState::NormalOperation,
            saved: None,
            loads,
            timer: DebounceTimer::new(config.debounce_period),
        }
    }

    #[must_use]
    pub const fn state(&self) -> OperatingState {
        self.state
    }

    /// Mode restored when maintenance ends.
    #[must_use]
    pub const fn saved_state(&self) -> Option<OperatingState> {
        self.saved
    }

    #[must_use]
    pub const fn loads(&self) -> &LoadBank {
        &self.loads
    }

    #[must_use]
    pub const fn timer(&self) -> &DebounceTimer {
        &self.timer
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ControlContext> {
        &self.ctx
    }

    /// Run one iteration against the current switch bitmap.
    pub fn tick(&mut self, switches: u32) -> TickReport {
        let now = self.ctx.now();
        let from = self.state;
        ControlMetrics::inc(&self.ctx.metrics.fsm_ticks);

        self.apply_maintenance_request();

        let policy = if self.state.is_monitoring() {
            SwitchPolicy::ShedOnly
        } else {
            SwitchPolicy::FreeToggle
        };
        self.loads.apply_switches(switches, policy);

        // verdict and onset from one read
        let onset = self.ctx.stability.onset();
        let inputs = Inputs {
            timer_expired: self.timer.has_expired(now),
            stable: onset.is_none(),
            all_reconnected: self.loads.all_reconnected(),
        };
        let Transition { action, next } = transition(self.state, inputs);

        let mut report = TickReport {
            at: now,
            from,
            state: next,
            action,
            shed: None,
            reconnected: None,
            latency: None,
            outputs: LoadOutputs::default(),
        };

        match action {
            Action::Idle => {}
            Action::ShedFirst => {
                report.shed = self.shed();
                report.latency = onset.map(|onset| now.saturating_sub(onset));
                if let Some(latency) = report.latency {
                    self.ctx.stats.record(latency);
                }
                self.timer.rearm(now);
            }
            Action::ShedNext => {
                self.timer.rearm(now);
                report.shed = self.shed();
            }
            Action::Reconnect => {
                report.reconnected = self.reconnect();
                self.timer.rearm(now);
            }
            Action::Rearm => self.timer.rearm(now),
        }

        if next != self.state {
            log::info!("state {} -> {} ({})", self.state.as_str(), next.as_str(), action.as_str());
        }
        self.state = next;
        self.ctx.state.store(next);
        report.outputs = self.loads.outputs();
        report
    }

    fn apply_maintenance_request(&mut self) {
        let requested = self.ctx.maintenance.is_engaged();
        let active = self.state == OperatingState::Maintenance;
        if requested && !active {
            self.saved = Some(self.state);
            log::info!("entering maintenance from {}", self.state.as_str());
            self.state = OperatingState::Maintenance;
            self.ctx.state.store(self.state);
        } else if !requested && active {
            let restored = self.saved.take().unwrap_or_default();
            log::info!("leaving maintenance, restoring {}", restored.as_str());
            self.state = restored;
            self.ctx.state.store(self.state);
        }
    }

    fn shed(&mut self) -> Option<usize> {
        let index = self.loads.shed();
        if let Some(i) = index {
            ControlMetrics::inc(&self.ctx.metrics.sheds);
            log::info!("shed load {i}");
        }
        index
    }

    fn reconnect(&mut self) -> Option<usize> {
        let index = self.loads.reconnect();
        if let Some(i) = index {
            ControlMetrics::inc(&self.ctx.metrics.reconnects);
            log::info!("reconnected load {i}");
        }
        index
    }
}
