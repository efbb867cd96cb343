//! Deterministic shedding scenarios driven through the sample processor and
//! the controller with a manual clock.

use std::sync::Arc;
use std::time::Duration;

use gridshed_core::clock::{ManualClock, MonotonicClock};
use gridshed_core::config::ControllerConfig;
use gridshed_core::context::ControlContext;
use gridshed_core::fsm::{Action, LoadShedController};
use gridshed_core::intake::ButtonPort;
use gridshed_core::loads::LoadBank;
use gridshed_core::sampling::FrequencySample;
use gridshed_core::state::OperatingState;
use gridshed_core::tasks::SampleProcessor;

const ALL_ON: u32 = 0b11111;
const POLL: Duration = Duration::from_millis(5);
const DEBOUNCE: Duration = Duration::from_millis(500);

struct Rig {
    clock: Arc<ManualClock>,
    samples: SampleProcessor,
    button: ButtonPort,
    ctl: LoadShedController,
}

impl Rig {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let config = ControllerConfig::default();
        let ctx = Arc::new(ControlContext::new(&config, clock.clone()));
        let ctl =
            LoadShedController::with_loads(Arc::clone(&ctx), &config, LoadBank::all_connected(5));
        Self {
            clock,
            samples: SampleProcessor::new(Arc::clone(&ctx)),
            button: ButtonPort::new(ctx),
            ctl,
        }
    }

    fn feed(&self, hz: f64) {
        self.samples.process(FrequencySample::from_hz(hz));
    }

    fn stable(&self) -> bool {
        self.ctl.context().stability.is_stable()
    }

    /// Scenario A: a 48 Hz sample sheds load 0.
    fn enter_shedding(&mut self) {
        self.feed(50.0);
        self.ctl.tick(ALL_ON);
        self.clock.advance(POLL);

        self.feed(48.0);
        assert!(!self.stable(), "48 Hz is below the 50 Hz threshold");
        self.clock.advance(POLL);
        let report = self.ctl.tick(ALL_ON);
        assert_eq!(report.action, Action::ShedFirst);
        assert_eq!(report.shed, Some(0));
        assert_eq!(report.state, OperatingState::MonitoringUnstable);
        assert_eq!(report.latency, Some(POLL));
        assert_eq!(self.ctl.timer().remaining(self.clock.now()), Some(DEBOUNCE));
    }
}

#[test]
fn scenario_a_instability_sheds_load_zero() {
    let mut rig = Rig::new();
    rig.enter_shedding();
    assert_eq!(rig.ctl.loads().connected_bits(), 0b11110);
    assert_eq!(rig.ctl.loads().outputs().shed_indicator, 0b00001);
    let stats = rig.ctl.context().stats.snapshot();
    assert_eq!(stats.event_count, 1);
    assert_eq!(stats.last, Some(POLL));
}

#[test]
fn repeated_detection_moves_the_latency_start() {
    let mut rig = Rig::new();
    rig.feed(50.0);
    rig.ctl.tick(ALL_ON);

    rig.clock.set(Duration::from_millis(10));
    rig.feed(48.0);
    rig.clock.set(Duration::from_millis(13));
    rig.feed(48.0);
    assert!(!rig.stable());

    rig.clock.set(Duration::from_millis(15));
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.action, Action::ShedFirst);
    assert_eq!(report.latency, Some(Duration::from_millis(2)));
    assert_eq!(
        rig.ctl.context().metrics.snapshot().instability_onsets,
        1,
        "only the edge counts as an onset"
    );
}

#[test]
fn scenario_b_expiries_shed_in_order() {
    let mut rig = Rig::new();
    rig.enter_shedding();

    rig.clock.advance(POLL);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.action, Action::Idle, "timer has not expired yet");

    let mut shed = Vec::new();
    for _ in 0..2 {
        rig.feed(48.0);
        rig.clock.advance(DEBOUNCE);
        let report = rig.ctl.tick(ALL_ON);
        assert_eq!(report.action, Action::ShedNext);
        assert_eq!(report.state, OperatingState::MonitoringUnstable);
        shed.extend(report.shed);
    }
    assert_eq!(shed, vec![1, 2]);
    assert_eq!(rig.ctl.loads().connected_bits(), 0b11000);
    // only the first shed of an episode records a latency
    assert_eq!(rig.ctl.context().stats.snapshot().event_count, 1);
}

#[test]
fn scenario_c_recovery_reconnects_highest_first() {
    let mut rig = Rig::new();
    rig.enter_shedding();
    for _ in 0..2 {
        rig.clock.advance(DEBOUNCE);
        rig.ctl.tick(ALL_ON);
    }
    assert_eq!(rig.ctl.loads().connected_bits(), 0b11000);

    // the first 50 Hz sample still carries a steep ROC
    rig.feed(50.0);
    assert!(!rig.stable());
    rig.feed(50.0);
    assert!(rig.stable());

    rig.clock.advance(POLL);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.action, Action::Rearm);
    assert_eq!(report.state, OperatingState::MonitoringStable);
    assert_eq!((report.shed, report.reconnected), (None, None));

    let mut order = Vec::new();
    for _ in 0..3 {
        rig.clock.advance(DEBOUNCE);
        let report = rig.ctl.tick(ALL_ON);
        assert_eq!(report.action, Action::Reconnect);
        order.extend(report.reconnected);
    }
    assert_eq!(order, vec![2, 1, 0]);

    rig.clock.advance(DEBOUNCE);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.state, OperatingState::NormalOperation);
    assert_eq!(report.outputs.connected, ALL_ON);
    assert_eq!(report.outputs.shed_indicator, 0);
}

#[test]
fn relapse_during_confirmation_returns_to_unstable() {
    let mut rig = Rig::new();
    rig.enter_shedding();
    rig.feed(50.0);
    rig.feed(50.0);
    rig.clock.advance(POLL);
    assert_eq!(rig.ctl.tick(ALL_ON).state, OperatingState::MonitoringStable);

    rig.feed(47.0);
    rig.clock.advance(POLL);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.action, Action::Rearm);
    assert_eq!(report.state, OperatingState::MonitoringUnstable);
    assert_eq!(report.shed, None);
}

#[test]
fn scenario_d_maintenance_round_trip() {
    let mut rig = Rig::new();
    rig.feed(50.0);
    rig.ctl.tick(ALL_ON);

    assert!(rig.button.press());
    rig.clock.advance(POLL);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.state, OperatingState::Maintenance);
    assert_eq!(rig.ctl.saved_state(), Some(OperatingState::NormalOperation));

    // samples still land but the verdict is frozen
    rig.feed(40.0);
    assert!(rig.stable());
    // switches toggle freely
    let report = rig.ctl.tick(0b00011);
    assert_eq!(report.outputs.connected, 0b00011);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.outputs.connected, ALL_ON);

    assert!(!rig.button.press());
    rig.clock.advance(POLL);
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.from, OperatingState::Maintenance);
    assert_eq!(report.state, OperatingState::NormalOperation);
    assert_eq!(rig.ctl.saved_state(), None);
}

#[test]
fn maintenance_preempts_instability() {
    let mut rig = Rig::new();
    rig.feed(48.0);
    assert!(!rig.stable());
    rig.button.press();
    let report = rig.ctl.tick(ALL_ON);
    assert_eq!(report.state, OperatingState::Maintenance);
    assert_eq!(report.action, Action::Idle);
    assert_eq!(report.shed, None);
    assert_eq!(rig.ctl.loads().connected_bits(), ALL_ON);
}

#[test]
fn connected_never_exceeds_desired() {
    let mut rig = Rig::new();
    let patterns = [ALL_ON, 0b10101, 0b00000, 0b11011, ALL_ON, 0b01111];
    let freqs = [50.0, 48.0, 48.0, 50.0, 50.0, 50.5, 47.0, 50.0];
    for step in 0..200 {
        rig.feed(freqs[step % freqs.len()]);
        rig.clock.advance(Duration::from_millis(37));
        if step % 41 == 0 {
            rig.button.press();
        }
        let report = rig.ctl.tick(patterns[step % patterns.len()]);
        let loads = rig.ctl.loads();
        assert_eq!(
            loads.connected_bits() & !loads.desired_bits(),
            0,
            "step {step}: connected {:05b} desired {:05b}",
            loads.connected_bits(),
            loads.desired_bits()
        );
        assert_eq!(
            report.outputs.shed_indicator,
            loads.desired_bits() & !loads.connected_bits()
        );
    }
}
