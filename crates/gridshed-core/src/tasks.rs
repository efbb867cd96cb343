//! Task bodies: sample processing, threshold updates and the FSM loop.
//!
//! Each body has a synchronous single-step entry point, used directly by
//! deterministic replay, and a `run` loop used by the threaded runtime.
//! The blocking loops wait only on their input channel or on shutdown; the
//! FSM loop never blocks on input and sleeps one poll interval per pass.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, select};

use crate::context::ControlContext;
use crate::fsm::{LoadShedController, TickReport};
use crate::loads::LoadOutputs;
use crate::metrics::ControlMetrics;
use crate::sampling::{FrequencySample, RocPoint};
use crate::stability::{StabilityEdge, is_stable};
use crate::state::OperatingState;
use crate::thresholds::{ThresholdCommand, Thresholds};

/// Reads the operator's switch bitmap.
pub trait SwitchInput: Send {
    fn read(&mut self) -> u32;
}

/// Receives the relay/LED bitmaps produced by each FSM iteration.
pub trait LoadOutput: Send {
    fn write(&mut self, outputs: LoadOutputs);
}

impl<F> SwitchInput for F
where
    F: FnMut() -> u32 + Send,
{
    fn read(&mut self) -> u32 {
        self()
    }
}

impl<F> LoadOutput for F
where
    F: FnMut(LoadOutputs) + Send,
{
    fn write(&mut self, outputs: LoadOutputs) {
        self(outputs);
    }
}

/// What one processed sample did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    pub point: RocPoint,
    /// Fresh verdict, or `None` when held for maintenance.
    pub verdict: Option<bool>,
    pub edge: StabilityEdge,
}

/// Writes samples into the history and refreshes the stability flag.
#[derive(Debug, Clone)]
pub struct SampleProcessor {
    ctx: Arc<ControlContext>,
}

impl SampleProcessor {
    #[must_use]
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    pub fn process(&self, sample: FrequencySample) -> SampleOutcome {
        let point = self.ctx.history.lock().push(sample);
        ControlMetrics::inc(&self.ctx.metrics.samples_processed);

        if self.ctx.state.load() == OperatingState::Maintenance {
            ControlMetrics::inc(&self.ctx.metrics.stability_holds);
            return SampleOutcome {
                point,
                verdict: None,
                edge: StabilityEdge::Unchanged,
            };
        }

        let thresholds = self.ctx.thresholds.read();
        let stable = is_stable(point.freq_hz, point.roc_hz_per_s, thresholds);
        let edge = self.ctx.stability.set(stable, self.ctx.now());
        if edge == StabilityEdge::BecameUnstable {
            ControlMetrics::inc(&self.ctx.metrics.instability_onsets);
            log::info!(
                "instability at {:.3} Hz, {:.3} Hz/s (slot {})",
                point.freq_hz,
                point.roc_hz_per_s,
                point.slot
            );
        }
        SampleOutcome {
            point,
            verdict: Some(stable),
            edge,
        }
    }

    /// Consume samples until `shutdown` fires or every producer is gone.
    pub fn run(&self, samples: &Receiver<FrequencySample>, shutdown: &Receiver<()>) {
        loop {
            select! {
                recv(samples) -> msg => match msg {
                    Ok(sample) => {
                        self.process(sample);
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
    }
}

/// Applies keyboard scancodes to the threshold store.
#[derive(Debug, Clone)]
pub struct KeyboardConsumer {
    ctx: Arc<ControlContext>,
}

impl KeyboardConsumer {
    #[must_use]
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Returns the updated pair, or `None` for an unbound key.
    pub fn handle(&self, code: u8) -> Option<Thresholds> {
        match ThresholdCommand::from_scancode(code) {
            Some(command) => Some(self.ctx.thresholds.apply(command)),
            None => {
                ControlMetrics::inc(&self.ctx.metrics.keys_unmapped);
                None
            }
        }
    }

    pub fn run(&self, keys: &Receiver<u8>, shutdown: &Receiver<()>) {
        loop {
            select! {
                recv(keys) -> msg => match msg {
                    Ok(code) => {
                        self.handle(code);
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }
    }
}

/// Drives a [`LoadShedController`] against its I/O collaborators.
pub struct FsmLoop {
    controller: LoadShedController,
    switches: Box<dyn SwitchInput>,
    outputs: Box<dyn LoadOutput>,
    poll_interval: Duration,
}

impl FsmLoop {
    #[must_use]
    pub fn new(
        controller: LoadShedController,
        switches: Box<dyn SwitchInput>,
        outputs: Box<dyn LoadOutput>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            controller,
            switches,
            outputs,
            poll_interval,
        }
    }

    /// One iteration: read switches, tick, emit outputs.
    pub fn step(&mut self) -> TickReport {
        let switches = self.switches.read();
        let report = self.controller.tick(switches);
        self.outputs.write(report.outputs);
        report
    }

    /// Iterate until `shutdown` fires, sleeping one poll interval per pass.
    pub fn run(mut self, shutdown: &Receiver<()>) -> LoadShedController {
        loop {
            self.step();
            match shutdown.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.controller
    }
}
