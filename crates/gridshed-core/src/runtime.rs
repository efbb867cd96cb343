//! Threaded controller runtime.
//!
//! [`ControlSystem::builder`] wires a [`ControlContext`] to three named
//! workers:
//!
//! | thread             | blocks on              | body                 |
//! |--------------------|------------------------|----------------------|
//! | `roc-calc`         | sample channel         | [`SampleProcessor`]  |
//! | `load-fsm`         | never (sleeps a poll)  | [`FsmLoop`]          |
//! | `threshold-update` | key channel            | [`KeyboardConsumer`] |
//!
//! Producers post through the returned ports. Shutdown drops the shared
//! shutdown sender, which wakes every worker, then joins them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::clock::{MonotonicClock, SystemClock};
use crate::config::ControllerConfig;
use crate::context::ControlContext;
use crate::error::{ControlError, Result};
use crate::fsm::LoadShedController;
use crate::intake::{ButtonPort, KeyboardPort, SensorPort, key_channel, sample_channel};
use crate::loads::{LoadBank, LoadOutputs};
use crate::tasks::{FsmLoop, KeyboardConsumer, LoadOutput, SampleProcessor, SwitchInput};
use crate::telemetry::TelemetrySnapshot;

pub const ROC_THREAD: &str = "roc-calc";
pub const FSM_THREAD: &str = "load-fsm";
pub const THRESHOLD_THREAD: &str = "threshold-update";

/// Switch bitmap that can be flipped from another thread.
#[derive(Debug, Clone, Default)]
pub struct SwitchBank {
    bits: Arc<AtomicU32>,
}

impl SwitchBank {
    #[must_use]
    pub fn new(bits: u32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(bits)),
        }
    }

    pub fn set(&self, bits: u32) {
        self.bits.store(bits, Ordering::Release);
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }
}

impl SwitchInput for SwitchBank {
    fn read(&mut self) -> u32 {
        self.get()
    }
}

/// Holds the most recent relay/LED bitmaps for inspection.
#[derive(Debug, Clone, Default)]
pub struct OutputLatch {
    last: Arc<Mutex<LoadOutputs>>,
}

impl OutputLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> LoadOutputs {
        *self.last.lock()
    }
}

impl LoadOutput for OutputLatch {
    fn write(&mut self, outputs: LoadOutputs) {
        *self.last.lock() = outputs;
    }
}

struct NullOutput;

impl LoadOutput for NullOutput {
    fn write(&mut self, _outputs: LoadOutputs) {}
}

fn all_switches_on(count: usize) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

pub struct ControlSystemBuilder {
    config: ControllerConfig,
    clock: Option<Arc<dyn MonotonicClock>>,
    switches: Option<Box<dyn SwitchInput>>,
    outputs: Option<Box<dyn LoadOutput>>,
    loads: Option<LoadBank>,
}

impl ControlSystemBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn switches(mut self, switches: impl SwitchInput + 'static) -> Self {
        self.switches = Some(Box::new(switches));
        self
    }

    #[must_use]
    pub fn outputs(mut self, outputs: impl LoadOutput + 'static) -> Self {
        self.outputs = Some(Box::new(outputs));
        self
    }

    /// Start from this load bank instead of an all-off one.
    #[must_use]
    pub fn loads(mut self, loads: LoadBank) -> Self {
        self.loads = Some(loads);
        self
    }

    /// Validate the config, spawn the workers and return the running system.
    pub fn spawn(self) -> Result<ControlSystem> {
        self.config.validate()?;
        let config = self.config;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn MonotonicClock>);
        let switches = self.switches.unwrap_or_else(|| {
            report_missing(ControlError::CollaboratorUnavailable("switch input"));
            Box::new(SwitchBank::new(all_switches_on(config.load_count)))
        });
        let outputs = self.outputs.unwrap_or_else(|| {
            report_missing(ControlError::CollaboratorUnavailable("load output"));
            Box::new(NullOutput)
        });

        let ctx = Arc::new(ControlContext::new(&config, clock));
        let (sensor, sample_rx) = sample_channel(&ctx, config.sample_queue_capacity);
        let (keyboard, key_rx) = key_channel(&ctx, config.key_queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let controller = match self.loads {
            Some(loads) => LoadShedController::with_loads(Arc::clone(&ctx), &config, loads),
            None => LoadShedController::new(Arc::clone(&ctx), &config),
        };
        let fsm = FsmLoop::new(controller, switches, outputs, config.poll_interval);

        let roc = spawn_blocking(
            ROC_THREAD,
            SampleProcessor::new(Arc::clone(&ctx)),
            sample_rx,
            shutdown_rx.clone(),
            |p, rx, stop| p.run(rx, stop),
        )?;
        let thresholds = spawn_blocking(
            THRESHOLD_THREAD,
            KeyboardConsumer::new(Arc::clone(&ctx)),
            key_rx,
            shutdown_rx.clone(),
            |k, rx, stop| k.run(rx, stop),
        )?;
        let fsm = thread::Builder::new()
            .name(FSM_THREAD.to_owned())
            .spawn(move || fsm.run(&shutdown_rx))?;

        log::info!(
            "control system started: {} loads, thresholds {:.1} Hz / {:.1} Hz/s",
            config.load_count,
            config.freq_threshold_hz,
            config.roc_threshold_hz_per_s
        );

        Ok(ControlSystem {
            button: ButtonPort::new(Arc::clone(&ctx)),
            ctx,
            sensor,
            keyboard,
            shutdown: Some(shutdown_tx),
            workers: vec![(ROC_THREAD, roc), (THRESHOLD_THREAD, thresholds)],
            fsm: Some(fsm),
        })
    }
}

fn report_missing(err: ControlError) {
    log::warn!("{err}; continuing with defaults");
}

fn spawn_blocking<W, T, F>(
    name: &'static str,
    worker: W,
    input: Receiver<T>,
    shutdown: Receiver<()>,
    body: F,
) -> Result<JoinHandle<()>>
where
    W: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&W, &Receiver<T>, &Receiver<()>) + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || body(&worker, &input, &shutdown))?;
    Ok(handle)
}

/// A running controller.
pub struct ControlSystem {
    ctx: Arc<ControlContext>,
    sensor: SensorPort,
    keyboard: KeyboardPort,
    button: ButtonPort,
    shutdown: Option<Sender<()>>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    fsm: Option<JoinHandle<LoadShedController>>,
}

impl ControlSystem {
    #[must_use]
    pub fn builder(config: ControllerConfig) -> ControlSystemBuilder {
        ControlSystemBuilder {
            config,
            clock: None,
            switches: None,
            outputs: None,
            loads: None,
        }
    }

    #[must_use]
    pub fn sensor(&self) -> &SensorPort {
        &self.sensor
    }

    #[must_use]
    pub fn keyboard(&self) -> &KeyboardPort {
        &self.keyboard
    }

    #[must_use]
    pub fn button(&self) -> &ButtonPort {
        &self.button
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ControlContext> {
        &self.ctx
    }

    #[must_use]
    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot::capture(&self.ctx)
    }

    /// Stop every worker and hand back the final controller.
    ///
    /// All workers are joined even if one of them panicked; the first panic
    /// seen is returned.
    pub fn shutdown(mut self) -> Result<LoadShedController> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<LoadShedController> {
        drop(self.shutdown.take());
        let mut first_panic = None;
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("worker {name} panicked");
                first_panic.get_or_insert(name);
            }
        }
        let controller = match self.fsm.take() {
            Some(handle) => match handle.join() {
                Ok(controller) => Some(controller),
                Err(_) => {
                    log::error!("worker {FSM_THREAD} panicked");
                    first_panic.get_or_insert(FSM_THREAD);
                    None
                }
            },
            None => None,
        };
        if let Some(name) = first_panic {
            return Err(ControlError::WorkerPanicked(name));
        }
        controller.ok_or(ControlError::WorkerPanicked(FSM_THREAD))
    }
}

impl Drop for ControlSystem {
    fn drop(&mut self) {
        if self.fsm.is_some() {
            let _ = self.stop_and_join();
        }
    }
}

impl std::fmt::Debug for ControlSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSystem")
            .field("ctx", &self.ctx)
            .field("running", &self.fsm.is_some())
            .finish_non_exhaustive()
    }
}
