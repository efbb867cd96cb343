//! Producer-side ports for interrupt-context inputs.
//!
//! Each port wraps the sending half of a bounded channel and posts with
//! `try_send`: a producer never blocks, and when the channel is full the
//! newest item is discarded and counted. Delivery order within one channel
//! is preserved; nothing is ordered across channels.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::context::ControlContext;
use crate::metrics::ControlMetrics;
use crate::sampling::FrequencySample;

/// Result of a non-blocking post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Queued,
    /// Channel full; item discarded.
    Dropped,
    /// Item invalid at the source; never enqueued.
    Rejected,
    /// Consumer has gone away.
    Disconnected,
}

fn try_post<T>(tx: &Sender<T>, item: T) -> PostOutcome {
    match tx.try_send(item) {
        Ok(()) => PostOutcome::Queued,
        Err(TrySendError::Full(_)) => PostOutcome::Dropped,
        Err(TrySendError::Disconnected(_)) => PostOutcome::Disconnected,
    }
}

/// Frequency sensor producer.
#[derive(Debug, Clone)]
pub struct SensorPort {
    tx: Sender<FrequencySample>,
    ctx: Arc<ControlContext>,
}

impl SensorPort {
    /// Convert a raw sensor count to Hz and post it.
    pub fn post_count(&self, count: u32) -> PostOutcome {
        match FrequencySample::from_count(count) {
            Ok(sample) => self.post(sample),
            Err(err) => {
                ControlMetrics::inc(&self.ctx.metrics.samples_rejected);
                log::debug!("sensor sample rejected: {err}");
                PostOutcome::Rejected
            }
        }
    }

    /// Post an already converted sample.
    pub fn post(&self, sample: FrequencySample) -> PostOutcome {
        let outcome = try_post(&self.tx, sample);
        match outcome {
            PostOutcome::Queued => ControlMetrics::inc(&self.ctx.metrics.samples_accepted),
            PostOutcome::Dropped => {
                ControlMetrics::inc(&self.ctx.metrics.samples_dropped);
                log::debug!("sample channel full, dropped {:.3} Hz", sample.hz);
            }
            PostOutcome::Rejected | PostOutcome::Disconnected => {}
        }
        outcome
    }
}

/// Keyboard scancode producer.
#[derive(Debug, Clone)]
pub struct KeyboardPort {
    tx: Sender<u8>,
    ctx: Arc<ControlContext>,
}

impl KeyboardPort {
    pub fn post_scancode(&self, code: u8) -> PostOutcome {
        let outcome = try_post(&self.tx, code);
        match outcome {
            PostOutcome::Queued => ControlMetrics::inc(&self.ctx.metrics.keys_accepted),
            PostOutcome::Dropped => {
                ControlMetrics::inc(&self.ctx.metrics.keys_dropped);
                log::debug!("key channel full, dropped scancode {code:#04x}");
            }
            PostOutcome::Rejected | PostOutcome::Disconnected => {}
        }
        outcome
    }
}

/// Push-button producer. Flips the maintenance request directly.
#[derive(Debug, Clone)]
pub struct ButtonPort {
    ctx: Arc<ControlContext>,
}

impl ButtonPort {
    #[must_use]
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Register one button edge; returns whether maintenance is now requested.
    pub fn press(&self) -> bool {
        ControlMetrics::inc(&self.ctx.metrics.maintenance_toggles);
        self.ctx.maintenance.toggle()
    }
}

/// Bounded sample channel of `capacity` slots.
#[must_use]
pub fn sample_channel(
    ctx: &Arc<ControlContext>,
    capacity: usize,
) -> (SensorPort, Receiver<FrequencySample>) {
    let (tx, rx) = bounded(capacity);
    (
        SensorPort {
            tx,
            ctx: Arc::clone(ctx),
        },
        rx,
    )
}

/// Bounded scancode channel of `capacity` slots.
#[must_use]
pub fn key_channel(ctx: &Arc<ControlContext>, capacity: usize) -> (KeyboardPort, Receiver<u8>) {
    let (tx, rx) = bounded(capacity);
    (
        KeyboardPort {
            tx,
            ctx: Arc::clone(ctx),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ControllerConfig;

    fn ctx() -> Arc<ControlContext> {
        Arc::new(ControlContext::new(
            &ControllerConfig::default(),
            Arc::new(ManualClock::new()),
        ))
    }

    #[test]
    fn full_channel_drops_newest() {
        let ctx = ctx();
        let (port, rx) = sample_channel(&ctx, 2);
        assert_eq!(port.post(FrequencySample::from_hz(50.0)), PostOutcome::Queued);
        assert_eq!(port.post(FrequencySample::from_hz(49.0)), PostOutcome::Queued);
        assert_eq!(port.post(FrequencySample::from_hz(48.0)), PostOutcome::Dropped);

        let got: Vec<f64> = rx.try_iter().map(|s| s.hz).collect();
        assert_eq!(got, vec![50.0, 49.0]);
        let snap = ctx.metrics.snapshot();
        assert_eq!(snap.samples_accepted, 2);
        assert_eq!(snap.samples_dropped, 1);
    }

    #[test]
    fn zero_count_is_rejected_at_the_source() {
        let ctx = ctx();
        let (port, rx) = sample_channel(&ctx, 4);
        assert_eq!(port.post_count(0), PostOutcome::Rejected);
        assert_eq!(port.post_count(320), PostOutcome::Queued);
        assert_eq!(rx.try_recv().map(|s| s.hz), Ok(50.0));
        assert_eq!(ctx.metrics.snapshot().samples_rejected, 1);
    }

    #[test]
    fn disconnected_consumer_is_reported() {
        let ctx = ctx();
        let (port, rx) = key_channel(&ctx, 1);
        drop(rx);
        assert_eq!(port.post_scancode(0x75), PostOutcome::Disconnected);
    }

    #[test]
    fn key_channel_preserves_order() {
        let ctx = ctx();
        let (port, rx) = key_channel(&ctx, 10);
        for code in [0x75, 0x72, 0x7D, 0x7A] {
            assert_eq!(port.post_scancode(code), PostOutcome::Queued);
        }
        let got: Vec<u8> = rx.try_iter().collect();
        assert_eq!(got, vec![0x75, 0x72, 0x7D, 0x7A]);
    }

    #[test]
    fn button_flips_maintenance_request() {
        let ctx = ctx();
        let button = ButtonPort::new(Arc::clone(&ctx));
        assert!(button.press());
        assert!(ctx.maintenance.is_engaged());
        assert!(!button.press());
        assert_eq!(ctx.metrics.snapshot().maintenance_toggles, 2);
    }
}
