//! Silence-based endpoint detection for raw audio capture.
//!
//! A periodic timer task polls the recorder's energy probe and raises the
//! utterance-complete signal once the signal has stayed below the silence
//! threshold for the configured window. The task is owned by the Listening
//! phase: it self-terminates after signalling, and its cancellation handle
//! is cancelled on every other exit from Listening.
//!
//! There is deliberately no maximum-listen-duration cutoff: a continuously
//! loud environment keeps the session listening until the user stops it.

use crate::capture::EnergyProbe;
use crate::config::EndpointConfig;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Watches an [`EnergyProbe`] for the end of an utterance.
pub struct EndpointDetector {
    threshold: f32,
    window: Duration,
    tick: Duration,
    probe: EnergyProbe,
}

impl EndpointDetector {
    /// Create a detector over the given probe.
    pub fn new(config: &EndpointConfig, probe: EnergyProbe) -> Self {
        Self {
            threshold: config.silence_threshold,
            window: Duration::from_millis(config.silence_window_ms),
            tick: Duration::from_millis(config.tick_interval_ms),
            probe,
        }
    }

    /// Run until the silence window elapses or `cancel` fires.
    ///
    /// Returns `true` when the utterance-complete signal should be raised,
    /// `false` when cancelled. The silence clock does not start before the
    /// probe has published at least one reading; a reading at or above the
    /// threshold resets it.
    pub async fn run(self, cancel: CancellationToken) -> bool {
        let mut timer = tokio::time::interval(self.tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_loud: Option<Instant> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("endpoint detector cancelled");
                    return false;
                }
                _ = timer.tick() => {
                    if self.probe.samples_seen() == 0 {
                        continue;
                    }
                    let now = Instant::now();
                    let last = last_loud.get_or_insert(now);
                    if self.probe.level() >= self.threshold {
                        *last = now;
                    } else if now.duration_since(*last) > self.window {
                        debug!("silence window elapsed, utterance complete");
                        return true;
                    }
                }
            }
        }
    }
}
