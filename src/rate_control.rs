// Copyright (c) 2026 The TimelyCC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TIMELY-style delay-gradient rate control.
//!
//! The controller turns delay/loss samples into a sending rate through an
//! additive-increase/multiplicative-decrease rule keyed on the smoothed
//! delay gradient, with a hyperactive increase step that escalates after a
//! run of consecutive increases. All anomalies degrade to slower rates;
//! there is no fatal error path inside the controller.

use std::time::Duration;
use std::time::Instant;

use log::*;

use crate::delay::DelaySample;
use crate::gradient::GradientEstimator;
use crate::FlowConfig;

/// Cap on the hyperactive increase multiplier.
const HAI_MAX_MULTIPLIER: f64 = 5.0;

/// Informal controller phase; internal bookkeeping only. Slow start ends at
/// the first multiplicative decrease and is never re-entered.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Phase {
    SlowStart,
    SteadyState,
}

/// Rate control statistics.
#[derive(Debug, Default, Clone)]
pub struct RateStats {
    /// Samples fed into the controller.
    pub samples_processed: u64,

    /// Loss-flagged samples.
    pub loss_events: u64,

    /// Additive increases applied.
    pub increases: u64,

    /// Hyperactive increases applied.
    pub hyperactive_increases: u64,

    /// Multiplicative decreases applied.
    pub decreases: u64,

    /// Total bytes handed to the pacer.
    pub bytes_sent: u64,

    /// Total packets handed to the pacer.
    pub packets_sent: u64,
}

/// Per-flow rate controller. Exactly one instance per sender-receiver pair;
/// mutated only on the thread driving the flow.
#[derive(Debug)]
pub struct RateController {
    config: FlowConfig,

    phase: Phase,

    /// Current sending rate in bytes per second, always within the
    /// configured bounds.
    rate: f64,

    /// Consecutive gradient-driven increases; drives the hyperactive step.
    consecutive_increases: u32,

    gradient: GradientEstimator,

    /// Time the last packet was handed to the transport.
    last_send_time: Option<Instant>,

    /// Earliest time the next packet may be sent.
    next_send_time: Option<Instant>,

    stats: RateStats,
}

impl RateController {
    pub fn new(config: &FlowConfig) -> Self {
        let rate = config
            .initial_rate
            .clamp(config.min_rate, config.max_rate);
        Self {
            config: config.clone(),
            phase: Phase::SlowStart,
            rate,
            consecutive_increases: 0,
            gradient: GradientEstimator::new(config.smoothing_factor),
            last_send_time: None,
            next_send_time: None,
            stats: RateStats::default(),
        }
    }

    /// Feed one delay or loss sample taken at `now`, possibly moving the
    /// rate. Loss takes absolute priority over any concurrent gradient
    /// signal for the sample.
    pub fn on_sample(&mut self, sample: &DelaySample, now: Instant) {
        self.stats.samples_processed += 1;

        if sample.is_loss {
            self.stats.loss_events += 1;
            self.decrease("loss");
            return;
        }

        self.gradient.update(sample.delay, now);
        let gradient = self.gradient.gradient();
        let warming_up = self.gradient.sample_count() <= self.config.warmup_samples;

        if gradient < self.config.low_threshold {
            self.increase(gradient);
        } else if gradient > self.config.high_threshold {
            if warming_up {
                // No trend to trust yet; hold instead of backing off.
                self.hold(gradient);
            } else {
                self.decrease("gradient");
            }
        } else {
            self.hold(gradient);
        }
    }

    /// May a packet be sent at `now`? Pure query; the pacing interval is
    /// advanced only by `on_sent`.
    pub fn admit(&self, now: Instant) -> bool {
        match self.next_send_time {
            Some(t) => now >= t,
            None => true,
        }
    }

    /// Account for a sent packet and compute the next allowed send time as
    /// `now + bytes / rate`.
    pub fn on_sent(&mut self, now: Instant, bytes: usize) {
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;
        self.last_send_time = Some(now);
        self.next_send_time = Some(now + Duration::from_secs_f64(bytes as f64 / self.rate));
    }

    /// Earliest time the next packet may be sent, if pacing is active.
    pub fn next_send_time(&self) -> Option<Instant> {
        self.next_send_time
    }

    /// Current sending rate in bytes per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Smoothed delay seen so far.
    pub fn delay_ewma(&self) -> Option<Duration> {
        self.gradient.delay_ewma()
    }

    /// Smoothed delay gradient.
    pub fn delay_gradient(&self) -> f64 {
        self.gradient.gradient()
    }

    pub fn in_slow_start(&self) -> bool {
        self.phase == Phase::SlowStart
    }

    pub fn stats(&self) -> &RateStats {
        &self.stats
    }

    fn increase(&mut self, gradient: f64) {
        // The run counter holds the increases already applied; escalation
        // starts with the step that pushes the run past the threshold.
        let step = if self.consecutive_increases > self.config.hyperactive_threshold {
            let n = (1.0
                + (self.consecutive_increases - self.config.hyperactive_threshold) as f64)
                .min(HAI_MAX_MULTIPLIER);
            self.stats.hyperactive_increases += 1;
            n * self.config.increase_step
        } else {
            self.stats.increases += 1;
            self.config.increase_step
        };

        self.rate = self.clamp(self.rate + step);
        self.consecutive_increases = self.consecutive_increases.saturating_add(1);

        trace!(
            "RATE_UP. gradient={:e}, step={}, rate={}, consecutive={}",
            gradient,
            step,
            self.rate,
            self.consecutive_increases
        );
    }

    fn decrease(&mut self, reason: &str) {
        self.rate = self.clamp(self.rate * self.config.decrease_factor);
        self.consecutive_increases = 0;
        self.phase = Phase::SteadyState;
        self.stats.decreases += 1;

        trace!("RATE_DOWN. reason={}, rate={}", reason, self.rate);
    }

    fn hold(&mut self, gradient: f64) {
        // Near equilibrium. Resetting the run counter keeps noise from
        // feeding the hyperactive state.
        self.consecutive_increases = 0;

        trace!("RATE_HOLD. gradient={:e}, rate={}", gradient, self.rate);
    }

    /// Bound the rate; non-finite or negative inputs degrade to the minimum
    /// rate rather than erroring out.
    fn clamp(&self, rate: f64) -> f64 {
        if !rate.is_finite() || rate < self.config.min_rate {
            return self.config.min_rate;
        }
        rate.min(self.config.max_rate)
    }
}
