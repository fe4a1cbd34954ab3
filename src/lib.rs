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

//! TimelyCC is a TIMELY-style, delay-gradient congestion control engine for
//! datagram flows.
//!
//! A sender emits sequenced, timestamped packets at a self-regulated rate.
//! The receiving side measures per-packet one-way delay and detects loss
//! from sequence gaps; those samples flow back to the sender, which smooths
//! them into a delay gradient and steers its rate with an
//! additive-increase/multiplicative-decrease rule plus a hyperactive
//! increase step for fast recovery from over-conservative rates.
//!
//! The crate is the rate-control core only. Packet delivery, the feedback
//! path and timers are injected by the embedding through the [`Transport`]
//! and [`Clock`] traits; flows are single-threaded state machines with no
//! internal locking.
//!
//! ```no_run
//! use timely_cc::{FlowBuilder, FlowConfig};
//!
//! # struct Udp;
//! # impl timely_cc::Transport for Udp {
//! #     fn send(&mut self, _packet: &[u8]) -> timely_cc::Result<()> { Ok(()) }
//! # }
//! let config = FlowConfig::default();
//! let mut sender = FlowBuilder::new(config)
//!     .with_transport(Box::new(Udp))
//!     .build_sender()?;
//! sender.start()?;
//! while let Some(_wake_at) = sender.poll_send()? {
//!     // sleep until wake_at, feed back receiver samples, poll again
//! }
//! # Ok::<(), timely_cc::Error>(())
//! ```

pub use crate::delay::DelaySample;
pub use crate::delay::DelaySampler;
pub use crate::delay::SampleBatch;
pub use crate::delay::SamplerStats;
pub use crate::error::Error;
pub use crate::flow::Clock;
pub use crate::flow::FlowBuilder;
pub use crate::flow::SystemClock;
pub use crate::flow::TimelyReceiver;
pub use crate::flow::TimelySender;
pub use crate::flow::Transport;
pub use crate::gradient::GradientEstimator;
pub use crate::packet::PacketHeader;
pub use crate::packet::HEADER_SIZE;
pub use crate::rate_control::RateController;
pub use crate::rate_control::RateStats;
pub use crate::scheduler::FlowId;
pub use crate::scheduler::SendScheduler;
pub use crate::trace::FrameType;
pub use crate::trace::TraceRecord;
pub use crate::trace::TraceReplayFeed;

/// The largest payload one packet can carry: the maximum UDP payload minus
/// the fixed probe header.
pub const MAX_PAYLOAD_SIZE: usize = 65507 - packet::HEADER_SIZE;

/// Result type for flow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Per-flow configuration, validated once when the flow is built.
///
/// Rates are in bytes per second; the gradient thresholds are dimensionless
/// (seconds of delay change per second of elapsed time).
#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// EWMA smoothing factor for delay and gradient, in (0, 1).
    pub smoothing_factor: f64,

    /// Gradient below which the network is considered underloaded and the
    /// rate is increased.
    pub low_threshold: f64,

    /// Gradient above which congestion is considered building and the rate
    /// is decreased. Must be above `low_threshold`.
    pub high_threshold: f64,

    /// Multiplicative decrease factor, in (0, 1).
    pub decrease_factor: f64,

    /// Additive increase step in bytes per second.
    pub increase_step: f64,

    /// Consecutive increases after which the hyperactive step kicks in.
    pub hyperactive_threshold: u32,

    /// Lower rate bound.
    pub min_rate: f64,

    /// Upper rate bound.
    pub max_rate: f64,

    /// Rate a flow starts at, clamped into `[min_rate, max_rate]`.
    pub initial_rate: f64,

    /// Number of leading samples during which gradient-triggered decreases
    /// are suppressed while the estimator warms up.
    pub warmup_samples: u64,

    /// Payload size of constant probe packets, in bytes.
    pub payload_size: usize,

    /// Largest payload one packet may carry; frames above it fragment.
    pub max_payload_size: usize,

    /// Destination port, carried for the embedding transport. The core does
    /// not interpret it.
    pub port: u16,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.1,
            low_threshold: 5e-6,
            high_threshold: 5e-5,
            decrease_factor: 0.8,
            increase_step: 1000.0,
            hyperactive_threshold: 5,
            min_rate: 1e4,
            max_rate: 1e8,
            initial_rate: 1e5,
            warmup_samples: 1,
            payload_size: 1000,
            max_payload_size: 1400,
            port: 9000,
        }
    }
}

impl FlowConfig {
    /// Check the construction-time invariants. A config that fails here
    /// never turns into a flow.
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "smoothing factor {} outside (0, 1)",
                self.smoothing_factor
            )));
        }
        if !(self.low_threshold < self.high_threshold)
            || !self.low_threshold.is_finite()
            || !self.high_threshold.is_finite()
        {
            return Err(Error::InvalidConfig(format!(
                "gradient thresholds [{}, {}] are not an interval",
                self.low_threshold, self.high_threshold
            )));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "decrease factor {} outside (0, 1)",
                self.decrease_factor
            )));
        }
        if !(self.increase_step > 0.0) || !self.increase_step.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "increase step {} not positive",
                self.increase_step
            )));
        }
        if !(self.min_rate > 0.0)
            || !self.min_rate.is_finite()
            || !self.max_rate.is_finite()
            || self.min_rate > self.max_rate
        {
            return Err(Error::InvalidConfig(format!(
                "rate bounds [{}, {}] invalid",
                self.min_rate, self.max_rate
            )));
        }
        if !(self.initial_rate > 0.0) || !self.initial_rate.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "initial rate {} not positive",
                self.initial_rate
            )));
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max payload size {} outside 1..={}",
                self.max_payload_size, MAX_PAYLOAD_SIZE
            )));
        }
        if self.payload_size > self.max_payload_size {
            return Err(Error::InvalidConfig(format!(
                "probe payload size {} above max payload size {}",
                self.payload_size, self.max_payload_size
            )));
        }
        Ok(())
    }
}

pub mod codec;
pub mod delay;
pub mod error;
pub mod flow;
pub mod gradient;
pub mod packet;
pub mod rate_control;
pub mod scheduler;
pub mod trace;
