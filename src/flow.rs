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

//! Flow assembly: sender, receiver and the builder wiring them to a clock
//! and a transport.
//!
//! A flow is one sender-receiver pairing with its own independent rate
//! control state. All mutation happens on the thread driving the flow;
//! nothing here locks. The caller owns packet delivery and the feedback
//! path: the receiver turns arrivals into [`DelaySample`] batches and the
//! embedding decides how to carry them back to
//! [`TimelySender::on_feedback`] (piggybacked on ACKs, a separate control
//! channel, or a direct call in simulation).

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use log::*;

use crate::delay::DelaySample;
use crate::delay::DelaySampler;
use crate::delay::SampleBatch;
use crate::delay::SamplerStats;
use crate::error::Error;
use crate::packet;
use crate::packet::PacketHeader;
use crate::packet::HEADER_SIZE;
use crate::rate_control::RateController;
use crate::rate_control::RateStats;
use crate::trace::fragment_sizes;
use crate::trace::TraceReplayFeed;
use crate::FlowConfig;
use crate::Result;

/// Monotonic time source injected into each flow. Replaces any notion of a
/// process-wide simulation clock.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Datagram send primitive. How packets actually travel (UDP socket,
/// simulated channel) is the embedding's business.
pub trait Transport {
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Flow lifecycle. A flow instance is configured and started exactly once.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum State {
    Built,
    Running,
    Stopped,
}

/// What drives outgoing traffic.
enum TrafficSource {
    /// Fixed-size probe packets, paced purely by the rate controller.
    Probe { payload_size: usize },

    /// Frame-trace replay: the trace decides payload sizes and cadence
    /// intent, the rate controller caps effective send timing.
    Trace {
        feed: TraceReplayFeed,
        /// Payload sizes of fragments not yet sent.
        pending: VecDeque<usize>,
    },
}

/// Sending side of a flow: tags packets with sequence number and send
/// timestamp, paces them via the rate controller, and folds fed-back delay
/// samples into the rate decision.
pub struct TimelySender {
    config: FlowConfig,
    state: State,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport>,
    source: TrafficSource,
    controller: RateController,

    /// Sequence number of the next packet; strictly increasing from 0.
    next_seq: u32,

    /// Flow start time; wire timestamps are microseconds since this.
    epoch: Option<Instant>,

    buf: Vec<u8>,
}

impl TimelySender {
    /// Start the flow. Fails on a second start, whether the flow is still
    /// running or already stopped.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Built {
            return Err(Error::InvalidState(format!(
                "cannot start flow in state {:?}",
                self.state
            )));
        }
        self.epoch = Some(self.clock.now());
        self.state = State::Running;
        debug!("flow started, initial rate {} B/s", self.controller.rate());
        Ok(())
    }

    /// Tear the flow down. Subsequent polls become no-ops, so a timer that
    /// fires after teardown does nothing.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            return Err(Error::InvalidState(format!(
                "cannot stop flow in state {:?}",
                self.state
            )));
        }
        self.state = State::Stopped;
        debug!("flow stopped after {} packets", self.controller.stats().packets_sent);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Send every packet that is due now and return the next time this flow
    /// wants to be polled again: the pacing deadline or the next trace
    /// frame's generation time, whichever is earlier. None when stopped or
    /// when a trace has been fully replayed.
    ///
    /// A failed transport send is surfaced to the caller; flow state stays
    /// consistent and the unsent payload is retried on the next poll.
    pub fn poll_send(&mut self) -> Result<Option<Instant>> {
        if self.state != State::Running {
            return Ok(None);
        }
        // epoch is set on start
        let epoch = self.epoch.unwrap();

        loop {
            let now = self.clock.now();
            if !self.controller.admit(now) {
                break;
            }
            let elapsed = now.saturating_duration_since(epoch);
            let payload_size = match self.next_payload(elapsed) {
                Some(size) => size,
                None => break,
            };

            let hdr = PacketHeader {
                seq: self.next_seq,
                send_time_us: elapsed.as_micros() as u64,
            };
            let len = packet::encode_packet(&hdr, payload_size, &mut self.buf)?;
            if let Err(e) = self.transport.send(&self.buf[..len]) {
                self.requeue(payload_size);
                return Err(e);
            }

            trace!("sent {} payload={}B rate={}B/s", hdr, payload_size, self.controller.rate());
            self.next_seq = self.next_seq.wrapping_add(1);
            self.controller.on_sent(now, len);
        }

        Ok(self.next_wakeup(epoch))
    }

    /// Feed delay/loss samples reported by the receiver side. Ignored once
    /// the flow is stopped.
    pub fn on_feedback(&mut self, samples: &[DelaySample]) {
        if self.state != State::Running {
            return;
        }
        let now = self.clock.now();
        for sample in samples {
            self.controller.on_sample(sample, now);
        }
    }

    /// Current sending rate in bytes per second.
    pub fn rate(&self) -> f64 {
        self.controller.rate()
    }

    /// Smoothed one-way delay observed via feedback.
    pub fn delay_ewma(&self) -> Option<Duration> {
        self.controller.delay_ewma()
    }

    /// Sequence number of the last packet sent, if any.
    pub fn last_seq_sent(&self) -> Option<u32> {
        self.next_seq.checked_sub(1)
    }

    pub fn stats(&self) -> &RateStats {
        self.controller.stats()
    }

    fn next_payload(&mut self, elapsed: Duration) -> Option<usize> {
        let max_payload = self.config.max_payload_size;
        match &mut self.source {
            TrafficSource::Probe { payload_size } => Some(*payload_size),
            TrafficSource::Trace { feed, pending } => {
                if pending.is_empty() {
                    let frame = feed.next_frame(elapsed)?;
                    pending.extend(fragment_sizes(frame.frame_size, max_payload));
                }
                pending.pop_front()
            }
        }
    }

    fn requeue(&mut self, payload_size: usize) {
        if let TrafficSource::Trace { pending, .. } = &mut self.source {
            pending.push_front(payload_size);
        }
    }

    fn next_wakeup(&self, epoch: Instant) -> Option<Instant> {
        let pacing = self.controller.next_send_time();
        match &self.source {
            TrafficSource::Probe { .. } => pacing,
            TrafficSource::Trace { feed, pending } => {
                if !pending.is_empty() {
                    return pacing;
                }
                let next_frame_at = feed.next_generation_time().map(|t| epoch + t)?;
                match pacing {
                    Some(p) => Some(p.max(next_frame_at)),
                    None => Some(next_frame_at),
                }
            }
        }
    }
}

/// Receiving side of a flow: decodes probe headers, measures delay and
/// infers loss. Malformed packets are dropped and counted, never fatal.
pub struct TimelyReceiver {
    state: State,
    clock: Box<dyn Clock>,
    sampler: DelaySampler,
    epoch: Option<Instant>,
    malformed_packets: u64,
}

impl TimelyReceiver {
    /// Anchor the receive timebase. Fails on a second start.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Built {
            return Err(Error::InvalidState(format!(
                "cannot start flow in state {:?}",
                self.state
            )));
        }
        self.epoch = Some(self.clock.now());
        self.state = State::Running;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            return Err(Error::InvalidState(format!(
                "cannot stop flow in state {:?}",
                self.state
            )));
        }
        self.state = State::Stopped;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Process one arrived datagram and return the delay/loss samples it
    /// produced, for the embedding to feed back to the sender. A packet too
    /// short to carry the probe header is dropped with a warning; arrivals
    /// on a non-running receiver are ignored.
    pub fn on_packet(&mut self, buf: &[u8]) -> SampleBatch {
        if self.state != State::Running {
            return SampleBatch::new();
        }
        let epoch = self.epoch.unwrap();

        let hdr = match PacketHeader::from_bytes(buf) {
            Ok(hdr) => hdr,
            Err(_) => {
                warn!("dropping malformed packet of {} bytes", buf.len());
                self.malformed_packets += 1;
                return SampleBatch::new();
            }
        };

        let recv_time_us = self
            .clock
            .now()
            .saturating_duration_since(epoch)
            .as_micros() as u64;
        self.sampler.on_receive(&hdr, recv_time_us)
    }

    /// The sequence number the next in-order packet should carry.
    pub fn expected_next_seq(&self) -> u32 {
        self.sampler.expected_next()
    }

    pub fn stats(&self) -> &SamplerStats {
        self.sampler.stats()
    }

    /// Packets dropped for being shorter than the probe header.
    pub fn malformed_packets(&self) -> u64 {
        self.malformed_packets
    }
}

/// Builds senders and receivers from a validated configuration.
///
/// Validation runs once at build time; a flow with an out-of-range
/// configuration is never constructed, let alone started.
pub struct FlowBuilder {
    config: FlowConfig,
    clock: Option<Box<dyn Clock>>,
    transport: Option<Box<dyn Transport>>,
    trace: Option<TraceReplayFeed>,
}

impl FlowBuilder {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            clock: None,
            transport: None,
            trace: None,
        }
    }

    /// Inject a clock. Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Inject the send primitive. Required for senders.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Drive traffic from a frame trace file instead of constant probes.
    pub fn with_trace_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.trace = Some(TraceReplayFeed::from_file(path)?);
        Ok(self)
    }

    /// Drive traffic from an already loaded trace.
    pub fn with_trace(mut self, feed: TraceReplayFeed) -> Self {
        self.trace = Some(feed);
        self
    }

    /// Build a sender flow, validating the configuration.
    pub fn build_sender(self) -> Result<TimelySender> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| Error::InvalidConfig("sender requires a transport".into()))?;
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        let source = match self.trace {
            Some(feed) => TrafficSource::Trace {
                feed,
                pending: VecDeque::new(),
            },
            None => TrafficSource::Probe {
                payload_size: self.config.payload_size,
            },
        };

        let controller = RateController::new(&self.config);
        let buf = vec![0; HEADER_SIZE + self.config.max_payload_size];
        Ok(TimelySender {
            config: self.config,
            state: State::Built,
            clock,
            transport,
            source,
            controller,
            next_seq: 0,
            epoch: None,
            buf,
        })
    }

    /// Build a receiver flow, validating the configuration.
    pub fn build_receiver(self) -> Result<TimelyReceiver> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        Ok(TimelyReceiver {
            state: State::Built,
            clock,
            sampler: DelaySampler::new(),
            epoch: None,
            malformed_packets: 0,
        })
    }
}
