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

//! Per-packet delay measurement and sequence-gap loss detection.

use std::time::Duration;

use log::*;
use smallvec::smallvec;
use smallvec::SmallVec;

use crate::packet::PacketHeader;

/// Widest sequence gap still believed to be loss. A jump beyond this is a
/// corrupt or forged header, not a few seconds of drops, and must not
/// materialize one synthetic sample per skipped number.
const MAX_LOSS_GAP: u32 = 4096;

/// Samples produced by a single arrival. A gap of more than 3 packets
/// spills to the heap.
pub type SampleBatch = SmallVec<[DelaySample; 4]>;

/// A single delay or loss observation, consumed by the rate controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelaySample {
    /// Sequence number the sample refers to.
    pub seq: u32,

    /// Measured one-way delay. Zero for loss samples and for arrivals whose
    /// timestamp ran ahead of the receiver clock.
    pub delay: Duration,

    /// True for a synthetic sample describing a packet declared lost via a
    /// sequence gap. Loss samples carry no delay measurement and must never
    /// be folded into the delay average.
    pub is_loss: bool,
}

impl DelaySample {
    fn lost(seq: u32) -> Self {
        Self {
            seq,
            delay: Duration::ZERO,
            is_loss: true,
        }
    }

    fn measured(seq: u32, delay: Duration) -> Self {
        Self {
            seq,
            delay,
            is_loss: false,
        }
    }
}

/// Receiver-side counters.
#[derive(Debug, Default, Clone)]
pub struct SamplerStats {
    /// Packets whose delay was measured.
    pub packets_sampled: u64,

    /// Packets declared lost via sequence gaps.
    pub packets_lost: u64,

    /// Packets that arrived behind the expected sequence number.
    pub packets_reordered: u64,

    /// Samples clamped to zero delay because the send timestamp was ahead
    /// of the receive clock.
    pub clock_skew_samples: u64,

    /// Arrivals whose sequence number jumped implausibly far ahead of the
    /// expected one. Measured but not treated as loss.
    pub seq_jumps: u64,
}

/// Turns packet arrivals into [`DelaySample`]s and infers loss from gaps in
/// the sequence number space.
#[derive(Debug, Default)]
pub struct DelaySampler {
    /// The next sequence number an in-order arrival should carry.
    expected_next: u32,

    stats: SamplerStats,
}

impl DelaySampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one arrival and return the resulting samples: one synthetic
    /// loss sample per skipped sequence number, then the measured sample for
    /// the packet itself.
    ///
    /// Out-of-order arrivals (sequence below the expected one) still produce
    /// a measured sample but do not move the expected sequence and are not
    /// loss signals. A send timestamp ahead of `recv_time_us` is clock skew;
    /// the sample is clamped to zero delay rather than rejected. A sequence
    /// number more than [`MAX_LOSS_GAP`] ahead of the expected one is a
    /// corrupt or forged header: measured, counted, and the expected
    /// sequence left where it was.
    pub fn on_receive(&mut self, hdr: &PacketHeader, recv_time_us: u64) -> SampleBatch {
        let delay = match recv_time_us.checked_sub(hdr.send_time_us) {
            Some(us) => Duration::from_micros(us),
            None => {
                warn!(
                    "clock skew: packet {} sent {}us after receive time {}us, clamping to zero",
                    hdr.seq, hdr.send_time_us, recv_time_us
                );
                self.stats.clock_skew_samples += 1;
                Duration::ZERO
            }
        };

        if hdr.seq < self.expected_next {
            trace!(
                "reordered packet seq={} expected={}",
                hdr.seq,
                self.expected_next
            );
            self.stats.packets_reordered += 1;
            self.stats.packets_sampled += 1;
            return smallvec![DelaySample::measured(hdr.seq, delay)];
        }

        if hdr.seq - self.expected_next > MAX_LOSS_GAP {
            warn!(
                "implausible sequence jump: seq={} expected={}, not treating as loss",
                hdr.seq, self.expected_next
            );
            self.stats.seq_jumps += 1;
            self.stats.packets_sampled += 1;
            return smallvec![DelaySample::measured(hdr.seq, delay)];
        }

        let mut samples: SampleBatch = (self.expected_next..hdr.seq)
            .map(DelaySample::lost)
            .collect();
        if !samples.is_empty() {
            debug!(
                "sequence gap: {} packet(s) lost before seq={}",
                samples.len(),
                hdr.seq
            );
            self.stats.packets_lost += samples.len() as u64;
        }

        samples.push(DelaySample::measured(hdr.seq, delay));
        self.stats.packets_sampled += 1;
        self.expected_next = hdr.seq.wrapping_add(1);

        samples
    }

    /// The sequence number the next in-order arrival should carry.
    pub fn expected_next(&self) -> u32 {
        self.expected_next
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hdr(seq: u32, send_time_us: u64) -> PacketHeader {
        PacketHeader { seq, send_time_us }
    }

    #[test]
    fn in_order_delivery() {
        let mut sampler = DelaySampler::new();

        for seq in 0..4 {
            let samples = sampler.on_receive(&hdr(seq, 1000 * seq as u64), 1000 * seq as u64 + 250);
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].seq, seq);
            assert_eq!(samples[0].delay, Duration::from_micros(250));
            assert!(!samples[0].is_loss);
        }
        assert_eq!(sampler.expected_next(), 4);
        assert_eq!(sampler.stats().packets_sampled, 4);
        assert_eq!(sampler.stats().packets_lost, 0);
    }

    #[test]
    fn single_gap_yields_one_loss() {
        let mut sampler = DelaySampler::new();

        sampler.on_receive(&hdr(0, 0), 100);
        sampler.on_receive(&hdr(1, 10), 110);

        // Packet 2 never arrives; packet 3 exposes the gap.
        let samples = sampler.on_receive(&hdr(3, 30), 130);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], DelaySample::lost(2));
        assert_eq!(samples[1].seq, 3);
        assert!(!samples[1].is_loss);
        assert_eq!(sampler.expected_next(), 4);
        assert_eq!(sampler.stats().packets_lost, 1);
    }

    #[test]
    fn multi_packet_gap() {
        let mut sampler = DelaySampler::new();

        let samples = sampler.on_receive(&hdr(5, 0), 100);
        assert_eq!(samples.len(), 6);
        for (i, s) in samples[..5].iter().enumerate() {
            assert_eq!(*s, DelaySample::lost(i as u32));
        }
        assert_eq!(samples[5].seq, 5);
        assert_eq!(sampler.expected_next(), 6);
    }

    #[test]
    fn reordered_packet_is_not_loss() {
        let mut sampler = DelaySampler::new();

        sampler.on_receive(&hdr(0, 0), 10);
        sampler.on_receive(&hdr(2, 20), 50); // declares 1 lost

        // Packet 1 shows up late: measured, no loss, no sequence advance.
        let samples = sampler.on_receive(&hdr(1, 10), 60);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delay, Duration::from_micros(50));
        assert!(!samples[0].is_loss);
        assert_eq!(sampler.expected_next(), 3);
        assert_eq!(sampler.stats().packets_reordered, 1);
    }

    #[test]
    fn wild_sequence_jump_is_not_a_loss_burst() {
        let mut sampler = DelaySampler::new();
        sampler.on_receive(&hdr(0, 0), 10);

        // A forged header with a wild sequence number must not turn into
        // billions of synthetic loss samples.
        let samples = sampler.on_receive(&hdr(u32::MAX, 0), 20);
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].is_loss);
        assert_eq!(sampler.stats().packets_lost, 0);
        assert_eq!(sampler.stats().seq_jumps, 1);

        // The real stream is still tracked from where it was.
        assert_eq!(sampler.expected_next(), 1);
        let samples = sampler.on_receive(&hdr(1, 10), 30);
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].is_loss);
        assert_eq!(sampler.expected_next(), 2);
    }

    #[test]
    fn clock_skew_clamps_to_zero() {
        let mut sampler = DelaySampler::new();

        let samples = sampler.on_receive(&hdr(0, 500), 100);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delay, Duration::ZERO);
        assert!(!samples[0].is_loss);
        assert_eq!(sampler.stats().clock_skew_samples, 1);
    }
}
