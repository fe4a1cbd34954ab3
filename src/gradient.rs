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

use std::time::Duration;
use std::time::Instant;

/// Floor for the time delta between two samples when computing the
/// instantaneous gradient. Back-to-back samples would otherwise blow up
/// the division.
const MIN_SAMPLE_SPACING: Duration = Duration::from_micros(1);

/// EWMA estimation of the delay and of its rate of change over time.
///
/// The gradient is dimensionless (seconds of delay change per second of
/// elapsed time); a positive value means delay is growing, i.e. congestion
/// building along the path.
#[derive(Debug)]
pub struct GradientEstimator {
    /// Smoothing factor in (0, 1); weight of a new sample.
    alpha: f64,

    /// EWMA of the measured delay.
    delay_ewma: Option<Duration>,

    /// EWMA of the delay first difference.
    gradient_ewma: f64,

    /// Arrival time of the previous sample.
    last_sample_at: Option<Instant>,

    /// Number of samples folded in so far.
    samples: u64,
}

impl GradientEstimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            delay_ewma: None,
            gradient_ewma: 0.0,
            last_sample_at: None,
            samples: 0,
        }
    }

    /// Fold in one delay measurement taken at `now`.
    ///
    /// The first sample seeds the delay average and leaves the gradient at
    /// zero; there is no trend to speak of yet.
    pub fn update(&mut self, delay: Duration, now: Instant) {
        self.samples = self.samples.saturating_add(1);

        let prev_ewma = match self.delay_ewma {
            Some(prev) => prev,
            None => {
                self.delay_ewma = Some(delay);
                self.last_sample_at = Some(now);
                return;
            }
        };

        let dt = match self.last_sample_at {
            Some(prev_at) => now.saturating_duration_since(prev_at),
            None => Duration::ZERO,
        }
        .max(MIN_SAMPLE_SPACING);

        let instant_gradient =
            (delay.as_secs_f64() - prev_ewma.as_secs_f64()) / dt.as_secs_f64();

        self.delay_ewma = Some(Duration::from_secs_f64(
            self.alpha * delay.as_secs_f64() + (1.0 - self.alpha) * prev_ewma.as_secs_f64(),
        ));
        self.gradient_ewma =
            self.alpha * instant_gradient + (1.0 - self.alpha) * self.gradient_ewma;
        self.last_sample_at = Some(now);
    }

    /// Smoothed delay, or None before the first sample.
    pub fn delay_ewma(&self) -> Option<Duration> {
        self.delay_ewma
    }

    /// Smoothed delay gradient. Zero until two samples have been seen.
    pub fn gradient(&self) -> f64 {
        self.gradient_ewma
    }

    /// Number of samples folded in.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHA: f64 = 0.1;

    #[test]
    fn first_sample_seeds_average() {
        let mut g = GradientEstimator::new(ALPHA);
        assert_eq!(g.delay_ewma(), None);
        assert_eq!(g.sample_count(), 0);

        g.update(Duration::from_millis(2), Instant::now());
        assert_eq!(g.delay_ewma(), Some(Duration::from_millis(2)));
        assert_eq!(g.gradient(), 0.0);
        assert_eq!(g.sample_count(), 1);
    }

    #[test]
    fn growing_delay_gives_positive_gradient() {
        let mut g = GradientEstimator::new(ALPHA);
        let start = Instant::now();

        for i in 0..10_u64 {
            g.update(
                Duration::from_micros(100 + 50 * i),
                start + Duration::from_millis(i),
            );
        }
        assert!(g.gradient() > 0.0);
        let ewma = g.delay_ewma().unwrap();
        assert!(ewma > Duration::from_micros(100));
        assert!(ewma < Duration::from_micros(550));
    }

    #[test]
    fn shrinking_delay_gives_negative_gradient() {
        let mut g = GradientEstimator::new(ALPHA);
        let start = Instant::now();

        for i in 0..10_u64 {
            g.update(
                Duration::from_micros(1000 - 50 * i),
                start + Duration::from_millis(i),
            );
        }
        assert!(g.gradient() < 0.0);
    }

    #[test]
    fn flat_delay_keeps_gradient_near_zero() {
        let mut g = GradientEstimator::new(ALPHA);
        let start = Instant::now();

        for i in 0..20_u64 {
            g.update(Duration::from_micros(300), start + Duration::from_millis(i));
        }
        assert!(g.gradient().abs() < 1e-9);
        assert_eq!(g.delay_ewma(), Some(Duration::from_micros(300)));
    }

    #[test]
    fn back_to_back_samples_do_not_blow_up() {
        let mut g = GradientEstimator::new(ALPHA);
        let now = Instant::now();

        g.update(Duration::from_micros(100), now);
        // Same timestamp: divisor is floored at the minimum spacing.
        g.update(Duration::from_micros(200), now);
        assert!(g.gradient().is_finite());
    }
}
