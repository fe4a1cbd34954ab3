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

use priority_queue::double_priority_queue::DoublePriorityQueue;

/// Identifies a flow within an event loop.
pub type FlowId = u64;

/// Earliest-deadline queue of pending flow send times.
///
/// An event loop driving several flows parks each flow's next allowed send
/// time here, sleeps until the earliest one, and re-polls the flows that
/// came due. Rescheduling a flow replaces its previous deadline; a torn
/// down flow is simply cancelled, so a deadline never fires for a dead
/// flow.
pub struct SendScheduler {
    deadlines: DoublePriorityQueue<FlowId, Instant>,
}

impl SendScheduler {
    pub fn new() -> Self {
        Self {
            deadlines: DoublePriorityQueue::new(),
        }
    }

    /// Park `flow` until `at`, replacing any earlier deadline for it.
    pub fn schedule(&mut self, flow: FlowId, at: Instant) {
        _ = self.deadlines.push(flow, at);
    }

    /// Drop the pending deadline for `flow`, if any.
    pub fn cancel(&mut self, flow: FlowId) {
        _ = self.deadlines.remove(&flow);
    }

    /// Pop the next flow whose deadline is at or before `now`.
    pub fn next_ready(&mut self, now: Instant) -> Option<FlowId> {
        let (_, at) = self.deadlines.peek_min()?;
        if *at > now {
            return None;
        }
        self.deadlines.pop_min().map(|(flow, _)| flow)
    }

    /// Time until the earliest deadline, zero if it already passed. None
    /// when nothing is scheduled.
    pub fn time_to_next(&self, now: Instant) -> Option<Duration> {
        self.deadlines
            .peek_min()
            .map(|(_, at)| at.saturating_duration_since(now))
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

impl Default for SendScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_in_deadline_order() {
        let mut sched = SendScheduler::new();
        let now = Instant::now();

        sched.schedule(1, now + Duration::from_millis(20));
        sched.schedule(2, now + Duration::from_millis(10));
        sched.schedule(3, now + Duration::from_millis(30));
        assert_eq!(sched.len(), 3);

        assert_eq!(sched.next_ready(now), None);
        let later = now + Duration::from_millis(25);
        assert_eq!(sched.next_ready(later), Some(2));
        assert_eq!(sched.next_ready(later), Some(1));
        assert_eq!(sched.next_ready(later), None);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn reschedule_replaces_deadline() {
        let mut sched = SendScheduler::new();
        let now = Instant::now();

        sched.schedule(7, now + Duration::from_millis(5));
        sched.schedule(7, now + Duration::from_millis(50));
        assert_eq!(sched.len(), 1);
        assert_eq!(sched.next_ready(now + Duration::from_millis(10)), None);
        assert_eq!(sched.next_ready(now + Duration::from_millis(50)), Some(7));
    }

    #[test]
    fn cancel_removes_flow() {
        let mut sched = SendScheduler::new();
        let now = Instant::now();

        sched.schedule(1, now + Duration::from_millis(5));
        sched.cancel(1);
        assert!(sched.is_empty());
        assert_eq!(sched.next_ready(now + Duration::from_secs(1)), None);

        // Cancelling an unknown flow is a no-op.
        sched.cancel(42);
    }

    #[test]
    fn time_to_next_saturates() {
        let mut sched = SendScheduler::new();
        let now = Instant::now();
        assert_eq!(sched.time_to_next(now), None);

        sched.schedule(1, now + Duration::from_millis(10));
        assert_eq!(sched.time_to_next(now), Some(Duration::from_millis(10)));
        assert_eq!(
            sched.time_to_next(now + Duration::from_millis(30)),
            Some(Duration::ZERO)
        );
    }
}
