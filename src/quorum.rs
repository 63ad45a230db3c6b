// Copyright 2018 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Adjusts the read/write quorum fanout (R/W, against a fixed replica count N) to observed
//! network conditions, grounded on `network.py`'s `DynamicQuorum`. Latency and success/failure
//! are fed in after every completed public operation; on a 5-second cadence the controller
//! widens R and narrows W under sustained failure or high latency, and does the reverse once
//! things quiet down, always restoring `R + W > N` before returning control.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const LATENCY_WINDOW: usize = 100;
const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(5);
const FAILURE_THRESHOLD: u32 = 3;
const LATENCY_THRESHOLD: Duration = Duration::from_secs(1);

pub struct DynamicQuorum {
    pub current_r: usize,
    pub current_w: usize,
    pub current_n: usize,
    min_r: usize,
    min_w: usize,
    latencies: VecDeque<Duration>,
    failures: u32,
    last_adjustment: Instant,
}

impl DynamicQuorum {
    pub fn new() -> Self {
        Self::with_bounds(1, 1, 3)
    }

    pub fn with_bounds(min_r: usize, min_w: usize, n: usize) -> Self {
        let mut q = DynamicQuorum {
            current_r: min_r,
            current_w: min_w,
            current_n: n,
            min_r,
            min_w,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            failures: 0,
            last_adjustment: Instant::now(),
        };
        q.restore_invariant();
        q
    }

    /// Feeds one completed operation's outcome into the sliding window and, if the adjustment
    /// interval has elapsed, re-derives R/W from it.
    pub fn record(&mut self, latency: Duration, success: bool) {
        if self.latencies.len() >= LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);

        if success {
            self.failures = self.failures.saturating_sub(1);
        } else {
            self.failures += 1;
        }

        if self.last_adjustment.elapsed() >= ADJUSTMENT_INTERVAL {
            self.adjust();
            self.last_adjustment = Instant::now();
        }
    }

    fn average_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::from_secs(0);
        }
        let sum: Duration = self.latencies.iter().sum();
        sum / self.latencies.len() as u32
    }

    /// `R <- min(N-1, R+1); W <- max(W_min, W-1)` under sustained failure or high latency;
    /// the opposite shift otherwise. N itself is never adjusted here.
    fn adjust(&mut self) {
        if self.average_latency() > LATENCY_THRESHOLD || self.failures > FAILURE_THRESHOLD {
            self.current_r = (self.current_r + 1).min(self.current_n.saturating_sub(1).max(self.min_r));
            self.current_w = self.current_w.saturating_sub(1).max(self.min_w);
        } else {
            self.current_r = self.current_r.saturating_sub(1).max(self.min_r);
            self.current_w = (self.current_w + 1).min(self.current_n.saturating_sub(1).max(self.min_w));
        }
        self.restore_invariant();
    }

    /// Restores `R + W > N` by setting `W = N - R + 1` if the shift above violated it, per
    /// spec. That formula alone can push `W` above `N-1`; clamped back down, and if clamping
    /// reopens the gap, the remainder is made up on `R` instead (itself capped at `N-1`), so
    /// both `R <= N-1` and `W <= N-1` hold simultaneously with `R + W > N`.
    fn restore_invariant(&mut self) {
        if self.current_r + self.current_w <= self.current_n {
            let max_rw = self.current_n.saturating_sub(1);
            self.current_w = (self.current_n + 1 - self.current_r.min(self.current_n)).min(max_rw.max(self.min_w));
            if self.current_r + self.current_w <= self.current_n {
                self.current_r = (self.current_n + 1 - self.current_w).min(max_rw.max(self.min_r));
            }
        }
    }
}

impl Default for DynamicQuorum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_invariant_satisfied() {
        let q = DynamicQuorum::new();
        assert!(q.current_r + q.current_w > q.current_n);
    }

    #[test]
    fn invariant_holds_after_forced_adjustment() {
        let mut q = DynamicQuorum::new();
        q.failures = FAILURE_THRESHOLD + 1;
        q.last_adjustment = Instant::now() - ADJUSTMENT_INTERVAL - Duration::from_secs(1);
        q.record(Duration::from_millis(10), false);
        assert!(q.current_r + q.current_w > q.current_n);
        assert!(q.current_r <= q.current_n.saturating_sub(1).max(q.min_r));
    }

    #[test]
    fn widens_r_and_narrows_w_under_sustained_failure() {
        let mut q = DynamicQuorum::new();
        q.failures = FAILURE_THRESHOLD + 1;
        q.last_adjustment = Instant::now() - ADJUSTMENT_INTERVAL - Duration::from_secs(1);
        let r_before = q.current_r;
        q.record(Duration::from_millis(10), false);
        assert!(q.current_r >= r_before);
        assert!(q.current_w >= q.min_w);
    }

    #[test]
    fn never_shrinks_below_configured_minimums() {
        let mut q = DynamicQuorum::new();
        for _ in 0..50 {
            q.last_adjustment = Instant::now() - ADJUSTMENT_INTERVAL - Duration::from_secs(1);
            q.record(Duration::from_millis(1), true);
        }
        assert!(q.current_r >= q.min_r);
        assert!(q.current_w >= q.min_w);
        assert!(q.current_r + q.current_w > q.current_n);
    }
}
