// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::comparator::{Comparator, Leftover};
use crate::keyed::KeyedQueues;
use crate::{Cycle, Key};

/// Cycles between a transaction entering and leaving the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: Cycle,
    pub max: Cycle,
    pub total: Cycle,
}

impl LatencyStats {
    pub fn record(&mut self, latency: Cycle) {
        if self.count == 0 || latency < self.min {
            self.min = latency;
        }
        self.max = self.max.max(latency);
        self.total += latency;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "n={} min={} max={} mean={:.2}",
            self.count,
            self.min,
            self.max,
            self.mean()
        )
    }
}

/// Matches per-key start and finish cycles of transactions.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    started: BTreeMap<&'static str, KeyedQueues<Cycle>>,
    stats: BTreeMap<&'static str, LatencyStats>,
}

impl LatencyTracker {
    pub fn start(&mut self, flow: &'static str, key: Key, cycle: Cycle) {
        self.started.entry(flow).or_default().push(key, cycle);
    }

    /// Closes the oldest open transaction of `key`; returns its latency.
    pub fn finish(&mut self, flow: &'static str, key: Key, cycle: Cycle) -> Option<Cycle> {
        let started = self.started.get_mut(flow)?.pop(key)?;
        let latency = cycle.saturating_sub(started);
        self.stats.entry(flow).or_default().record(latency);
        Some(latency)
    }

    pub fn stats(&self, flow: &str) -> Option<&LatencyStats> {
        self.stats.get(flow)
    }
}

/// Outcome of one run of a testbench.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub bench: String,
    pub seed: u64,
    pub cycles: Cycle,
    pub mismatches: usize,
    pub breakdown: BTreeMap<String, usize>,
    pub handshakes: BTreeMap<String, usize>,
    pub latencies: BTreeMap<String, LatencyStats>,
    pub leftovers: Vec<Leftover>,
}

impl RunReport {
    pub fn new(
        bench: &str,
        seed: u64,
        cycles: Cycle,
        comparator: Comparator,
        handshakes: &BTreeMap<&'static str, usize>,
        latencies: LatencyTracker,
    ) -> Self {
        let (mismatches, breakdown, leftovers) = comparator.into_parts();
        Self {
            bench: bench.to_string(),
            seed,
            cycles,
            mismatches,
            breakdown: breakdown
                .into_iter()
                .map(|(check, n)| (check.to_string(), n))
                .collect(),
            handshakes: handshakes
                .iter()
                .map(|(port, n)| (port.to_string(), *n))
                .collect(),
            latencies: latencies
                .stats
                .into_iter()
                .map(|(flow, stats)| (flow.to_string(), stats))
                .collect(),
            leftovers,
        }
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} seed {}: {} mismatches in {} cycles",
            self.bench, self.seed, self.mismatches, self.cycles
        )?;
        if !self.breakdown.is_empty() {
            write!(
                f,
                " ({})",
                itertools::join(
                    self.breakdown.iter().map(|(check, n)| format!("{}: {}", check, n)),
                    ", "
                )
            )?;
        }
        if !self.leftovers.is_empty() {
            write!(f, ", {} non-drained queues", self.leftovers.len())?;
        }
        Ok(())
    }
}
