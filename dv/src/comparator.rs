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

use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::keyed::KeyedQueues;
use crate::{Cycle, Key};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Side {
    Input,
    Output,
}

/// Entries left in one side of a FIFO pair at the end of a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Leftover {
    pub pair: String,
    pub key: Key,
    pub side: Side,
    pub payloads: Vec<u64>,
}

impl fmt::Display for Leftover {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} key {} {:?}: [{}]",
            self.pair,
            self.key,
            self.side,
            itertools::join(self.payloads.iter().map(|p| format!("{:#x}", p)), ", ")
        )
    }
}

#[derive(Debug, Default)]
struct FifoPair {
    inputs: KeyedQueues<u64>,
    outputs: KeyedQueues<u64>,
}

/// Accumulates disagreements between the device and the oracles.
///
/// Nothing here aborts a run. Every disagreement bumps the mismatch counter
/// and is attributed to the check that found it.
#[derive(Debug, Default)]
pub struct Comparator {
    mismatches: usize,
    breakdown: BTreeMap<&'static str, usize>,
    pairs: BTreeMap<&'static str, FifoPair>,
    leftovers: Vec<Leftover>,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches
    }

    pub fn breakdown(&self) -> &BTreeMap<&'static str, usize> {
        &self.breakdown
    }

    /// Records a disagreement found by `check`.
    pub fn mismatch(&mut self, cycle: Cycle, check: &'static str, detail: fmt::Arguments) {
        self.mismatches += 1;
        *self.breakdown.entry(check).or_default() += 1;
        log::warn!("Mismatch in {}: {} @cycle {}", check, detail, cycle);
    }

    /// Compares a predicted and an observed key mask.
    pub fn check_mask(
        &mut self,
        cycle: Cycle,
        check: &'static str,
        predicted: u64,
        observed: u64,
    ) -> bool {
        if predicted == observed {
            return true;
        }
        self.mismatch(
            cycle,
            check,
            format_args!("predicted {:#b}, observed {:#b}", predicted, observed),
        );
        false
    }

    /// Compares an observed payload on `key` against the prediction. No
    /// prediction means the device produced something it should not have.
    pub fn check_payload(
        &mut self,
        cycle: Cycle,
        check: &'static str,
        key: Key,
        predicted: Option<u64>,
        observed: u64,
    ) -> bool {
        match predicted {
            Some(predicted) if predicted == observed => true,
            Some(predicted) => {
                self.mismatch(
                    cycle,
                    check,
                    format_args!(
                        "key {} predicted {:#x}, observed {:#x}",
                        key, predicted, observed
                    ),
                );
                false
            }
            None => {
                self.mismatch(
                    cycle,
                    check,
                    format_args!("key {} produced unexpected {:#x}", key, observed),
                );
                false
            }
        }
    }

    /// Appends to `input_queue[key]` of the named pair.
    pub fn record_input(&mut self, pair: &'static str, key: Key, payload: u64) {
        self.pairs.entry(pair).or_default().inputs.push(key, payload);
    }

    /// Appends to `output_queue[key]` of the named pair.
    pub fn record_output(&mut self, pair: &'static str, key: Key, payload: u64) {
        self.pairs.entry(pair).or_default().outputs.push(key, payload);
    }

    /// Reports a live entry that is not part of any FIFO pair.
    pub fn note_leftover(&mut self, leftover: Leftover) {
        log::warn!("Not drained: {}", leftover);
        self.leftovers.push(leftover);
    }

    /// Compares every FIFO pair element-wise while both sides have entries.
    ///
    /// Each differing element is a mismatch, and so is every key whose two
    /// sides differ in length. Whatever remains is kept as a leftover.
    pub fn drain(&mut self, cycle: Cycle) {
        let pairs = std::mem::take(&mut self.pairs);
        for (name, mut pair) in pairs {
            let keys: Vec<Key> = pair.inputs.keys().chain(pair.outputs.keys()).collect();
            for key in keys.into_iter().sorted().dedup() {
                let mut inputs = pair.inputs.take(key);
                let mut outputs = pair.outputs.take(key);
                let matched = inputs.len().min(outputs.len());
                for (input, output) in inputs.drain(..matched).zip(outputs.drain(..matched)) {
                    self.check_payload(cycle, name, key, Some(input), output);
                }
                if inputs.len() != outputs.len() {
                    self.mismatch(
                        cycle,
                        name,
                        format_args!(
                            "key {} left {} inputs and {} outputs",
                            key,
                            inputs.len(),
                            outputs.len()
                        ),
                    );
                }
                for (side, rest) in [(Side::Input, inputs), (Side::Output, outputs)] {
                    if !rest.is_empty() {
                        self.note_leftover(Leftover {
                            pair: name.to_string(),
                            key,
                            side,
                            payloads: rest.into_iter().collect(),
                        });
                    }
                }
            }
        }
    }

    pub fn leftovers(&self) -> &[Leftover] {
        &self.leftovers
    }

    pub fn into_parts(self) -> (usize, BTreeMap<&'static str, usize>, Vec<Leftover>) {
        (self.mismatches, self.breakdown, self.leftovers)
    }
}
