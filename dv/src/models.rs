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

//! Behavioral models of the devices the testbenches drive.
//!
//! The models commit state on `advance_clock` and answer reads
//! combinationally from that state and the currently asserted inputs, the
//! way a simulated netlist would. Each one can inject faults so that the
//! mismatch detection of the testbenches has something to find.

mod delay_bank;
mod response_bank;
mod top;

pub use delay_bank::DelayBankModel;
pub use response_bank::ResponseBankModel;
pub use top::SimmemTopModel;

use rand::Rng;
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::collections::HashMap;
use std::ops::Range;

use crate::{Error, Signal};

/// Characteristics of the faults a model injects.
pub struct FaultProperties {
    /// Probability that a stored payload gets one bit flipped, or that a
    /// release is held back one cycle.
    pub corruption_rate: f64,

    /// Random number generator used to calculate probabilities.
    /// Note: the RNG provided by the Default implementation is deterministic.
    pub rng: Box<dyn RngCore>,
}

impl Default for FaultProperties {
    /// No faults.
    fn default() -> Self {
        Self {
            corruption_rate: 0.0,
            rng: Box::new(Xoshiro256StarStar::seed_from_u64(0x87654321FEDCBA09u64)),
        }
    }
}

impl FaultProperties {
    /// Faults striking with `corruption_rate`, which must lie in [0, 1].
    pub fn seeded(corruption_rate: f64, seed: u64) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&corruption_rate) {
            return Err(Error::InvalidConfig(format!(
                "fault rate {} outside [0, 1]",
                corruption_rate
            )));
        }
        Ok(Self {
            corruption_rate,
            rng: Box::new(Xoshiro256StarStar::seed_from_u64(seed)),
        })
    }

    fn strikes(&mut self) -> bool {
        self.corruption_rate > 0.0 && self.rng.gen_bool(self.corruption_rate)
    }

    /// Flips one random bit of `value` within `bits`, if a fault strikes.
    fn corrupt(&mut self, value: u64, bits: Range<usize>, what: &str) -> u64 {
        if bits.is_empty() || !self.strikes() {
            return value;
        }
        let idx = self.rng.gen_range(bits);
        log::info!("Randomly injecting corruption into {}; bit {}", what, idx);
        value ^ (1 << idx)
    }
}

/// Input values as last asserted.
#[derive(Debug, Default)]
struct Inputs {
    values: HashMap<Signal, u64>,
}

impl Inputs {
    fn assert(&mut self, known: &[Signal], signal: Signal, value: u64) {
        if signal.is_output() || !known.contains(&signal) {
            log::warn!("Ignoring assertion of {} which is not a device input.", signal);
            return;
        }
        log::trace!("Asserting {} = {:#x}", signal, value);
        self.values.insert(signal, value);
    }

    fn get(&self, signal: Signal) -> u64 {
        self.values.get(&signal).copied().unwrap_or(0)
    }

    fn flag(&self, signal: Signal) -> bool {
        self.get(signal) != 0
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}
