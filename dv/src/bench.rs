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

//! Differential testbenches.
//!
//! Every run has the same shape: reset the device, apply `num_cycles` of
//! random stimulus, then drain for up to `trailing_cycles` with no new
//! requests and every consumer ready. Within a cycle all inputs are
//! asserted first, the device outputs are sampled, input-side oracle
//! transitions are applied, then outputs are compared, and only then does
//! the clock advance.

mod delay_bank;
mod response_bank;
mod top;

pub use delay_bank::DelayBankBench;
pub use response_bank::{payload_width as response_bank_payload_width, ResponseBankBench};
pub use top::TopBench;

use std::collections::BTreeMap;

use crate::comparator::Comparator;
use crate::report::{LatencyTracker, RunReport};
use crate::{Cycle, CycleDriver, Error};

/// A testbench that can be run from a seed.
pub trait Testbench {
    fn name(&self) -> &'static str;

    /// Runs `num_cycles` of stimulus derived from `seed`, then drains.
    fn run(&mut self, seed: u64, num_cycles: Cycle) -> Result<RunReport, Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Stimulus,
    Drain,
}

/// Bookkeeping shared by every bench during one run.
#[derive(Debug, Default)]
struct Session {
    comparator: Comparator,
    latencies: LatencyTracker,
    handshakes: BTreeMap<&'static str, usize>,
}

impl Session {
    fn handshake(&mut self, port: &'static str, cycle: Cycle) {
        log::debug!("Handshake on {} @cycle {}", port, cycle);
        *self.handshakes.entry(port).or_default() += 1;
    }

    fn into_report(self, bench: &str, seed: u64, cycles: Cycle) -> RunReport {
        let report = RunReport::new(
            bench,
            seed,
            cycles,
            self.comparator,
            &self.handshakes,
            self.latencies,
        );
        log::info!("{}", report);
        report
    }
}

fn reset<D: CycleDriver>(driver: &mut D, cycles: Cycle) {
    driver.reset();
    for _ in 0..cycles {
        driver.advance_clock();
    }
}

/// Drives `step` through the stimulus phase and the drain phase.
///
/// `step` returns whether everything is idle after its cycle; that ends
/// the drain early. Returns the number of cycles stepped.
fn run_phases<F>(num_cycles: Cycle, trailing_cycles: Cycle, mut step: F) -> Result<Cycle, Error>
where
    F: FnMut(Cycle, Phase) -> Result<bool, Error>,
{
    for cycle in 0..num_cycles {
        step(cycle, Phase::Stimulus)?;
    }
    log::info!("Stimulus done, draining @cycle {}", num_cycles);
    let mut cycle = num_cycles;
    while cycle < num_cycles + trailing_cycles {
        let idle = step(cycle, Phase::Drain)?;
        cycle += 1;
        if idle {
            break;
        }
    }
    Ok(cycle)
}
