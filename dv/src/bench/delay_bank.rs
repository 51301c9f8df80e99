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

use super::{reset, run_phases, Phase, Session, Testbench};
use crate::comparator::{Leftover, Side};
use crate::keyed::key_bit;
use crate::oracle::LatencyOracle;
use crate::report::RunReport;
use crate::stimulus::Stimulus;
use crate::{Cycle, CycleDriver, DvConfig, Error, Port, Signal};

/// Checks a delay bank against the keyed latency oracle.
pub struct DelayBankBench<D> {
    config: DvConfig,
    driver: D,
}

impl<D: CycleDriver> DelayBankBench<D> {
    pub fn new(config: DvConfig, driver: D) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { config, driver })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Runs with an externally supplied source of randomness.
    pub fn run_with(
        &mut self,
        stimulus: &mut Stimulus,
        seed: u64,
        num_cycles: Cycle,
    ) -> Result<RunReport, Error> {
        let config = &self.config;
        let driver = &mut self.driver;
        let capacity = config.key_capacity;
        let mut oracle = LatencyOracle::new(capacity);
        let mut session = Session::default();

        reset(driver, config.reset_cycles);
        let cycles = run_phases(num_cycles, config.trailing_cycles, |cycle, phase| {
            oracle.advance(cycle)?;
            let observed = driver.read_signal(Signal::Releasable);
            session
                .comparator
                .check_mask(cycle, "releasable", oracle.predicted_mask(cycle), observed);

            let admission = if phase == Phase::Stimulus && stimulus.valid() {
                stimulus.pick_key(capacity, |key| !oracle.is_busy(key))
            } else {
                None
            };
            match admission {
                Some(key) => {
                    let delay = stimulus.delay(config.min_delay, config.max_delay);
                    oracle.admit(key, delay)?;
                    driver.assert_signal(Signal::Valid(Port::Admission), 1);
                    driver.assert_signal(Signal::Data(Port::Admission), key as u64);
                    driver.assert_signal(
                        Signal::AdmitDelay,
                        (delay + config.adjustment_delay) as u64,
                    );
                    session.handshake("admission", cycle);
                    session.latencies.start("release", key, cycle);
                }
                None => driver.assert_signal(Signal::Valid(Port::Admission), 0),
            }

            let release = if phase == Phase::Drain || stimulus.ready() {
                stimulus.pick_key(capacity, |key| oracle.is_releasable(key))
            } else {
                None
            };
            match release {
                Some(key) => {
                    oracle.consume(key)?;
                    driver.assert_signal(Signal::ReleasedOnehot, key_bit(key));
                    session.handshake("release", cycle);
                    session.latencies.finish("release", key, cycle);
                }
                None => driver.assert_signal(Signal::ReleasedOnehot, 0),
            }

            driver.advance_clock();
            Ok(oracle.is_idle() && driver.is_idle())
        })?;

        for key in 0..capacity {
            if oracle.is_busy(key) {
                session.comparator.note_leftover(Leftover {
                    pair: "releasable".to_string(),
                    key,
                    side: if oracle.is_pending(key) {
                        Side::Input
                    } else {
                        Side::Output
                    },
                    payloads: oracle.release_time(key).map(|t| t as u64).into_iter().collect(),
                });
            }
        }
        session.comparator.drain(cycles);
        Ok(session.into_report(self.name(), seed, cycles))
    }
}

impl<D: CycleDriver> Testbench for DelayBankBench<D> {
    fn name(&self) -> &'static str {
        "delay_bank"
    }

    fn run(&mut self, seed: u64, num_cycles: Cycle) -> Result<RunReport, Error> {
        let mut stimulus = Stimulus::seeded(seed, &self.config);
        self.run_with(&mut stimulus, seed, num_cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DelayBankModel, FaultProperties};

    #[test]
    fn faithful_device_has_no_mismatches() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let config = DvConfig::delay_bank();
        let mut bench = DelayBankBench::new(config, DelayBankModel::new(32)).unwrap();
        for seed in 0..5 {
            let report = bench.run(seed, 1000).unwrap();
            assert!(report.is_clean(), "{}", report);
            assert!(report.leftovers.is_empty(), "{:?}", report.leftovers);
            assert!(report.handshakes["admission"] > 100);
            assert_eq!(report.handshakes["admission"], report.handshakes["release"]);
        }
    }

    #[test]
    fn late_releases_are_counted() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let model = DelayBankModel::with_faults(32, FaultProperties::seeded(0.2, 3).unwrap());
        let mut bench = DelayBankBench::new(DvConfig::delay_bank(), model).unwrap();
        let report = bench.run(1, 500).unwrap();
        assert!(report.mismatch_count() > 0);
        assert!(report.breakdown["releasable"] > 0);
    }

    #[test]
    fn wrong_adjustment_is_caught() {
        let config = DvConfig {
            adjustment_delay: 2,
            ..DvConfig::delay_bank()
        };
        let mut bench = DelayBankBench::new(config, DelayBankModel::new(32)).unwrap();
        assert!(!bench.run(0, 200).unwrap().is_clean());
    }
}
