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

use fields::{low_mask, CONTAINER_BITS};

use super::{reset, run_phases, Phase, Session, Testbench};
use crate::keyed::{full_mask, key_bit};
use crate::oracle::ReservationOracle;
use crate::report::RunReport;
use crate::stimulus::Stimulus;
use crate::{Cycle, CycleDriver, DvConfig, Error, Key, Port, Signal};

/// Burst length carried by every reservation.
const RESERVATION_BURST_LEN: u64 = 2;

/// Width of a response bank payload: the content above the key.
pub fn payload_width(config: &DvConfig) -> usize {
    config.key_width.saturating_add(config.axi.data_width)
}

/// Checks a response bank against the keyed reservation oracle.
pub struct ResponseBankBench<D> {
    config: DvConfig,
    driver: D,
}

impl<D: CycleDriver> ResponseBankBench<D> {
    pub fn new(config: DvConfig, driver: D) -> Result<Self, Error> {
        config.validate()?;
        if payload_width(&config) > CONTAINER_BITS {
            return Err(Error::InvalidConfig(format!(
                "response payload of {} bits does not fit {} bits",
                payload_width(&config),
                CONTAINER_BITS
            )));
        }
        Ok(Self { config, driver })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn run_with(
        &mut self,
        stimulus: &mut Stimulus,
        seed: u64,
        num_cycles: Cycle,
    ) -> Result<RunReport, Error> {
        let config = &self.config;
        let driver = &mut self.driver;
        let capacity = config.key_capacity;
        let key_width = config.key_width;
        let mut oracle: ReservationOracle<u64> =
            ReservationOracle::new(config.reservation_capacity, capacity);
        let mut session = Session::default();

        reset(driver, config.reset_cycles);
        let cycles = run_phases(num_cycles, config.trailing_cycles, |cycle, phase| {
            let stimulating = phase == Phase::Stimulus;

            // Decide everything from the state before the edge.
            let reservation = if stimulating && oracle.can_reserve() && stimulus.valid() {
                stimulus.pick_key(capacity, |_| true)
            } else {
                None
            };
            let input = if !stimulating || stimulus.valid() {
                stimulus
                    .pick_key(capacity, |key| oracle.reserved_unfilled(key) > 0)
                    .map(|key| (key, stimulus.bits(config.axi.data_width) << key_width | key as u64))
            } else {
                None
            };
            let enable = if stimulating {
                stimulus.mask(capacity, config.release_probability)
            } else {
                full_mask(capacity)
            };
            let ready = !stimulating || stimulus.ready();

            driver.assert_signal(Signal::Valid(Port::Reservation), reservation.is_some() as u64);
            driver.assert_signal(
                Signal::Data(Port::Reservation),
                reservation.map_or(0, key_bit),
            );
            driver.assert_signal(Signal::ReservationBurstLen, RESERVATION_BURST_LEN);
            driver.assert_signal(Signal::Valid(Port::ResponseIn), input.is_some() as u64);
            driver.assert_signal(Signal::Data(Port::ResponseIn), input.map_or(0, |(_, p)| p));
            driver.assert_signal(Signal::ReleaseEnable, enable);
            driver.assert_signal(Signal::Ready(Port::ResponseOut), ready as u64);

            let reservation_ready = driver.read_flag(Signal::Ready(Port::Reservation));
            let input_ready = driver.read_flag(Signal::Ready(Port::ResponseIn));
            let out_valid = driver.read_flag(Signal::Valid(Port::ResponseOut));
            let out_data = driver.read_signal(Signal::Data(Port::ResponseOut));

            session.comparator.check_mask(
                cycle,
                "reservation_ready",
                oracle.can_reserve() as u64,
                reservation_ready as u64,
            );
            if input.is_some() {
                session
                    .comparator
                    .check_mask(cycle, "response_ready", 1, input_ready as u64);
            }
            session.comparator.check_mask(
                cycle,
                "response_valid",
                (oracle.predicted_mask(enable) != 0) as u64,
                out_valid as u64,
            );

            if out_valid && ready {
                let key = (out_data & low_mask(key_width)) as Key;
                let predicted = if key < capacity {
                    oracle.try_release(key, enable & key_bit(key) != 0)
                } else {
                    None
                };
                session
                    .comparator
                    .check_payload(cycle, "response_payload", key, predicted, out_data);
                session.comparator.record_output("response", key, out_data);
                session.handshake("response_out", cycle);
                session.latencies.finish("response", key, cycle);
            }
            if let Some(key) = reservation.filter(|_| reservation_ready) {
                oracle.reserve(key)?;
                session.handshake("reservation", cycle);
            }
            if let Some((key, payload)) = input.filter(|_| input_ready) {
                oracle.accept_input(key, payload)?;
                session.comparator.record_input("response", key, payload);
                session.handshake("response_in", cycle);
                session.latencies.start("response", key, cycle);
            }

            driver.advance_clock();
            Ok(oracle.is_idle() && driver.is_idle())
        })?;

        session.comparator.drain(cycles);
        Ok(session.into_report(self.name(), seed, cycles))
    }
}

impl<D: CycleDriver> Testbench for ResponseBankBench<D> {
    fn name(&self) -> &'static str {
        "response_bank"
    }

    fn run(&mut self, seed: u64, num_cycles: Cycle) -> Result<RunReport, Error> {
        let mut stimulus = Stimulus::seeded(seed, &self.config);
        self.run_with(&mut stimulus, seed, num_cycles)
    }
}
