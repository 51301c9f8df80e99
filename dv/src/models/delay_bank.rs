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

use super::{FaultProperties, Inputs};
use crate::keyed::key_bit;
use crate::{Cycle, CycleDriver, Key, Port, Signal};

/// A bank of per-identifier countdown timers.
///
/// An identifier admitted with delay `d` shows up in the releasable mask
/// `d - 1` cycles after the cycle it was presented in, and stays there
/// until it is named by the one-hot release input.
pub struct DelayBankModel {
    capacity: usize,
    inputs: Inputs,
    countdown: Vec<Option<Cycle>>,
    releasable: u64,
    cycle: Cycle,
    faults: FaultProperties,
}

impl DelayBankModel {
    pub fn new(capacity: usize) -> Self {
        Self::with_faults(capacity, FaultProperties::default())
    }

    pub fn with_faults(capacity: usize, faults: FaultProperties) -> Self {
        Self {
            capacity,
            inputs: Inputs::default(),
            countdown: vec![None; capacity],
            releasable: 0,
            cycle: 0,
            faults,
        }
    }

    fn expire(&mut self, key: Key) {
        if self.faults.strikes() {
            log::info!("Randomly holding back release of {} @cycle {}", key, self.cycle);
            self.countdown[key] = Some(1);
        } else {
            self.countdown[key] = None;
            self.releasable |= key_bit(key);
        }
    }
}

impl CycleDriver for DelayBankModel {
    fn signals(&self) -> Vec<Signal> {
        vec![
            Signal::Data(Port::Admission),
            Signal::Valid(Port::Admission),
            Signal::AdmitDelay,
            Signal::ReleasedOnehot,
            Signal::Releasable,
        ]
    }

    fn reset(&mut self) {
        self.inputs.clear();
        self.countdown.iter_mut().for_each(|c| *c = None);
        self.releasable = 0;
        self.cycle = 0;
    }

    fn assert_signal(&mut self, signal: Signal, value: u64) {
        let known = self.signals();
        self.inputs.assert(&known, signal, value);
    }

    fn read_signal(&mut self, signal: Signal) -> u64 {
        match signal {
            Signal::Releasable => self.releasable,
            _ => 0,
        }
    }

    fn advance_clock(&mut self) {
        self.releasable &= !self.inputs.get(Signal::ReleasedOnehot);

        for key in 0..self.capacity {
            if let Some(remaining) = self.countdown[key] {
                if remaining <= 1 {
                    self.expire(key);
                } else {
                    self.countdown[key] = Some(remaining - 1);
                }
            }
        }

        if self.inputs.flag(Signal::Valid(Port::Admission)) {
            let key = self.inputs.get(Signal::Data(Port::Admission)) as Key;
            let delay = self.inputs.get(Signal::AdmitDelay) as Cycle;
            if key >= self.capacity {
                log::warn!("Dropping admission of unknown identifier {}", key);
            } else if self.countdown[key].is_some() || self.releasable & key_bit(key) != 0 {
                log::warn!("Dropping admission of busy identifier {}", key);
            } else if delay <= 2 {
                self.expire(key);
            } else {
                self.countdown[key] = Some(delay - 2);
            }
        }
        self.cycle += 1;
    }

    fn is_idle(&self) -> bool {
        self.releasable == 0 && self.countdown.iter().all(|c| c.is_none())
    }
}
