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

use fields::low_mask;

use super::{FaultProperties, Inputs};
use crate::keyed::{key_bit, KeyedQueues};
use crate::{CycleDriver, Key, Port, Signal};

/// A response bank with reserved slots and per-identifier FIFOs.
///
/// Payloads carry their identifier in the low `key_width` bits. The output
/// presents the oldest payload of the lowest enabled identifier.
pub struct ResponseBankModel {
    key_width: usize,
    payload_width: usize,
    capacity: usize,
    inputs: Inputs,
    reserved: Vec<usize>,
    queues: KeyedQueues<u64>,
    occupied: usize,
    faults: FaultProperties,
}

impl ResponseBankModel {
    pub fn new(key_width: usize, payload_width: usize, capacity: usize) -> Self {
        Self::with_faults(key_width, payload_width, capacity, FaultProperties::default())
    }

    pub fn with_faults(
        key_width: usize,
        payload_width: usize,
        capacity: usize,
        faults: FaultProperties,
    ) -> Self {
        Self {
            key_width,
            payload_width,
            capacity,
            inputs: Inputs::default(),
            reserved: vec![0; 1 << key_width],
            queues: KeyedQueues::new(),
            occupied: 0,
            faults,
        }
    }

    fn key_of(&self, payload: u64) -> Key {
        (payload & low_mask(self.key_width)) as Key
    }

    fn reservation_ready(&self) -> bool {
        self.occupied < self.capacity
    }

    fn input_ready(&self) -> bool {
        let key = self.key_of(self.inputs.get(Signal::Data(Port::ResponseIn)));
        self.reserved[key] > 0
    }

    fn selected(&self) -> Option<Key> {
        let enable = self.inputs.get(Signal::ReleaseEnable);
        self.queues
            .first_key_where(|key, _| enable & key_bit(key) != 0)
    }
}

impl CycleDriver for ResponseBankModel {
    fn signals(&self) -> Vec<Signal> {
        let mut signals = vec![
            Signal::ReservationBurstLen,
            Signal::ReleaseEnable,
        ];
        for port in [Port::Reservation, Port::ResponseIn, Port::ResponseOut] {
            signals.extend(Signal::handshake(port));
        }
        signals
    }

    fn reset(&mut self) {
        self.inputs.clear();
        self.reserved.iter_mut().for_each(|n| *n = 0);
        self.queues.clear();
        self.occupied = 0;
    }

    fn assert_signal(&mut self, signal: Signal, value: u64) {
        let known = self.signals();
        self.inputs.assert(&known, signal, value);
    }

    fn read_signal(&mut self, signal: Signal) -> u64 {
        match signal {
            Signal::Ready(Port::Reservation) => self.reservation_ready() as u64,
            Signal::Ready(Port::ResponseIn) => self.input_ready() as u64,
            Signal::Valid(Port::ResponseOut) => self.selected().is_some() as u64,
            Signal::Data(Port::ResponseOut) => self
                .selected()
                .and_then(|key| self.queues.front(key).copied())
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn advance_clock(&mut self) {
        let reserve = self.inputs.flag(Signal::Valid(Port::Reservation)) && self.reservation_ready();
        let accept = self.inputs.flag(Signal::Valid(Port::ResponseIn)) && self.input_ready();
        let release = if self.inputs.flag(Signal::Ready(Port::ResponseOut)) {
            self.selected()
        } else {
            None
        };

        if let Some(key) = release {
            self.queues.pop(key);
            self.occupied -= 1;
        }
        if reserve {
            let onehot = self.inputs.get(Signal::Data(Port::Reservation));
            let key = onehot.trailing_zeros() as Key;
            if onehot.count_ones() == 1 && key < self.reserved.len() {
                self.reserved[key] += 1;
                self.occupied += 1;
            } else {
                log::warn!("Dropping reservation with malformed one-hot {:#b}", onehot);
            }
        }
        if accept {
            let payload = self.inputs.get(Signal::Data(Port::ResponseIn));
            let key = self.key_of(payload);
            self.reserved[key] -= 1;
            let stored = self
                .faults
                .corrupt(payload, self.key_width..self.payload_width, "response payload");
            self.queues.push(key, stored);
        }
    }

    fn is_idle(&self) -> bool {
        self.occupied == 0
    }
}
