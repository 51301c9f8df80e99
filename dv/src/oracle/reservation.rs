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

use crate::keyed::{key_bit, KeyedQueues};
use crate::{Error, Key};

/// Predicts the per-key output order of a buffer that accepts payloads
/// only into previously reserved slots.
///
/// A slot stays occupied from its reservation until its payload is
/// released.
#[derive(Clone, Debug)]
pub struct ReservationOracle<T> {
    capacity: usize,
    key_capacity: usize,
    reserved: Vec<usize>,
    expected: KeyedQueues<T>,
    occupied: usize,
}

impl<T: Clone> ReservationOracle<T> {
    /// `capacity` slots shared by `key_capacity` keys.
    pub fn new(capacity: usize, key_capacity: usize) -> Self {
        Self {
            capacity,
            key_capacity,
            reserved: vec![0; key_capacity],
            expected: KeyedQueues::new(),
            occupied: 0,
        }
    }

    pub fn free_slots(&self) -> usize {
        self.capacity - self.occupied
    }

    pub fn can_reserve(&self) -> bool {
        self.occupied < self.capacity
    }

    /// Reserved slots of `key` still waiting for their payload.
    pub fn reserved_unfilled(&self, key: Key) -> usize {
        self.reserved.get(key).copied().unwrap_or(0)
    }

    /// Payloads of `key` waiting to be released.
    pub fn queued(&self, key: Key) -> usize {
        self.expected.len_of(key)
    }

    pub fn expected_head(&self, key: Key) -> Option<&T> {
        self.expected.front(key)
    }

    pub fn is_idle(&self) -> bool {
        self.occupied == 0
    }

    pub fn has_unfilled(&self) -> bool {
        self.reserved.iter().any(|n| *n > 0)
    }

    pub fn reserve(&mut self, key: Key) -> Result<(), Error> {
        self.check_key(key)?;
        if !self.can_reserve() {
            return Err(Error::ReservationsExhausted(key));
        }
        self.reserved[key] += 1;
        self.occupied += 1;
        Ok(())
    }

    pub fn accept_input(&mut self, key: Key, payload: T) -> Result<(), Error> {
        self.check_key(key)?;
        if self.reserved[key] == 0 {
            return Err(Error::Unreserved(key));
        }
        self.reserved[key] -= 1;
        self.expected.push(key, payload);
        Ok(())
    }

    /// Predicts this cycle's output on `key`: the oldest payload, if the
    /// key is enabled and has one.
    pub fn try_release(&mut self, key: Key, enabled: bool) -> Option<T> {
        if !enabled {
            return None;
        }
        let payload = self.expected.pop(key)?;
        self.occupied -= 1;
        Some(payload)
    }

    /// Keys that may release this cycle under `enable`.
    pub fn predicted_mask(&self, enable: u64) -> u64 {
        self.expected
            .keys()
            .map(key_bit)
            .fold(0, |mask, bit| mask | bit)
            & enable
    }

    fn check_key(&self, key: Key) -> Result<(), Error> {
        if key >= self.key_capacity {
            return Err(Error::KeyOutOfRange {
                key,
                capacity: self.key_capacity,
            });
        }
        Ok(())
    }
}
