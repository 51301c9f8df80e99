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

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::keyed::{key_bit, keys_in_mask};
use crate::{Cycle, Error, Key};

/// Predicts which keys become releasable after their declared delay.
///
/// Pending keys sit in a min-heap ordered by release time, so the next
/// due entry is always the heap top. Keys expiring in the same cycle are
/// all processed by one `advance`, lowest key first.
#[derive(Clone, Debug)]
pub struct LatencyOracle {
    capacity: usize,
    now: Cycle,
    pending: Vec<Option<Cycle>>,
    due: BinaryHeap<Reverse<(Cycle, Key)>>,
    releasable: u64,
}

impl LatencyOracle {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity <= u64::BITS as usize,
            "Releasable masks hold at most 64 keys."
        );
        Self {
            capacity,
            now: 0,
            pending: vec![None; capacity],
            due: BinaryHeap::new(),
            releasable: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Release time of `key`, if it is still waiting.
    pub fn release_time(&self, key: Key) -> Option<Cycle> {
        self.pending.get(key).copied().flatten()
    }

    pub fn is_pending(&self, key: Key) -> bool {
        self.release_time(key).is_some()
    }

    pub fn is_releasable(&self, key: Key) -> bool {
        key < self.capacity && self.releasable & key_bit(key) != 0
    }

    /// A busy key may not be admitted again.
    pub fn is_busy(&self, key: Key) -> bool {
        self.is_pending(key) || self.is_releasable(key)
    }

    /// The next pending key to expire.
    pub fn next_due(&self) -> Option<(Cycle, Key)> {
        self.due.peek().map(|Reverse(entry)| *entry)
    }

    pub fn releasable_keys(&self) -> impl Iterator<Item = Key> {
        keys_in_mask(self.releasable)
    }

    pub fn is_idle(&self) -> bool {
        self.due.is_empty() && self.releasable == 0
    }

    /// Admits `key` to be released `delay` cycles from now.
    pub fn admit(&mut self, key: Key, delay: Cycle) -> Result<Cycle, Error> {
        self.check_key(key)?;
        if delay == 0 {
            return Err(Error::ZeroDelay(key));
        }
        if self.is_busy(key) {
            return Err(Error::KeyBusy(key));
        }
        let release_time = self.now + delay;
        self.pending[key] = Some(release_time);
        self.due.push(Reverse((release_time, key)));
        log::debug!(
            "Admitted key {} due at {} @cycle {}",
            key,
            release_time,
            self.now
        );
        Ok(release_time)
    }

    /// Moves time to `now` and marks every expired key releasable.
    ///
    /// Returns the keys that became releasable, in expiry order.
    pub fn advance(&mut self, now: Cycle) -> Result<Vec<Key>, Error> {
        if now < self.now {
            return Err(Error::TimeReversed {
                now: self.now,
                requested: now,
            });
        }
        self.now = now;
        let mut expired = vec![];
        while let Some((release_time, key)) = self.next_due() {
            if release_time > now {
                break;
            }
            self.due.pop();
            self.pending[key] = None;
            self.releasable |= key_bit(key);
            expired.push(key);
        }
        if !expired.is_empty() {
            log::trace!("Keys {:?} releasable @cycle {}", expired, now);
        }
        Ok(expired)
    }

    /// Clears a releasable key.
    pub fn consume(&mut self, key: Key) -> Result<(), Error> {
        self.check_key(key)?;
        if !self.is_releasable(key) {
            return Err(Error::NotReleasable(key));
        }
        self.releasable &= !key_bit(key);
        log::debug!("Consumed key {} @cycle {}", key, self.now);
        Ok(())
    }

    /// Releasable set at `now`, one bit per key.
    ///
    /// Keys whose release time has passed count as releasable even if
    /// `advance` has not reached `now` yet.
    pub fn predicted_mask(&self, now: Cycle) -> u64 {
        self.due
            .iter()
            .filter(|Reverse((release_time, _))| *release_time <= now)
            .fold(self.releasable, |mask, Reverse((_, key))| {
                mask | key_bit(*key)
            })
    }

    fn check_key(&self, key: Key) -> Result<(), Error> {
        if key >= self.capacity {
            return Err(Error::KeyOutOfRange {
                key,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
