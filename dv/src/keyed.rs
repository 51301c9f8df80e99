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

use std::collections::{BTreeMap, VecDeque};

/// Identifier of an independent ordering and latency lane.
pub type Key = usize;

/// One-hot bit of `key` in a key mask.
pub fn key_bit(key: Key) -> u64 {
    1u64 << key
}

/// Keys whose bit is set in `mask`, lowest first.
pub fn keys_in_mask(mask: u64) -> impl Iterator<Item = Key> {
    (0..u64::BITS as usize).filter(move |key| mask & key_bit(*key) != 0)
}

/// Mask with the bits of the first `capacity` keys set.
pub fn full_mask(capacity: usize) -> u64 {
    fields::low_mask(capacity)
}

/// Ordered sequences kept separately per key.
///
/// Iteration visits keys in ascending order, which is what gives the
/// lowest-key-first output selection its determinism.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyedQueues<T> {
    queues: BTreeMap<Key, VecDeque<T>>,
    len: usize,
}

impl<T> Default for KeyedQueues<T> {
    fn default() -> Self {
        Self {
            queues: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<T> KeyedQueues<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: Key, value: T) {
        self.queues.entry(key).or_default().push_back(value);
        self.len += 1;
    }

    pub fn pop(&mut self, key: Key) -> Option<T> {
        let queue = self.queues.get_mut(&key)?;
        let value = queue.pop_front()?;
        if queue.is_empty() {
            self.queues.remove(&key);
        }
        self.len -= 1;
        Some(value)
    }

    pub fn front(&self, key: Key) -> Option<&T> {
        self.queues.get(&key).and_then(|q| q.front())
    }

    pub fn len_of(&self, key: Key) -> usize {
        self.queues.get(&key).map_or(0, |q| q.len())
    }

    /// Total number of values across all keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keys holding at least one value, ascending.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.queues.keys().copied()
    }

    /// Lowest key holding a value whose front satisfies `ready`.
    pub fn first_key_where<F>(&self, mut ready: F) -> Option<Key>
    where
        F: FnMut(Key, &T) -> bool,
    {
        self.queues
            .iter()
            .find(|(key, q)| q.front().map_or(false, |v| ready(**key, v)))
            .map(|(key, _)| *key)
    }

    /// Removes and returns the whole sequence of `key`.
    pub fn take(&mut self, key: Key) -> VecDeque<T> {
        let queue = self.queues.remove(&key).unwrap_or_default();
        self.len -= queue.len();
        queue
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &VecDeque<T>)> {
        self.queues.iter().map(|(key, q)| (*key, q))
    }

    pub fn clear(&mut self) {
        self.queues.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_key_fifo_order() {
        let mut queues = KeyedQueues::new();
        queues.push(2, 'a');
        queues.push(1, 'b');
        queues.push(2, 'c');
        assert_eq!(queues.len(), 3);
        assert_eq!(queues.keys().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(queues.pop(2), Some('a'));
        assert_eq!(queues.pop(2), Some('c'));
        assert_eq!(queues.pop(2), None);
        assert_eq!(queues.len_of(1), 1);
        assert_eq!(queues.keys().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn first_key_is_lowest() {
        let mut queues = KeyedQueues::new();
        queues.push(3, 30);
        queues.push(1, 10);
        queues.push(0, 1);
        assert_eq!(queues.first_key_where(|_, _| true), Some(0));
        assert_eq!(queues.first_key_where(|_, v| *v >= 10), Some(1));
        assert_eq!(queues.first_key_where(|key, _| key > 1), Some(3));
        assert_eq!(queues.first_key_where(|_, v| *v > 30), None);
    }

    #[test]
    fn take_drains_one_key() {
        let mut queues = KeyedQueues::new();
        queues.push(0, 1);
        queues.push(0, 2);
        queues.push(1, 3);
        assert_eq!(queues.take(0), VecDeque::from(vec![1, 2]));
        assert_eq!(queues.len(), 1);
        assert!(queues.take(0).is_empty());
    }

    #[test]
    fn masks() {
        assert_eq!(keys_in_mask(0b1010).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(full_mask(4), 0b1111);
        assert_eq!(full_mask(64), u64::MAX);
        assert_eq!(key_bit(63), 1 << 63);
    }
}
