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
use rand::seq::IteratorRandom;
use rand::Rng;
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::{Cycle, DvConfig, Key};

/// Random decisions of the testbench.
///
/// All randomness of a run flows through the one generator held here, so a
/// run replays exactly from its seed.
pub struct Stimulus {
    rng: Box<dyn RngCore>,
    valid_probability: f64,
    ready_probability: f64,
}

impl Stimulus {
    pub fn new(rng: Box<dyn RngCore>, config: &DvConfig) -> Self {
        Self {
            rng,
            valid_probability: config.valid_probability,
            ready_probability: config.ready_probability,
        }
    }

    pub fn seeded(seed: u64, config: &DvConfig) -> Self {
        Self::new(Box::new(Xoshiro256StarStar::seed_from_u64(seed)), config)
    }

    /// Whether an input channel presents something this cycle.
    pub fn valid(&mut self) -> bool {
        self.rng.gen_bool(self.valid_probability)
    }

    /// Whether an output channel is ready this cycle.
    pub fn ready(&mut self) -> bool {
        self.rng.gen_bool(self.ready_probability)
    }

    pub fn coin(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability)
    }

    /// Uniform pick among the keys below `capacity` for which `legal` holds.
    pub fn pick_key<F>(&mut self, capacity: usize, legal: F) -> Option<Key>
    where
        F: Fn(Key) -> bool,
    {
        (0..capacity).filter(|key| legal(*key)).choose(&mut self.rng)
    }

    /// A delay in `min..=max`.
    pub fn delay(&mut self, min: Cycle, max: Cycle) -> Cycle {
        self.rng.gen_range(min..=max)
    }

    /// Random value of `width` bits.
    pub fn bits(&mut self, width: usize) -> u64 {
        self.rng.next_u64() & low_mask(width)
    }

    /// Mask over `capacity` keys, each bit set with `probability`.
    pub fn mask(&mut self, capacity: usize, probability: f64) -> u64 {
        (0..capacity).fold(0, |mask, key| {
            if self.rng.gen_bool(probability) {
                mask | (1 << key)
            } else {
                mask
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_from_seed() {
        let config = DvConfig::default();
        let draw = |seed| {
            let mut stimulus = Stimulus::seeded(seed, &config);
            (0..32)
                .map(|_| (stimulus.valid(), stimulus.bits(19), stimulus.delay(3, 10)))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(7), draw(8));
    }

    #[test]
    fn picks_only_legal_keys() {
        let mut stimulus = Stimulus::seeded(1, &DvConfig::default());
        for _ in 0..100 {
            let key = stimulus.pick_key(32, |k| k % 5 == 3).unwrap();
            assert_eq!(key % 5, 3);
        }
        assert_eq!(stimulus.pick_key(32, |_| false), None);
    }

    #[test]
    fn ranges() {
        let mut stimulus = Stimulus::seeded(2, &DvConfig::default());
        let mut seen = [false; 11];
        for _ in 0..1000 {
            let d = stimulus.delay(3, 10);
            assert!((3..=10).contains(&d));
            seen[d] = true;
            assert!(stimulus.bits(3) < 8);
            assert_eq!(stimulus.mask(4, 1.0), 0b1111);
            assert_eq!(stimulus.mask(4, 0.0), 0);
        }
        assert!(seen[3] && seen[10]);
    }

    #[test]
    fn always_and_never() {
        let config = DvConfig {
            valid_probability: 1.0,
            ready_probability: 0.0,
            ..Default::default()
        };
        let mut stimulus = Stimulus::seeded(3, &config);
        for _ in 0..10 {
            assert!(stimulus.valid());
            assert!(!stimulus.ready());
        }
    }
}
