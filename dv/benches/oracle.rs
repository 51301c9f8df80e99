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

use bencher::Bencher;
use bencher::{benchmark_group, benchmark_main};

use simmem_dv::models::DelayBankModel;
use simmem_dv::*;

const CYCLES: Cycle = 1000;

fn latency_oracle(bench: &mut Bencher) {
    let config = DvConfig::delay_bank();
    bench.iter(|| {
        let mut stimulus = Stimulus::seeded(1, &config);
        let mut oracle = LatencyOracle::new(config.key_capacity);
        for cycle in 0..CYCLES {
            oracle.advance(cycle).unwrap();
            if let Some(key) = stimulus.pick_key(config.key_capacity, |k| !oracle.is_busy(k)) {
                let delay = stimulus.delay(config.min_delay, config.max_delay);
                oracle.admit(key, delay).unwrap();
            }
            if let Some(key) = stimulus.pick_key(config.key_capacity, |k| oracle.is_releasable(k)) {
                oracle.consume(key).unwrap();
            }
        }
        oracle.predicted_mask(CYCLES)
    });
}

fn reservation_oracle(bench: &mut Bencher) {
    let config = DvConfig::default();
    bench.iter(|| {
        let mut stimulus = Stimulus::seeded(2, &config);
        let mut oracle: ReservationOracle<u64> =
            ReservationOracle::new(config.reservation_capacity, config.key_capacity);
        for _ in 0..CYCLES {
            if oracle.can_reserve() {
                if let Some(key) = stimulus.pick_key(config.key_capacity, |_| true) {
                    oracle.reserve(key).unwrap();
                }
            }
            if let Some(key) =
                stimulus.pick_key(config.key_capacity, |k| oracle.reserved_unfilled(k) > 0)
            {
                oracle.accept_input(key, stimulus.bits(32)).unwrap();
            }
            let enable = stimulus.mask(config.key_capacity, 0.5);
            for key in keys_in_mask(oracle.predicted_mask(enable)) {
                oracle.try_release(key, true);
            }
        }
        oracle.free_slots()
    });
}

fn delay_bank_run(bench: &mut Bencher) {
    let mut tb = DelayBankBench::new(DvConfig::delay_bank(), DelayBankModel::new(32)).unwrap();
    bench.iter(|| tb.run(3, CYCLES).unwrap().mismatch_count());
}

benchmark_group!(benches, latency_oracle, reservation_oracle, delay_bank_run);
benchmark_main!(benches);
