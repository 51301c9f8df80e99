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

mod bench;
mod comparator;
mod config;
mod driver;
mod error;
mod keyed;
mod oracle;
mod report;
mod stimulus;
mod trace;

// devices the benches can run against without hardware
pub mod models;

// Public types
// type to use for cycles
pub type Cycle = usize;

pub use crate::bench::{DelayBankBench, ResponseBankBench, Testbench, TopBench};
pub use crate::comparator::{Comparator, Leftover, Side};
pub use crate::config::{DvConfig, MAX_KEY_CAPACITY};
pub use crate::driver::{Channel, CycleDriver, Port, Signal};
pub use crate::error::Error;
pub use crate::keyed::{full_mask, key_bit, keys_in_mask, Key, KeyedQueues};
pub use crate::oracle::{LatencyOracle, Obligation, RealEndpoint, ReservationOracle};
pub use crate::report::{LatencyStats, LatencyTracker, RunReport};
pub use crate::stimulus::Stimulus;
pub use crate::trace::{TracingDriver, VcdWriter};

// for sizing response bank devices
pub use crate::bench::response_bank_payload_width;
