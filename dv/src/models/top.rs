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

use fields::{AxiCodec, ReadData, WriteResponse};
use rand::Rng;
use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;

use super::{FaultProperties, Inputs};
use crate::keyed::KeyedQueues;
use crate::{Channel, Cycle, CycleDriver, Key, Port, Signal};

/// Requests buffered per channel before the requester sees backpressure.
const REQUEST_QUEUE_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug)]
struct Held {
    value: u64,
    release_at: Cycle,
}

/// The full reordering buffer between a requester and a memory.
///
/// Requests are forwarded to the memory in arrival order. Responses coming
/// back are held for a random latency per transaction and then handed to
/// the requester, in order within an identifier and lowest identifier
/// first across identifiers.
pub struct SimmemTopModel {
    codec: AxiCodec,
    inputs: Inputs,
    delays: RangeInclusive<Cycle>,
    rng: Xoshiro256StarStar,
    requests: BTreeMap<Channel, VecDeque<u64>>,
    responses: BTreeMap<Channel, KeyedQueues<Held>>,
    last_release: BTreeMap<(Channel, Key), Cycle>,
    cycle: Cycle,
    faults: FaultProperties,
}

impl SimmemTopModel {
    pub fn new(codec: AxiCodec, delays: RangeInclusive<Cycle>) -> Self {
        Self::with_faults(codec, delays, FaultProperties::default())
    }

    pub fn with_faults(
        codec: AxiCodec,
        delays: RangeInclusive<Cycle>,
        faults: FaultProperties,
    ) -> Self {
        let mut model = Self {
            codec,
            inputs: Inputs::default(),
            delays,
            rng: Xoshiro256StarStar::seed_from_u64(0),
            requests: BTreeMap::new(),
            responses: BTreeMap::new(),
            last_release: BTreeMap::new(),
            cycle: 0,
            faults,
        };
        model.reset();
        model
    }

    fn key_of(&self, channel: Channel, packed: u64) -> Key {
        let id = match channel {
            Channel::WriteResponse => self.codec.unpack::<WriteResponse>(packed).id,
            _ => self.codec.unpack::<ReadData>(packed).id,
        };
        id as Key
    }

    fn payload_width(&self, channel: Channel) -> usize {
        match channel {
            Channel::WriteResponse => self.codec.layout::<WriteResponse>().width(),
            _ => self.codec.layout::<ReadData>().width(),
        }
    }

    fn request_ready(&self, channel: Channel) -> bool {
        self.requests
            .get(&channel)
            .map_or(false, |q| q.len() < REQUEST_QUEUE_DEPTH)
    }

    fn request_head(&self, channel: Channel) -> Option<u64> {
        self.requests.get(&channel).and_then(|q| q.front().copied())
    }

    /// Identifier whose held response goes out this cycle.
    fn selected(&self, channel: Channel) -> Option<Key> {
        let cycle = self.cycle;
        self.responses
            .get(&channel)?
            .first_key_where(|_, held| held.release_at <= cycle)
    }

    fn response_head(&self, channel: Channel) -> Option<u64> {
        let key = self.selected(channel)?;
        self.responses
            .get(&channel)?
            .front(key)
            .map(|held| held.value)
    }

    fn hold(&mut self, channel: Channel, value: u64) {
        let key = self.key_of(channel, value);
        let delay = self.rng.gen_range(self.delays.clone());
        let last = self.last_release.entry((channel, key)).or_default();
        let release_at = (self.cycle + delay).max(*last);
        *last = release_at;
        let width = self.payload_width(channel);
        let id_width = self.codec.dimensions().id_width;
        let value = self
            .faults
            .corrupt(value, id_width..width, channel.short_name());
        if let Some(queue) = self.responses.get_mut(&channel) {
            queue.push(key, Held { value, release_at });
        }
    }
}

impl CycleDriver for SimmemTopModel {
    fn signals(&self) -> Vec<Signal> {
        Channel::ALL
            .iter()
            .flat_map(|c| {
                let mut bundle = Signal::handshake(Port::Requester(*c)).to_vec();
                bundle.extend(Signal::handshake(Port::Memory(*c)));
                bundle
            })
            .collect()
    }

    fn reset(&mut self) {
        self.inputs.clear();
        self.requests = Channel::ALL
            .iter()
            .filter(|c| c.is_request())
            .map(|c| (*c, VecDeque::new()))
            .collect();
        self.responses = Channel::ALL
            .iter()
            .filter(|c| !c.is_request())
            .map(|c| (*c, KeyedQueues::new()))
            .collect();
        self.last_release.clear();
        self.rng = Xoshiro256StarStar::seed_from_u64(0);
        self.cycle = 0;
    }

    fn assert_signal(&mut self, signal: Signal, value: u64) {
        let known = self.signals();
        self.inputs.assert(&known, signal, value);
    }

    fn read_signal(&mut self, signal: Signal) -> u64 {
        match signal {
            Signal::Ready(Port::Requester(c)) if c.is_request() => self.request_ready(c) as u64,
            Signal::Valid(Port::Memory(c)) if c.is_request() => {
                self.request_head(c).is_some() as u64
            }
            Signal::Data(Port::Memory(c)) if c.is_request() => self.request_head(c).unwrap_or(0),
            Signal::Ready(Port::Memory(c)) if !c.is_request() => 1,
            Signal::Valid(Port::Requester(c)) if !c.is_request() => {
                self.selected(c).is_some() as u64
            }
            Signal::Data(Port::Requester(c)) if !c.is_request() => {
                self.response_head(c).unwrap_or(0)
            }
            _ => 0,
        }
    }

    fn advance_clock(&mut self) {
        let mut arrivals = vec![];
        let mut departures = vec![];
        for channel in Channel::ALL {
            if channel.is_request() {
                if self.inputs.flag(Signal::Valid(Port::Requester(channel)))
                    && self.request_ready(channel)
                {
                    arrivals.push((channel, self.inputs.get(Signal::Data(Port::Requester(channel)))));
                }
                if self.inputs.flag(Signal::Ready(Port::Memory(channel)))
                    && self.request_head(channel).is_some()
                {
                    departures.push((channel, None));
                }
            } else {
                if self.inputs.flag(Signal::Valid(Port::Memory(channel))) {
                    arrivals.push((channel, self.inputs.get(Signal::Data(Port::Memory(channel)))));
                }
                if self.inputs.flag(Signal::Ready(Port::Requester(channel))) {
                    if let Some(key) = self.selected(channel) {
                        departures.push((channel, Some(key)));
                    }
                }
            }
        }

        for (channel, key) in departures {
            match key {
                None => {
                    if let Some(queue) = self.requests.get_mut(&channel) {
                        queue.pop_front();
                    }
                }
                Some(key) => {
                    if let Some(queue) = self.responses.get_mut(&channel) {
                        queue.pop(key);
                    }
                }
            }
        }
        for (channel, value) in arrivals {
            if channel.is_request() {
                if let Some(queue) = self.requests.get_mut(&channel) {
                    queue.push_back(value);
                }
            } else {
                self.hold(channel, value);
            }
        }
        self.cycle += 1;
    }

    fn is_idle(&self) -> bool {
        self.requests.values().all(|q| q.is_empty())
            && self.responses.values().all(|q| q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fields::{AxiDimensions, WriteAddress};

    fn model(delays: RangeInclusive<Cycle>) -> SimmemTopModel {
        SimmemTopModel::new(AxiCodec::new(AxiDimensions::default()).unwrap(), delays)
    }

    #[test]
    fn forwards_requests_in_order() {
        let mut model = model(1..=1);
        let codec = AxiCodec::new(AxiDimensions::default()).unwrap();
        let port = Port::Requester(Channel::WriteAddress);
        let packed: Vec<u64> = (0..3)
            .map(|i| {
                codec.pack(&WriteAddress {
                    id: i,
                    addr: 0x10 * i,
                    ..Default::default()
                })
            })
            .collect();
        for p in packed.iter() {
            assert_eq!(model.read_signal(Signal::Ready(port)), 1);
            model.assert_signal(Signal::Valid(port), 1);
            model.assert_signal(Signal::Data(port), *p);
            model.advance_clock();
        }
        model.assert_signal(Signal::Valid(port), 0);
        let out = Port::Memory(Channel::WriteAddress);
        model.assert_signal(Signal::Ready(out), 1);
        for p in packed.iter() {
            assert_eq!(model.read_signal(Signal::Valid(out)), 1);
            assert_eq!(model.read_signal(Signal::Data(out)), *p);
            model.advance_clock();
        }
        assert_eq!(model.read_signal(Signal::Valid(out)), 0);
        assert!(model.is_idle());
    }

    #[test]
    fn holds_responses_per_key() {
        let mut model = model(3..=3);
        let codec = AxiCodec::new(AxiDimensions::default()).unwrap();
        let inbound = Port::Memory(Channel::WriteResponse);
        let outbound = Port::Requester(Channel::WriteResponse);
        let responses = [
            WriteResponse { id: 2, rsp: 1, user: 0 },
            WriteResponse { id: 1, rsp: 5, user: 0 },
        ];
        for rsp in responses.iter() {
            model.assert_signal(Signal::Valid(inbound), 1);
            model.assert_signal(Signal::Data(inbound), codec.pack(rsp));
            model.advance_clock();
        }
        model.assert_signal(Signal::Valid(inbound), 0);
        // Key 2 arrived at cycle 0 and is due at 3; key 1 is due at 4.
        assert_eq!(model.read_signal(Signal::Valid(outbound)), 0);
        model.advance_clock();
        assert_eq!(model.read_signal(Signal::Data(outbound)), codec.pack(&responses[0]));
        model.advance_clock();
        // Both are due now, the lowest key goes first.
        assert_eq!(model.read_signal(Signal::Data(outbound)), codec.pack(&responses[1]));
        model.assert_signal(Signal::Ready(outbound), 1);
        model.advance_clock();
        assert_eq!(model.read_signal(Signal::Data(outbound)), codec.pack(&responses[0]));
        model.advance_clock();
        assert!(model.is_idle());
    }

    #[test]
    fn backpressure_when_full() {
        let mut model = model(1..=1);
        let port = Port::Requester(Channel::ReadAddress);
        model.assert_signal(Signal::Valid(port), 1);
        for _ in 0..REQUEST_QUEUE_DEPTH {
            assert_eq!(model.read_signal(Signal::Ready(port)), 1);
            model.advance_clock();
        }
        assert_eq!(model.read_signal(Signal::Ready(port)), 0);
    }
}
