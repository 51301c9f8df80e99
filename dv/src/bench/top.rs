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

use std::collections::VecDeque;

use fields::{
    AxiCodec, AxiDimensions, AxiMessage, BurstType, ReadAddress, ReadData, WriteAddress,
    WriteData, WriteResponse,
};

use super::{reset, run_phases, Phase, Session, Testbench};
use crate::keyed::KeyedQueues;
use crate::oracle::RealEndpoint;
use crate::report::RunReport;
use crate::stimulus::Stimulus;
use crate::{Channel, Cycle, CycleDriver, DvConfig, Error, Key, Port, Signal};

/// Encoded beat size of every generated burst.
const BURST_SIZE: u64 = 2;

/// Write responses or read beats the requester lets pile up before it
/// stops issuing new addresses.
const MAX_OUTSTANDING: usize = 16;

/// Requests the requester keeps presenting until they are accepted.
#[derive(Debug, Default)]
struct Proposals {
    waddr: Option<WriteAddress>,
    wdata: Option<WriteData>,
    raddr: Option<ReadAddress>,
}

impl Proposals {
    fn is_empty(&self) -> bool {
        self.waddr.is_none() && self.wdata.is_none() && self.raddr.is_none()
    }
}

/// Responses handed to the device by the memory, per key, in order.
#[derive(Debug, Default)]
struct InFlight {
    wrsp: KeyedQueues<u64>,
    rdata: KeyedQueues<u64>,
}

impl InFlight {
    fn is_empty(&self) -> bool {
        self.wrsp.is_empty() && self.rdata.is_empty()
    }
}

/// A random address request for a key within capacity.
fn random_address<M: AxiMessage>(stimulus: &mut Stimulus, config: &DvConfig) -> M {
    let dims = &config.axi;
    let id = stimulus
        .pick_key(config.key_capacity, |_| true)
        .unwrap_or_default() as u64;
    M::from_fields(&[
        id,
        stimulus.bits(dims.addr_width),
        stimulus.bits(config.burst_width),
        BURST_SIZE,
        BurstType::Incr.into(),
        stimulus.bits(dims.lock_width),
        stimulus.bits(dims.cache_width),
        stimulus.bits(dims.prot_width),
        stimulus.bits(dims.qos_width),
        stimulus.bits(dims.region_width),
        stimulus.bits(dims.addr_user_width),
    ])
}

fn random_wdata(stimulus: &mut Stimulus, dims: &AxiDimensions) -> WriteData {
    WriteData {
        data: stimulus.bits(dims.data_width),
        strb: stimulus.bits(dims.strb_width),
        last: stimulus.bits(dims.last_width),
        user: stimulus.bits(dims.data_user_width),
    }
}

/// Checks the full reordering buffer with an idealized memory behind it.
pub struct TopBench<D> {
    config: DvConfig,
    codec: AxiCodec,
    driver: D,
    deepest_backlog: usize,
}

impl<D: CycleDriver> TopBench<D> {
    pub fn new(config: DvConfig, driver: D) -> Result<Self, Error> {
        config.validate()?;
        let codec = config.codec()?;
        Ok(Self {
            config,
            codec,
            driver,
            deepest_backlog: 0,
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Most write obligations the memory held at once during the last run.
    pub fn deepest_backlog(&self) -> usize {
        self.deepest_backlog
    }

    pub fn run_with(
        &mut self,
        stimulus: &mut Stimulus,
        seed: u64,
        num_cycles: Cycle,
    ) -> Result<RunReport, Error> {
        let config = &self.config;
        let codec = &self.codec;
        let driver = &mut self.driver;
        let mut endpoint = RealEndpoint::new(codec.clone());
        let mut proposals = Proposals::default();
        let mut in_flight = InFlight::default();
        // Beats still to send for each accepted write address, oldest first.
        let mut unsent: VecDeque<u64> = VecDeque::new();
        // Beats sent ahead of their address.
        let mut ahead: u64 = 0;
        let mut deepest_backlog = 0;
        let mut outstanding_writes: usize = 0;
        let mut outstanding_beats: usize = 0;
        let mut session = Session::default();

        reset(driver, config.reset_cycles);
        let cycles = run_phases(num_cycles, config.trailing_cycles, |cycle, phase| {
            let stimulating = phase == Phase::Stimulus;
            if stimulating {
                if proposals.waddr.is_none()
                    && unsent.len() < config.max_unsent_writes
                    && outstanding_writes < MAX_OUTSTANDING
                    && stimulus.valid()
                {
                    proposals.waddr = Some(random_address(stimulus, config));
                }
                if proposals.wdata.is_none() && stimulus.valid() {
                    proposals.wdata = Some(random_wdata(stimulus, &config.axi));
                }
                if proposals.raddr.is_none()
                    && outstanding_beats < MAX_OUTSTANDING
                    && stimulus.valid()
                {
                    proposals.raddr = Some(random_address(stimulus, config));
                }
            } else if proposals.wdata.is_none() && !unsent.is_empty() {
                proposals.wdata = Some(random_wdata(stimulus, &config.axi));
            }
            let wrsp_ready = !stimulating || stimulus.ready();
            let rdata_ready = !stimulating || stimulus.ready();

            present(driver, codec, Channel::WriteAddress, proposals.waddr.as_ref());
            present(driver, codec, Channel::WriteData, proposals.wdata.as_ref());
            present(driver, codec, Channel::ReadAddress, proposals.raddr.as_ref());
            driver.assert_signal(
                Signal::Ready(Port::Requester(Channel::WriteResponse)),
                wrsp_ready as u64,
            );
            driver.assert_signal(
                Signal::Ready(Port::Requester(Channel::ReadData)),
                rdata_ready as u64,
            );
            for channel in [Channel::WriteAddress, Channel::WriteData, Channel::ReadAddress] {
                driver.assert_signal(Signal::Ready(Port::Memory(channel)), 1);
            }
            let wrsp_offer = endpoint.peek_write_response().map(|m| codec.pack(m));
            let rdata_offer = endpoint.peek_read_data().map(|m| codec.pack(m));
            offer(driver, Channel::WriteResponse, wrsp_offer);
            offer(driver, Channel::ReadData, rdata_offer);

            let waddr_taken = driver.read_flag(Signal::Ready(Port::Requester(Channel::WriteAddress)));
            let wdata_taken = driver.read_flag(Signal::Ready(Port::Requester(Channel::WriteData)));
            let raddr_taken = driver.read_flag(Signal::Ready(Port::Requester(Channel::ReadAddress)));
            let wrsp_taken = wrsp_offer.is_some()
                && driver.read_flag(Signal::Ready(Port::Memory(Channel::WriteResponse)));
            let rdata_taken = rdata_offer.is_some()
                && driver.read_flag(Signal::Ready(Port::Memory(Channel::ReadData)));
            let mut forwarded = vec![];
            for channel in [Channel::WriteAddress, Channel::WriteData, Channel::ReadAddress] {
                let port = Port::Memory(channel);
                if driver.read_flag(Signal::Valid(port)) {
                    forwarded.push((channel, driver.read_signal(Signal::Data(port))));
                }
            }
            let mut released = vec![];
            for (channel, ready) in [
                (Channel::WriteResponse, wrsp_ready),
                (Channel::ReadData, rdata_ready),
            ] {
                let port = Port::Requester(channel);
                if ready && driver.read_flag(Signal::Valid(port)) {
                    released.push((channel, driver.read_signal(Signal::Data(port))));
                }
            }

            // Requests accepted from the requester.
            if let Some(waddr) = proposals.waddr.filter(|_| waddr_taken) {
                let key = waddr.id as Key;
                let response = endpoint.write_response_for(&waddr);
                session.comparator.record_input("waddr", key, codec.pack(&waddr));
                session.comparator.record_input("wrsp", key, codec.pack(&response));
                session.handshake("waddr", cycle);
                session.latencies.start("write", key, cycle);
                let covered = waddr.burst_len.min(ahead);
                ahead -= covered;
                if waddr.burst_len > covered {
                    unsent.push_back(waddr.burst_len - covered);
                }
                outstanding_writes += 1;
                proposals.waddr = None;
            }
            if let Some(wdata) = proposals.wdata.filter(|_| wdata_taken) {
                session.comparator.record_input("wdata", 0, codec.pack(&wdata));
                session.handshake("wdata", cycle);
                match unsent.front().copied() {
                    Some(1) => {
                        unsent.pop_front();
                    }
                    Some(rest) => unsent[0] = rest - 1,
                    None => ahead += 1,
                }
                proposals.wdata = None;
            }
            if let Some(raddr) = proposals.raddr.filter(|_| raddr_taken) {
                let key = raddr.id as Key;
                session.comparator.record_input("raddr", key, codec.pack(&raddr));
                for beat in endpoint.read_data_for(&raddr) {
                    session.comparator.record_input("rdata", key, codec.pack(&beat));
                }
                session.handshake("raddr", cycle);
                session.latencies.start("read", key, cycle);
                outstanding_beats += raddr.burst_len as usize + 1;
                proposals.raddr = None;
            }

            // Responses released to the requester.
            for (channel, packed) in released {
                match channel {
                    Channel::WriteResponse => {
                        let key = codec.unpack::<WriteResponse>(packed).id as Key;
                        let predicted = in_flight.wrsp.pop(key);
                        session
                            .comparator
                            .check_payload(cycle, "wrsp_release", key, predicted, packed);
                        session.comparator.record_output("wrsp", key, packed);
                        session.handshake("wrsp", cycle);
                        session.latencies.finish("write", key, cycle);
                        outstanding_writes = outstanding_writes.saturating_sub(1);
                    }
                    _ => {
                        let beat = codec.unpack::<ReadData>(packed);
                        let key = beat.id as Key;
                        let predicted = in_flight.rdata.pop(key);
                        session
                            .comparator
                            .check_payload(cycle, "rdata_release", key, predicted, packed);
                        session.comparator.record_output("rdata", key, packed);
                        session.handshake("rdata", cycle);
                        outstanding_beats = outstanding_beats.saturating_sub(1);
                        if beat.last != 0 {
                            session.latencies.finish("read", key, cycle);
                        }
                    }
                }
            }

            // Responses the memory handed over, taken before new requests
            // can change what the memory offers.
            if wrsp_taken {
                let response = endpoint.pop_write_response()?;
                in_flight
                    .wrsp
                    .push(response.id as Key, codec.pack(&response));
            }
            if rdata_taken {
                let beat = endpoint.pop_read_data()?;
                in_flight.rdata.push(beat.id as Key, codec.pack(&beat));
            }

            // Requests the device forwarded to the memory.
            for (channel, packed) in forwarded {
                match channel {
                    Channel::WriteAddress => {
                        let waddr = codec.unpack::<WriteAddress>(packed);
                        session
                            .comparator
                            .record_output("waddr", waddr.id as Key, packed);
                        endpoint.accept_waddr(&waddr);
                        deepest_backlog = deepest_backlog.max(endpoint.obligations().count());
                    }
                    Channel::WriteData => {
                        session.comparator.record_output("wdata", 0, packed);
                        endpoint.accept_wdata(&codec.unpack::<WriteData>(packed));
                    }
                    _ => {
                        let raddr = codec.unpack::<ReadAddress>(packed);
                        session
                            .comparator
                            .record_output("raddr", raddr.id as Key, packed);
                        endpoint.accept_raddr(&raddr);
                    }
                }
            }

            driver.advance_clock();
            Ok(proposals.is_empty()
                && unsent.is_empty()
                && endpoint.is_idle()
                && in_flight.is_empty()
                && driver.is_idle())
        })?;

        if !unsent.is_empty() {
            log::warn!(
                "{} write data beats never sent @cycle {}",
                unsent.iter().sum::<u64>(),
                cycles
            );
        }
        self.deepest_backlog = deepest_backlog;
        session.comparator.drain(cycles);
        Ok(session.into_report(self.name(), seed, cycles))
    }
}

fn present<D: CycleDriver, M: AxiMessage>(
    driver: &mut D,
    codec: &AxiCodec,
    channel: Channel,
    message: Option<&M>,
) {
    let port = Port::Requester(channel);
    driver.assert_signal(Signal::Valid(port), message.is_some() as u64);
    if let Some(message) = message {
        driver.assert_signal(Signal::Data(port), codec.pack(message));
    }
}

fn offer<D: CycleDriver>(driver: &mut D, channel: Channel, packed: Option<u64>) {
    let port = Port::Memory(channel);
    driver.assert_signal(Signal::Valid(port), packed.is_some() as u64);
    driver.assert_signal(Signal::Data(port), packed.unwrap_or(0));
}

impl<D: CycleDriver> Testbench for TopBench<D> {
    fn name(&self) -> &'static str {
        "simmem_top"
    }

    fn run(&mut self, seed: u64, num_cycles: Cycle) -> Result<RunReport, Error> {
        let mut stimulus = Stimulus::seeded(seed, &self.config);
        self.run_with(&mut stimulus, seed, num_cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FaultProperties, SimmemTopModel};

    fn device(config: &DvConfig) -> SimmemTopModel {
        SimmemTopModel::new(config.codec().unwrap(), config.min_delay..=config.max_delay)
    }

    #[test]
    fn faithful_device_has_no_mismatches() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let config = DvConfig::default();
        let mut bench = TopBench::new(config.clone(), device(&config)).unwrap();
        for seed in 0..3 {
            let report = bench.run(seed, 1000).unwrap();
            assert!(report.is_clean(), "{}", report);
            assert!(report.leftovers.is_empty(), "{:?}", report.leftovers);
            assert_eq!(report.handshakes["waddr"], report.handshakes["wrsp"]);
            assert!(report.handshakes["rdata"] >= report.handshakes["raddr"]);
            assert!(report.latencies["write"].count > 0);
        }
    }

    #[test]
    fn corrupted_responses_are_counted() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let config = DvConfig::default();
        let model = SimmemTopModel::with_faults(
            config.codec().unwrap(),
            config.min_delay..=config.max_delay,
            FaultProperties::seeded(0.2, 11).unwrap(),
        );
        let mut bench = TopBench::new(config, model).unwrap();
        let report = bench.run(4, 600).unwrap();
        assert!(report.mismatch_count() > 0);
        assert!(
            report.breakdown.contains_key("wrsp_release")
                || report.breakdown.contains_key("rdata_release")
        );
    }

    #[test]
    fn owed_beats_are_sent_while_draining() {
        let config = DvConfig {
            trailing_cycles: 400,
            ..DvConfig::default()
        };
        let mut bench = TopBench::new(config.clone(), device(&config)).unwrap();
        // Stop right after the first requests so the drain has work left.
        let report = bench.run(9, 20).unwrap();
        assert!(report.is_clean(), "{}", report);
        assert!(report.cycles < 20 + 400);
    }

    #[test]
    fn piled_up_write_addresses_settle_in_order() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let config = DvConfig {
            max_unsent_writes: 4,
            ..DvConfig::default()
        };
        let mut bench = TopBench::new(config.clone(), device(&config)).unwrap();
        for seed in 0..3 {
            let report = bench.run(seed, 1000).unwrap();
            assert!(report.is_clean(), "{}", report);
            assert!(report.leftovers.is_empty(), "{:?}", report.leftovers);
            assert!(bench.deepest_backlog() > 1);
        }
    }
}
