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

//! An idealized downstream memory.
//!
//! It never blocks requests and answers as soon as it can. Write responses
//! wait for their burst of write data: every write address registers an
//! obligation for `burst_len` data units, and obligations are settled
//! oldest first, across keys, out of a pool of banked units.

use fields::{low_mask, AxiCodec, ReadAddress, ReadData, WriteAddress, WriteData, WriteResponse};
use std::collections::{BTreeMap, VecDeque};

use crate::keyed::KeyedQueues;
use crate::{Error, Key};

/// Write data units still owed to a write address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Obligation {
    pub key: Key,
    pub required_units: u64,
}

#[derive(Clone, Debug)]
pub struct RealEndpoint {
    codec: AxiCodec,
    spare_units: u64,
    obligations: VecDeque<Obligation>,
    write_responses: KeyedQueues<WriteResponse>,
    /// Per key, how many queued write responses have their data.
    releasable: BTreeMap<Key, usize>,
    read_data: KeyedQueues<ReadData>,
    accepted_units: u64,
    settled_units: u64,
}

impl RealEndpoint {
    pub fn new(codec: AxiCodec) -> Self {
        Self {
            codec,
            spare_units: 0,
            obligations: VecDeque::new(),
            write_responses: KeyedQueues::new(),
            releasable: BTreeMap::new(),
            read_data: KeyedQueues::new(),
            accepted_units: 0,
            settled_units: 0,
        }
    }

    /// The response the memory gives to `waddr`. The response code carries
    /// the low bits of the packed request above the identifier.
    pub fn write_response_for(&self, waddr: &WriteAddress) -> WriteResponse {
        let dims = self.codec.dimensions();
        WriteResponse {
            id: waddr.id,
            rsp: (self.codec.pack(waddr) >> dims.id_width) & low_mask(dims.rsp_width),
            user: 0,
        }
    }

    /// The `burst_len + 1` beats the memory returns for `raddr`.
    pub fn read_data_for(&self, raddr: &ReadAddress) -> Vec<ReadData> {
        let data_mask = low_mask(self.codec.dimensions().data_width);
        (0..=raddr.burst_len)
            .map(|i| ReadData {
                id: raddr.id,
                data: raddr.addr.wrapping_add(i) & data_mask,
                rsp: 0,
                last: (i == raddr.burst_len) as u64,
                user: 0,
            })
            .collect()
    }

    pub fn accept_waddr(&mut self, waddr: &WriteAddress) {
        let key = waddr.id as Key;
        self.write_responses.push(key, self.write_response_for(waddr));
        let obligation = Obligation {
            key,
            required_units: waddr.burst_len,
        };
        if self.obligations.is_empty() && self.spare_units >= obligation.required_units {
            self.settle(obligation);
        } else {
            self.obligations.push_back(obligation);
        }
    }

    pub fn accept_wdata(&mut self, _wdata: &WriteData) {
        self.spare_units += 1;
        self.accepted_units += 1;
        while let Some(head) = self.obligations.front().copied() {
            if self.spare_units < head.required_units {
                break;
            }
            self.obligations.pop_front();
            self.settle(head);
        }
    }

    pub fn accept_raddr(&mut self, raddr: &ReadAddress) {
        let key = raddr.id as Key;
        for beat in self.read_data_for(raddr) {
            self.read_data.push(key, beat);
        }
    }

    fn settle(&mut self, obligation: Obligation) {
        self.spare_units -= obligation.required_units;
        self.settled_units += obligation.required_units;
        *self.releasable.entry(obligation.key).or_default() += 1;
        log::debug!(
            "Write obligation of key {} settled with {} units",
            obligation.key,
            obligation.required_units
        );
    }

    /// Lowest-key write response whose data has arrived.
    pub fn peek_write_response(&self) -> Option<&WriteResponse> {
        let key = self.releasable.keys().next()?;
        self.write_responses.front(*key)
    }

    pub fn pop_write_response(&mut self) -> Result<WriteResponse, Error> {
        let key = *self
            .releasable
            .keys()
            .next()
            .ok_or(Error::EmptyQueue("releasable write response"))?;
        let response = self
            .write_responses
            .pop(key)
            .ok_or(Error::EmptyQueue("write response"))?;
        match self.releasable.get_mut(&key) {
            Some(count) if *count > 1 => *count -= 1,
            _ => {
                self.releasable.remove(&key);
            }
        }
        Ok(response)
    }

    /// Lowest-key pending read data beat.
    pub fn peek_read_data(&self) -> Option<&ReadData> {
        let key = self.read_data.keys().next()?;
        self.read_data.front(key)
    }

    pub fn pop_read_data(&mut self) -> Result<ReadData, Error> {
        let key = self
            .read_data
            .keys()
            .next()
            .ok_or(Error::EmptyQueue("read data"))?;
        self.read_data
            .pop(key)
            .ok_or(Error::EmptyQueue("read data"))
    }

    pub fn spare_units(&self) -> u64 {
        self.spare_units
    }

    pub fn obligations(&self) -> impl Iterator<Item = &Obligation> {
        self.obligations.iter()
    }

    /// Write data units still needed to settle every obligation.
    pub fn owed_units(&self) -> u64 {
        let required: u64 = self.obligations.iter().map(|o| o.required_units).sum();
        required.saturating_sub(self.spare_units)
    }

    /// Accepted units not yet matched to an obligation.
    pub fn unmatched_units(&self) -> u64 {
        self.accepted_units - self.settled_units
    }

    pub fn is_idle(&self) -> bool {
        self.obligations.is_empty() && self.write_responses.is_empty() && self.read_data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fields::AxiDimensions;

    fn endpoint() -> RealEndpoint {
        RealEndpoint::new(AxiCodec::new(AxiDimensions::default()).unwrap())
    }

    fn waddr(id: u64, burst_len: u64) -> WriteAddress {
        WriteAddress {
            id,
            addr: 0x40 + id,
            burst_len,
            ..Default::default()
        }
    }

    #[test]
    fn burst_settles_on_last_unit() {
        let mut mem = endpoint();
        mem.accept_waddr(&waddr(1, 4));
        for _ in 0..3 {
            mem.accept_wdata(&WriteData::default());
            assert!(mem.peek_write_response().is_none());
        }
        mem.accept_wdata(&WriteData::default());
        assert_eq!(mem.peek_write_response().map(|r| r.id), Some(1));
        assert_eq!(mem.spare_units(), 0);
        let response = mem.pop_write_response().unwrap();
        assert_eq!(response, mem.write_response_for(&waddr(1, 4)));
        assert!(mem.is_idle());
    }

    #[test]
    fn banked_units_settle_immediately() {
        let mut mem = endpoint();
        for _ in 0..5 {
            mem.accept_wdata(&WriteData::default());
        }
        mem.accept_waddr(&waddr(2, 3));
        assert_eq!(mem.spare_units(), 2);
        assert!(mem.peek_write_response().is_some());
        mem.accept_waddr(&waddr(3, 3));
        assert!(mem.peek_write_response().is_some());
        assert_eq!(mem.obligations().count(), 1);
        assert_eq!(mem.owed_units(), 1);
    }

    #[test]
    fn obligations_settle_oldest_first() {
        let mut mem = endpoint();
        mem.accept_waddr(&waddr(3, 2));
        mem.accept_waddr(&waddr(0, 1));
        mem.accept_wdata(&WriteData::default());
        // Key 0 needs a single unit, but key 3 is older.
        assert!(mem.peek_write_response().is_none());
        mem.accept_wdata(&WriteData::default());
        assert_eq!(mem.peek_write_response().map(|r| r.id), Some(3));
        mem.accept_wdata(&WriteData::default());
        assert_eq!(mem.peek_write_response().map(|r| r.id), Some(0));
        assert_eq!(mem.pop_write_response().unwrap().id, 0);
        assert_eq!(mem.pop_write_response().unwrap().id, 3);
        assert_eq!(
            mem.pop_write_response(),
            Err(Error::EmptyQueue("releasable write response"))
        );
    }

    #[test]
    fn zero_length_burst_needs_no_data() {
        let mut mem = endpoint();
        mem.accept_waddr(&waddr(1, 0));
        assert!(mem.peek_write_response().is_some());
    }

    #[test]
    fn read_bursts() {
        let mut mem = endpoint();
        mem.accept_raddr(&ReadAddress {
            id: 2,
            addr: 0x100,
            burst_len: 2,
            ..Default::default()
        });
        mem.accept_raddr(&ReadAddress {
            id: 1,
            addr: 0x7,
            burst_len: 0,
            ..Default::default()
        });
        let beats: Vec<ReadData> = (0..4).map(|_| mem.pop_read_data().unwrap()).collect();
        assert_eq!(
            beats.iter().map(|b| (b.id, b.data, b.last)).collect::<Vec<_>>(),
            vec![(1, 0x7, 1), (2, 0x100, 0), (2, 0x101, 0), (2, 0x102, 1)]
        );
        assert!(mem.pop_read_data().is_err());
        assert!(mem.is_idle());
    }

    #[test]
    fn credit_conservation() {
        let mut mem = endpoint();
        let bursts = [3u64, 0, 5, 1, 2, 7, 4];
        let mut sent = 0u64;
        for (i, len) in bursts.iter().enumerate() {
            mem.accept_waddr(&waddr((i % 4) as u64, *len));
            for _ in 0..(i % 3) * 2 {
                mem.accept_wdata(&WriteData::default());
                sent += 1;
                let outstanding: u64 = mem.obligations().map(|o| o.required_units).sum();
                assert_eq!(mem.unmatched_units(), mem.spare_units());
                if let Some(head) = mem.obligations().next() {
                    assert!(mem.spare_units() < head.required_units);
                }
                assert_eq!(
                    mem.owed_units(),
                    outstanding.saturating_sub(mem.spare_units())
                );
            }
        }
        let total: u64 = bursts.iter().sum();
        while mem.owed_units() > 0 {
            mem.accept_wdata(&WriteData::default());
            sent += 1;
        }
        assert_eq!(sent, total);
        assert_eq!(mem.spare_units(), 0);
    }
}
