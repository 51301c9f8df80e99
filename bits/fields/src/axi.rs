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

//! AXI-style messages carried on the five channels of the reordering buffer.
//!
//! Each message packs its fields least significant first, in declaration
//! order, so the identifier always occupies the low bits of the address,
//! read data and write response words.

use crate::{FieldLayout, LayoutError};
use serde::{Deserialize, Serialize};

/// Bit widths of every AXI field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxiDimensions {
    pub id_width: usize,
    pub addr_width: usize,
    pub burst_len_width: usize,
    pub burst_size_width: usize,
    pub burst_type_width: usize,
    pub lock_width: usize,
    pub cache_width: usize,
    pub prot_width: usize,
    pub qos_width: usize,
    pub region_width: usize,
    pub addr_user_width: usize,
    pub data_width: usize,
    pub strb_width: usize,
    pub last_width: usize,
    pub data_user_width: usize,
    pub rsp_width: usize,
    pub rsp_user_width: usize,
}

impl Default for AxiDimensions {
    fn default() -> Self {
        Self {
            id_width: 2,
            addr_width: 19,
            burst_len_width: 8,
            burst_size_width: 3,
            burst_type_width: 2,
            lock_width: 2,
            cache_width: 4,
            prot_width: 4,
            qos_width: 4,
            region_width: 4,
            addr_user_width: 0,
            data_width: 32,
            strb_width: 4,
            last_width: 1,
            data_user_width: 0,
            rsp_width: 3,
            rsp_user_width: 0,
        }
    }
}

impl AxiDimensions {
    fn address_widths(&self) -> Vec<usize> {
        vec![
            self.id_width,
            self.addr_width,
            self.burst_len_width,
            self.burst_size_width,
            self.burst_type_width,
            self.lock_width,
            self.cache_width,
            self.prot_width,
            self.qos_width,
            self.region_width,
            self.addr_user_width,
        ]
    }

    fn write_data_widths(&self) -> Vec<usize> {
        vec![
            self.data_width,
            self.strb_width,
            self.last_width,
            self.data_user_width,
        ]
    }

    fn read_data_widths(&self) -> Vec<usize> {
        vec![
            self.id_width,
            self.data_width,
            self.rsp_width,
            self.last_width,
            self.data_user_width,
        ]
    }

    fn write_response_widths(&self) -> Vec<usize> {
        vec![self.id_width, self.rsp_width, self.rsp_user_width]
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BurstType {
    Fixed = 0,
    Incr = 1,
    Wrap = 2,
    Reserved = 3,
}

impl BurstType {
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Self::Fixed,
            1 => Self::Incr,
            2 => Self::Wrap,
            _ => Self::Reserved,
        }
    }
}

impl From<BurstType> for u64 {
    fn from(burst: BurstType) -> u64 {
        burst as u64
    }
}

/// A message that the codec knows how to lay out.
pub trait AxiMessage: Sized {
    fn layout(codec: &AxiCodec) -> &FieldLayout;
    fn to_fields(&self) -> Vec<u64>;
    fn from_fields(fields: &[u64]) -> Self;
}

macro_rules! address_message {
    ($(#[$meta:meta])* $name:ident, $layout:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
        pub struct $name {
            pub id: u64,
            pub addr: u64,
            pub burst_len: u64,
            pub burst_size: u64,
            pub burst_type: u64,
            pub lock_type: u64,
            pub mem_type: u64,
            pub prot: u64,
            pub qos: u64,
            pub region: u64,
            pub user: u64,
        }

        impl AxiMessage for $name {
            fn layout(codec: &AxiCodec) -> &FieldLayout {
                &codec.$layout
            }

            fn to_fields(&self) -> Vec<u64> {
                vec![
                    self.id,
                    self.addr,
                    self.burst_len,
                    self.burst_size,
                    self.burst_type,
                    self.lock_type,
                    self.mem_type,
                    self.prot,
                    self.qos,
                    self.region,
                    self.user,
                ]
            }

            fn from_fields(fields: &[u64]) -> Self {
                Self {
                    id: fields[0],
                    addr: fields[1],
                    burst_len: fields[2],
                    burst_size: fields[3],
                    burst_type: fields[4],
                    lock_type: fields[5],
                    mem_type: fields[6],
                    prot: fields[7],
                    qos: fields[8],
                    region: fields[9],
                    user: fields[10],
                }
            }
        }
    };
}

address_message!(
    /// Write address request (AW channel).
    WriteAddress,
    write_address
);
address_message!(
    /// Read address request (AR channel).
    ReadAddress,
    read_address
);

/// One write data beat (W channel). Carries no identifier.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct WriteData {
    pub data: u64,
    pub strb: u64,
    pub last: u64,
    pub user: u64,
}

impl AxiMessage for WriteData {
    fn layout(codec: &AxiCodec) -> &FieldLayout {
        &codec.write_data
    }

    fn to_fields(&self) -> Vec<u64> {
        vec![self.data, self.strb, self.last, self.user]
    }

    fn from_fields(fields: &[u64]) -> Self {
        Self {
            data: fields[0],
            strb: fields[1],
            last: fields[2],
            user: fields[3],
        }
    }
}

/// One read data beat (R channel).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ReadData {
    pub id: u64,
    pub data: u64,
    pub rsp: u64,
    pub last: u64,
    pub user: u64,
}

impl AxiMessage for ReadData {
    fn layout(codec: &AxiCodec) -> &FieldLayout {
        &codec.read_data
    }

    fn to_fields(&self) -> Vec<u64> {
        vec![self.id, self.data, self.rsp, self.last, self.user]
    }

    fn from_fields(fields: &[u64]) -> Self {
        Self {
            id: fields[0],
            data: fields[1],
            rsp: fields[2],
            last: fields[3],
            user: fields[4],
        }
    }
}

/// Write response (B channel).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct WriteResponse {
    pub id: u64,
    pub rsp: u64,
    pub user: u64,
}

impl AxiMessage for WriteResponse {
    fn layout(codec: &AxiCodec) -> &FieldLayout {
        &codec.write_response
    }

    fn to_fields(&self) -> Vec<u64> {
        vec![self.id, self.rsp, self.user]
    }

    fn from_fields(fields: &[u64]) -> Self {
        Self {
            id: fields[0],
            rsp: fields[1],
            user: fields[2],
        }
    }
}

/// Packs and unpacks every message kind for one set of dimensions.
#[derive(Clone, Debug)]
pub struct AxiCodec {
    dims: AxiDimensions,
    write_address: FieldLayout,
    read_address: FieldLayout,
    write_data: FieldLayout,
    read_data: FieldLayout,
    write_response: FieldLayout,
}

impl AxiCodec {
    pub fn new(dims: AxiDimensions) -> Result<Self, LayoutError> {
        Ok(Self {
            dims,
            write_address: FieldLayout::from_widths(&dims.address_widths())?,
            read_address: FieldLayout::from_widths(&dims.address_widths())?,
            write_data: FieldLayout::from_widths(&dims.write_data_widths())?,
            read_data: FieldLayout::from_widths(&dims.read_data_widths())?,
            write_response: FieldLayout::from_widths(&dims.write_response_widths())?,
        })
    }

    pub fn dimensions(&self) -> &AxiDimensions {
        &self.dims
    }

    pub fn layout<M: AxiMessage>(&self) -> &FieldLayout {
        M::layout(self)
    }

    pub fn pack<M: AxiMessage>(&self, message: &M) -> u64 {
        M::layout(self).pack(&message.to_fields())
    }

    pub fn unpack<M: AxiMessage>(&self, packed: u64) -> M {
        M::from_fields(&M::layout(self).unpack(packed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_roundtrips;

    fn codec() -> AxiCodec {
        AxiCodec::new(AxiDimensions::default()).unwrap()
    }

    #[test]
    fn default_widths() {
        let codec = codec();
        assert_eq!(codec.layout::<WriteAddress>().width(), 52);
        assert_eq!(codec.layout::<ReadAddress>().width(), 52);
        assert_eq!(codec.layout::<WriteData>().width(), 37);
        assert_eq!(codec.layout::<ReadData>().width(), 38);
        assert_eq!(codec.layout::<WriteResponse>().width(), 5);
    }

    #[test]
    fn layouts_roundtrip() {
        let codec = codec();
        test_roundtrips(codec.layout::<WriteAddress>());
        test_roundtrips(codec.layout::<WriteData>());
        test_roundtrips(codec.layout::<ReadData>());
        test_roundtrips(codec.layout::<WriteResponse>());
    }

    #[test]
    fn region_is_independent_of_qos() {
        let codec = codec();
        let raddr = ReadAddress {
            id: 1,
            addr: 0x1234,
            burst_len: 2,
            qos: 0x5,
            region: 0xa,
            ..Default::default()
        };
        let unpacked: ReadAddress = codec.unpack(codec.pack(&raddr));
        assert_eq!(unpacked, raddr);
        assert_eq!(unpacked.region, 0xa);
    }

    #[test]
    fn id_sits_in_low_bits() {
        let codec = codec();
        let wrsp = WriteResponse {
            id: 3,
            rsp: 0b101,
            user: 0,
        };
        assert_eq!(codec.pack(&wrsp), 0b101_11);

        let waddr = WriteAddress {
            id: 2,
            addr: 1,
            ..Default::default()
        };
        assert_eq!(codec.pack(&waddr), 0b1_10);
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let dims = AxiDimensions {
            addr_width: 48,
            ..Default::default()
        };
        assert!(AxiCodec::new(dims).is_err());
    }

    #[test]
    fn burst_type_decoding() {
        assert_eq!(BurstType::from_bits(1), BurstType::Incr);
        assert_eq!(BurstType::from_bits(0b110), BurstType::Wrap);
        assert_eq!(u64::from(BurstType::Reserved), 3);
    }
}
