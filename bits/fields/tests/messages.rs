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

use fields::*;

#[track_caller]
fn roundtrip<M: AxiMessage + Eq + std::fmt::Debug>(codec: &AxiCodec, message: M) {
    let packed = codec.pack(&message);
    assert_eq!(codec.unpack::<M>(packed), message, "packed {:#x}", packed);
}

#[test]
fn every_message_roundtrips() {
    let codec = AxiCodec::new(AxiDimensions::default()).unwrap();
    roundtrip(
        &codec,
        WriteAddress {
            id: 3,
            addr: 0x7ffff,
            burst_len: 0xff,
            burst_size: 2,
            burst_type: BurstType::Incr.into(),
            lock_type: 1,
            mem_type: 0xf,
            prot: 0x3,
            qos: 0x9,
            region: 0x6,
            user: 0,
        },
    );
    roundtrip(
        &codec,
        ReadAddress {
            id: 1,
            addr: 0x100,
            burst_len: 2,
            burst_type: BurstType::Wrap.into(),
            region: 0xf,
            ..Default::default()
        },
    );
    roundtrip(
        &codec,
        WriteData {
            data: 0xdead_beef,
            strb: 0xf,
            last: 1,
            user: 0,
        },
    );
    roundtrip(
        &codec,
        ReadData {
            id: 2,
            data: 0xcafe,
            rsp: 4,
            last: 1,
            user: 0,
        },
    );
    roundtrip(&codec, WriteResponse { id: 1, rsp: 7, user: 0 });
}

#[test]
fn wide_identifiers() {
    let dims = AxiDimensions {
        id_width: 4,
        data_user_width: 2,
        ..Default::default()
    };
    let codec = AxiCodec::new(dims).unwrap();
    roundtrip(
        &codec,
        ReadData {
            id: 0xc,
            data: 1,
            rsp: 0,
            last: 0,
            user: 3,
        },
    );
    assert_eq!(codec.layout::<WriteResponse>().width(), 7);
}

#[test]
fn user_fields_vanish_at_zero_width() {
    let codec = AxiCodec::new(AxiDimensions::default()).unwrap();
    let wrsp = WriteResponse {
        id: 1,
        rsp: 2,
        user: 0x3f,
    };
    let back: WriteResponse = codec.unpack(codec.pack(&wrsp));
    assert_eq!(back.user, 0);
    assert_eq!((back.id, back.rsp), (1, 2));
}
