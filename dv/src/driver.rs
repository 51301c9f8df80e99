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

use std::fmt;

/// The five AXI channels.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Channel {
    WriteAddress,
    WriteData,
    ReadAddress,
    WriteResponse,
    ReadData,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::WriteAddress,
        Channel::WriteData,
        Channel::ReadAddress,
        Channel::WriteResponse,
        Channel::ReadData,
    ];

    /// Requests flow from the requester towards memory, responses back.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Channel::WriteAddress | Channel::WriteData | Channel::ReadAddress
        )
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Channel::WriteAddress => "waddr",
            Channel::WriteData => "wdata",
            Channel::ReadAddress => "raddr",
            Channel::WriteResponse => "wrsp",
            Channel::ReadData => "rdata",
        }
    }
}

/// A valid/ready handshake port on the device.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Port {
    /// Delay bank: identifier to hold, with its delay on `Signal::AdmitDelay`.
    Admission,
    /// Response bank: one-hot identifier to reserve a slot for.
    Reservation,
    /// Response bank: payload entering a reserved slot.
    ResponseIn,
    /// Response bank: released payload.
    ResponseOut,
    /// Buffer side facing the requester.
    Requester(Channel),
    /// Buffer side facing the downstream memory.
    Memory(Channel),
}

impl Port {
    /// Whether the device drives data and valid on this port.
    pub fn device_sends(&self) -> bool {
        match self {
            Port::Admission | Port::Reservation | Port::ResponseIn => false,
            Port::ResponseOut => true,
            Port::Requester(channel) => !channel.is_request(),
            Port::Memory(channel) => channel.is_request(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Port::Admission => write!(f, "admission"),
            Port::Reservation => write!(f, "reservation"),
            Port::ResponseIn => write!(f, "rsp_in"),
            Port::ResponseOut => write!(f, "rsp_out"),
            Port::Requester(channel) => write!(f, "{}_req", channel.short_name()),
            Port::Memory(channel) => write!(f, "{}_mem", channel.short_name()),
        }
    }
}

/// One named wire bundle of the device under test.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Signal {
    Data(Port),
    Valid(Port),
    Ready(Port),
    /// Delay bank: cycles to hold the admitted identifier.
    AdmitDelay,
    /// Response bank: burst length attached to a reservation.
    ReservationBurstLen,
    /// Delay bank: one-hot identifier drained this cycle.
    ReleasedOnehot,
    /// Delay bank: mask of releasable identifiers.
    Releasable,
    /// Response bank: mask of identifiers allowed to release.
    ReleaseEnable,
}

impl Signal {
    /// Whether the device drives this signal.
    pub fn is_output(&self) -> bool {
        match self {
            Signal::Data(port) | Signal::Valid(port) => port.device_sends(),
            Signal::Ready(port) => !port.device_sends(),
            Signal::Releasable => true,
            Signal::AdmitDelay
            | Signal::ReservationBurstLen
            | Signal::ReleasedOnehot
            | Signal::ReleaseEnable => false,
        }
    }

    /// Single-bit control wires.
    pub fn is_flag(&self) -> bool {
        matches!(self, Signal::Valid(_) | Signal::Ready(_))
    }

    /// The valid/data/ready bundle of a port.
    pub fn handshake(port: Port) -> [Signal; 3] {
        [Signal::Data(port), Signal::Valid(port), Signal::Ready(port)]
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Signal::Data(port) => write!(f, "{}_data", port),
            Signal::Valid(port) => write!(f, "{}_valid", port),
            Signal::Ready(port) => write!(f, "{}_ready", port),
            Signal::AdmitDelay => write!(f, "admit_delay"),
            Signal::ReservationBurstLen => write!(f, "reservation_burst_len"),
            Signal::ReleasedOnehot => write!(f, "released_onehot"),
            Signal::Releasable => write!(f, "releasable"),
            Signal::ReleaseEnable => write!(f, "release_enable"),
        }
    }
}

/// Clocked access to a device under test.
///
/// Inputs hold their asserted value until asserted again. Outputs are read
/// combinationally: they reflect the state committed by the last clock edge
/// and the inputs asserted since.
pub trait CycleDriver {
    /// Signals the device exposes.
    fn signals(&self) -> Vec<Signal>;

    /// Returns the device to its reset state and clears all inputs.
    fn reset(&mut self);

    fn assert_signal(&mut self, signal: Signal, value: u64);

    fn read_signal(&mut self, signal: Signal) -> u64;

    /// Commits one rising clock edge.
    fn advance_clock(&mut self);

    /// Whether the device reports nothing in flight. Devices that cannot
    /// tell always answer false, which only disables early drain exit.
    fn is_idle(&self) -> bool {
        false
    }

    fn read_flag(&mut self, signal: Signal) -> bool {
        self.read_signal(signal) != 0
    }
}

impl<D: CycleDriver + ?Sized> CycleDriver for Box<D> {
    fn signals(&self) -> Vec<Signal> {
        (**self).signals()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn assert_signal(&mut self, signal: Signal, value: u64) {
        (**self).assert_signal(signal, value)
    }

    fn read_signal(&mut self, signal: Signal) -> u64 {
        (**self).read_signal(signal)
    }

    fn advance_clock(&mut self) {
        (**self).advance_clock()
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions() {
        assert!(Signal::Ready(Port::Requester(Channel::WriteAddress)).is_output());
        assert!(!Signal::Valid(Port::Requester(Channel::WriteAddress)).is_output());
        assert!(Signal::Valid(Port::Requester(Channel::WriteResponse)).is_output());
        assert!(Signal::Data(Port::Memory(Channel::ReadAddress)).is_output());
        assert!(!Signal::Data(Port::Memory(Channel::ReadData)).is_output());
        assert!(Signal::Ready(Port::Memory(Channel::ReadData)).is_output());
        assert!(Signal::Releasable.is_output());
        assert!(!Signal::ReleaseEnable.is_output());
        assert!(Signal::Data(Port::ResponseOut).is_output());
        assert!(Signal::Ready(Port::Reservation).is_output());
    }

    #[test]
    fn names() {
        assert_eq!(
            Signal::Valid(Port::Requester(Channel::WriteAddress)).to_string(),
            "waddr_req_valid"
        );
        assert_eq!(
            Signal::Data(Port::Memory(Channel::ReadData)).to_string(),
            "rdata_mem_data"
        );
        assert_eq!(Signal::Releasable.to_string(), "releasable");
    }
}
