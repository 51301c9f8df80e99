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

use fields::LayoutError;
use std::fmt;

use crate::{Cycle, Key};

/// Failures that abort a run.
///
/// Device misbehavior is never reported through this type; it is counted
/// by the comparator instead. Everything here is either a stimulus bug
/// (a broken precondition), an oracle bug (an exhausted structure) or an
/// unusable configuration.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    KeyOutOfRange { key: Key, capacity: usize },
    KeyBusy(Key),
    NotReleasable(Key),
    ZeroDelay(Key),
    TimeReversed { now: Cycle, requested: Cycle },
    ReservationsExhausted(Key),
    Unreserved(Key),
    EmptyQueue(&'static str),
    InvalidConfig(String),
    InvalidLayout(LayoutError),
}

impl Error {
    /// Precondition violations are bugs in whoever drives the oracle.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::KeyOutOfRange { .. }
                | Self::KeyBusy(_)
                | Self::NotReleasable(_)
                | Self::ZeroDelay(_)
                | Self::TimeReversed { .. }
                | Self::ReservationsExhausted(_)
                | Self::Unreserved(_)
        )
    }

    /// Exhaustion means the oracle itself lost track of its state.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::EmptyQueue(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::KeyOutOfRange { key, capacity } => {
                write!(f, "ERROR: key {} outside capacity {}", key, capacity)
            }
            Self::KeyBusy(key) => write!(f, "ERROR: key {} is still pending or releasable", key),
            Self::NotReleasable(key) => write!(f, "ERROR: key {} is not releasable", key),
            Self::ZeroDelay(key) => write!(f, "ERROR: key {} admitted with a zero delay", key),
            Self::TimeReversed { now, requested } => write!(
                f,
                "ERROR: cannot move time back from {} to {}",
                now, requested
            ),
            Self::ReservationsExhausted(key) => {
                write!(f, "ERROR: no reservation slot left for key {}", key)
            }
            Self::Unreserved(key) => {
                write!(f, "ERROR: input for key {} without a reserved slot", key)
            }
            Self::EmptyQueue(what) => write!(f, "ERROR: {} queue exhausted", what),
            Self::InvalidConfig(why) => write!(f, "ERROR: invalid configuration: {}", why),
            Self::InvalidLayout(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidLayout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LayoutError> for Error {
    fn from(e: LayoutError) -> Self {
        Self::InvalidLayout(e)
    }
}
