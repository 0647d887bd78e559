// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Stable integer encodings: error codes, operation modes and the packed
//! priority/data-status word.
//!
//! Each enum maps to and from its wire index explicitly. These values are
//! part of the protocol and must never be renumbered.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Status codes returned at the head of every response. Negative values are
/// failures; `Ok` (0) may be followed by a payload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    Ok,
    Error,
    TooMany,
    Exists,
    WakeUp,
    Timeout,
    Busy,
    Empty,
    Dead,
}

impl ErrorCode {
    pub fn value(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Error => -1,
            Self::TooMany => -2,
            Self::Exists => -3,
            Self::WakeUp => -4,
            Self::Timeout => -5,
            Self::Busy => -6,
            Self::Empty => -7,
            Self::Dead => -8,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            -1 => Some(Self::Error),
            -2 => Some(Self::TooMany),
            -3 => Some(Self::Exists),
            -4 => Some(Self::WakeUp),
            -5 => Some(Self::Timeout),
            -6 => Some(Self::Busy),
            -7 => Some(Self::Empty),
            -8 => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Wait mode of a blocking read, as carried by EVS_GET and EVS_NEW_GRP.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum GetModeCode {
    /// Wait until events arrive or a wakeup is signalled.
    Sleep,
    /// Wait up to the (sec, nsec) bound carried alongside.
    Timed,
    /// Never wait; an empty list fails with `Empty`.
    Async,
}

impl GetModeCode {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::Sleep => 0,
            Self::Timed => 1,
            Self::Async => 2,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Sleep),
            1 => Some(Self::Timed),
            2 => Some(Self::Async),
            _ => None,
        }
    }
}

/// Whether a station sits on the main line or inside a parallel group.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FlowMode {
    Serial,
    Parallel,
}

impl FlowMode {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::Serial => 0,
            Self::Parallel => 1,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Serial),
            1 => Some(Self::Parallel),
            _ => None,
        }
    }
}

/// Input-cue behaviour when the conductor delivers into a full list.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BlockMode {
    /// The cue is advisory; deliveries always land.
    Blocking,
    /// Deliveries beyond the cue overflow and follow the restore mode.
    NonBlocking,
}

impl BlockMode {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::Blocking => 0,
            Self::NonBlocking => 1,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Blocking),
            1 => Some(Self::NonBlocking),
            _ => None,
        }
    }
}

/// How a station decides which events to accept.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SelectMode {
    /// Accept everything, subject to prescale.
    All,
    /// Bitwise match between event control and station select vectors.
    Match,
    /// Parallel-group distribution: rotate over the members.
    RoundRobin,
    /// Parallel-group distribution: least-loaded member wins.
    EqualCue,
    /// Named predicate resolved from the host's registry.
    User,
}

impl SelectMode {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::All => 0,
            Self::Match => 1,
            Self::RoundRobin => 2,
            Self::EqualCue => 3,
            Self::User => 4,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::All),
            1 => Some(Self::Match),
            2 => Some(Self::RoundRobin),
            3 => Some(Self::EqualCue),
            4 => Some(Self::User),
            _ => None,
        }
    }
}

/// Where events go when their holder dies or a non-blocking cue overflows.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RestoreMode {
    /// Back to the owning station's input list, ahead of its peers.
    ToStation,
    /// Back to the free pool at GRAND_CENTRAL.
    ToGrandCentral,
    /// To the upstream station's output list.
    ToInput,
    /// Re-offer to the parallel group for fresh distribution.
    Redistribute,
}

impl RestoreMode {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::ToStation => 0,
            Self::ToGrandCentral => 1,
            Self::ToInput => 2,
            Self::Redistribute => 3,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::ToStation),
            1 => Some(Self::ToGrandCentral),
            2 => Some(Self::ToInput),
            3 => Some(Self::Redistribute),
            _ => None,
        }
    }
}

/// What a client declares it will change on the events it draws. Decides
/// what the server reads back on EVS_PUT.
///
/// On the wire this is a bitmask (bit 0 = header, bit 1 = data); a set data
/// bit supersedes the header bit.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ModifyFlags {
    Nothing,
    HeaderOnly,
    HeaderAndData,
}

impl ModifyFlags {
    pub fn get_bits(&self) -> u32 {
        match self {
            Self::Nothing => 0,
            Self::HeaderOnly => 0x1,
            Self::HeaderAndData => 0x3,
        }
    }

    /// Decode the wire bitmask. Unknown high bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        if bits & 0x2 != 0 {
            Self::HeaderAndData
        } else if bits & 0x1 != 0 {
            Self::HeaderOnly
        } else {
            Self::Nothing
        }
    }
}

/// Two-class event priority.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    Low,
    High,
}

/// Health tag a producer stamps on the event payload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataStatus {
    Ok,
    Corrupt,
    PossiblyCorrupt,
}

impl DataStatus {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Corrupt => 1,
            Self::PossiblyCorrupt => 2,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Ok),
            1 => Some(Self::Corrupt),
            2 => Some(Self::PossiblyCorrupt),
            _ => None,
        }
    }
}

/// Endianness tag carried with event data. Tag only; the broker never
/// translates payloads.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn get_index(&self) -> u32 {
        match self {
            Self::Big => 0,
            Self::Little => 1,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::Big),
            1 => Some(Self::Little),
            _ => None,
        }
    }
}

const PRIORITY_BIT: i32 = 0x01;
const STATUS_SHIFT: i32 = 4;
const STATUS_MASK: i32 = 0x30;

/// Pack priority and data-status into the single `pri_and_status` wire word.
pub fn pack_pri_status(priority: Priority, status: DataStatus) -> i32 {
    let pri = match priority {
        Priority::Low => 0,
        Priority::High => PRIORITY_BIT,
    };
    pri | ((status.get_index() as i32) << STATUS_SHIFT)
}

/// Unpack the `pri_and_status` wire word.
pub fn unpack_pri_status(word: i32) -> Result<(Priority, DataStatus)> {
    let priority = if word & PRIORITY_BIT != 0 {
        Priority::High
    } else {
        Priority::Low
    };
    let status = DataStatus::from_index(((word & STATUS_MASK) >> STATUS_SHIFT) as u32).ok_or(
        ProtocolError::InvalidValue {
            field: "pri_and_status",
            value: word as i64,
        },
    )?;
    Ok((priority, status))
}
