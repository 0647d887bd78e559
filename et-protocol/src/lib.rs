// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! # et-protocol
//!
//! The wire contract shared by the Event Transport broker and its clients:
//! command codes, stable error codes, the connect handshake, mode encodings
//! and the event-header codec.
//!
//! Every integer on the wire is big-endian and 32 bits wide unless a field
//! is explicitly 64 bits. Strings are length-prefixed, NUL-terminated ASCII.
//! Nothing in this crate performs I/O; encoding targets `bytes::BufMut` and
//! decoding reads from `bytes::Buf` so both sides can frame however they
//! like.

pub mod codes;
pub mod error;
pub mod wire;

pub use codes::{
    pack_pri_status, unpack_pri_status, BlockMode, ByteOrder, DataStatus, ErrorCode, FlowMode,
    GetModeCode, ModifyFlags, Priority, RestoreMode, SelectMode,
};
pub use error::{ProtocolError, Result};
pub use wire::{ConnectReply, ConnectRequest, EventHeader};

/// Magic word opening the connect handshake ("ETev").
pub const MAGIC: u32 = 0x4554_6576;

/// Protocol version. Client and server versions must match exactly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Length of the per-event control vector and of every station select
/// vector. A system-wide constant: both sides verify agreement during the
/// connect handshake and tear the connection down on mismatch.
pub const SELECT_INTS: usize = 6;

/// Name reserved for the root station holding the free event pool.
pub const GRAND_CENTRAL: &str = "GRAND_CENTRAL";

/// Position sentinel: append at the end of the main line (or of a parallel
/// group when used as a parallel position).
pub const END: i32 = -1;

/// Parallel-position sentinel: start a new parallel group at the requested
/// main-line position, pushing the current occupants one slot down.
pub const NEW_HEAD: i32 = -2;

/// Owner sentinel on the wire for events held by the system free pool.
pub const SYSTEM_OWNER: i32 = -1;

/// Pid reported by clients that have no meaningful process id.
pub const NO_PID: i32 = -1;

/// Command codes. Grouped by concern; the gaps are reserved.
pub mod cmd {
    /// Shut the connection down and invalidate its attachments.
    pub const CLOSE: u32 = 1;
    /// Liveness probe; answered with 1 while the system is open.
    pub const ALIVE: u32 = 2;
    /// Abort one attachment's blocking get.
    pub const WAKE_ATT: u32 = 3;
    /// Abort every blocking get parked on a station's input list.
    pub const WAKE_ALL: u32 = 4;

    pub const STATION_CREATE_AT: u32 = 100;
    pub const STATION_REMOVE: u32 = 101;
    pub const STATION_SET_POS: u32 = 102;
    pub const STATION_GET_POS: u32 = 103;
    pub const STATION_EXISTS: u32 = 104;
    pub const STATION_ATTACH: u32 = 105;
    pub const STATION_DETACH: u32 = 106;
    pub const STATION_IS_ATTACHED: u32 = 107;

    pub const EVS_NEW_GRP: u32 = 200;
    pub const EVS_GET: u32 = 201;
    pub const EVS_PUT: u32 = 202;
    pub const EVS_DUMP: u32 = 203;

    pub const SYS_DATA: u32 = 300;
    pub const SYS_HISTOGRAM: u32 = 301;
    pub const SYS_STATIONS: u32 = 302;
    pub const SYS_STATIONS_MAX: u32 = 303;
    pub const SYS_ATTACHMENTS: u32 = 304;
    pub const SYS_ATTACHMENTS_MAX: u32 = 305;
    pub const SYS_PROCS: u32 = 306;
    pub const SYS_PROCS_MAX: u32 = 307;
    pub const SYS_TEMPS: u32 = 308;
    pub const SYS_TEMPS_MAX: u32 = 309;
    pub const SYS_HEARTBEAT: u32 = 310;
    pub const SYS_PID: u32 = 311;
}
