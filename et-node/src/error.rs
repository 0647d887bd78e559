// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Error types for the et-node crate.

use et_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Result type used throughout et-node.
pub type Result<T> = std::result::Result<T, EtError>;

/// Failures of broker operations. The first nine variants map one-to-one
/// onto the stable wire codes; `Io` and `Protocol` never cross the wire,
/// they tear the offending connection down instead.
#[derive(Debug, Error)]
pub enum EtError {
    /// Catch-all operational failure.
    #[error("operation failed: {0}")]
    Error(String),

    /// A configured limit (stations, attachments, user mode) was hit.
    #[error("limit reached: {0}")]
    TooMany(String),

    /// A station of the same name but different configuration exists.
    #[error("station exists with a different configuration: {0}")]
    Exists(String),

    /// A blocking get was aborted by a wakeup signal.
    #[error("woken up while waiting")]
    WakeUp,

    /// A timed get expired with the list still empty.
    #[error("timed out while waiting")]
    Timeout,

    /// The object is busy and cannot be mutated now.
    #[error("busy: {0}")]
    Busy(String),

    /// An async get found the list empty.
    #[error("list is empty")]
    Empty,

    /// The system is closed, or the referenced object no longer exists.
    #[error("dead: {0}")]
    Dead(String),

    /// Socket failure on the data plane.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-level framing violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl EtError {
    /// The stable code this failure travels as. `Io`/`Protocol` fall back to
    /// the generic code; callers tear the connection down before encoding
    /// them.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Error(_) | Self::Io(_) | Self::Protocol(_) => ErrorCode::Error,
            Self::TooMany(_) => ErrorCode::TooMany,
            Self::Exists(_) => ErrorCode::Exists,
            Self::WakeUp => ErrorCode::WakeUp,
            Self::Timeout => ErrorCode::Timeout,
            Self::Busy(_) => ErrorCode::Busy,
            Self::Empty => ErrorCode::Empty,
            Self::Dead(_) => ErrorCode::Dead,
        }
    }
}
