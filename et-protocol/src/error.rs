// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Error types for the et-protocol crate.

use thiserror::Error;

/// Result type used throughout et-protocol.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Faults in the wire encoding itself. Any of these on a live connection is
/// fatal to that connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before the advertised payload did.
    #[error("truncated frame: needed {needed} more bytes while decoding {context}")]
    Truncated {
        /// Bytes missing from the buffer.
        needed: usize,
        /// What was being decoded.
        context: &'static str,
    },

    /// A field carried a value outside its encoding.
    #[error("invalid {field} value on the wire: {value}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// The offending raw value.
        value: i64,
    },

    /// The opening handshake did not start with the magic word.
    #[error("bad magic word: {0:#010x}")]
    BadMagic(u32),

    /// Client and server protocol versions differ.
    #[error("version mismatch: ours {ours}, theirs {theirs}")]
    VersionMismatch {
        /// Local protocol version.
        ours: u32,
        /// Remote protocol version.
        theirs: u32,
    },

    /// Client and server disagree on the select-vector length.
    #[error("select-vector length mismatch: ours {ours}, theirs {theirs}")]
    SelectLengthMismatch {
        /// Local select-vector length.
        ours: usize,
        /// Remote select-vector length.
        theirs: usize,
    },

    /// A length-prefixed string was not valid NUL-terminated ASCII.
    #[error("malformed string field: {0}")]
    BadString(&'static str),

    /// An unknown command code was received.
    #[error("unknown command code: {0}")]
    UnknownCommand(u32),
}
