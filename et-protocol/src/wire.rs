// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Frame-level codec: the connect handshake, the event wire header and the
//! checked `Buf`/`BufMut` primitives the server builds its request decoding
//! on.

use crate::error::{ProtocolError, Result};
use crate::{MAGIC, PROTOCOL_VERSION, SELECT_INTS};
use bytes::{Buf, BufMut};

/// Size in bytes of the event wire header: length and mem_size as i64, five
/// i32 words, then the control vector.
pub const EVENT_HEADER_BYTES: usize = 8 + 8 + 4 * 5 + 4 * SELECT_INTS;

/// Size in bytes of the connect request.
pub const CONNECT_REQUEST_BYTES: usize = 12;

/// Size in bytes of the connect reply.
pub const CONNECT_REPLY_BYTES: usize = 4 * 5 + 8;

/// Read a big-endian u32, failing on underflow.
pub fn get_u32(buf: &mut impl Buf, context: &'static str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4 - buf.remaining(),
            context,
        });
    }
    Ok(buf.get_u32())
}

/// Read a big-endian i32, failing on underflow.
pub fn get_i32(buf: &mut impl Buf, context: &'static str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4 - buf.remaining(),
            context,
        });
    }
    Ok(buf.get_i32())
}

/// Read a big-endian i64, failing on underflow.
pub fn get_i64(buf: &mut impl Buf, context: &'static str) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(ProtocolError::Truncated {
            needed: 8 - buf.remaining(),
            context,
        });
    }
    Ok(buf.get_i64())
}

/// Read `len` raw bytes, failing on underflow.
pub fn get_bytes(buf: &mut impl Buf, len: usize, context: &'static str) -> Result<Vec<u8>> {
    if buf.remaining() < len {
        return Err(ProtocolError::Truncated {
            needed: len - buf.remaining(),
            context,
        });
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Read a NUL-terminated ASCII string whose total length (terminator
/// included) was carried in a preceding length field.
pub fn get_string(buf: &mut impl Buf, len: usize, context: &'static str) -> Result<String> {
    let raw = get_bytes(buf, len, context)?;
    let without_nul = match raw.split_last() {
        Some((0, head)) => head,
        _ => return Err(ProtocolError::BadString(context)),
    };
    if !without_nul.is_ascii() || without_nul.contains(&0) {
        return Err(ProtocolError::BadString(context));
    }
    String::from_utf8(without_nul.to_vec()).map_err(|_| ProtocolError::BadString(context))
}

/// Append a string as NUL-terminated bytes. Returns the on-wire length
/// (terminator included) for the caller's length-prefix field.
pub fn put_string(buf: &mut impl BufMut, value: &str) -> u32 {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
    value.len() as u32 + 1
}

/// Opening frame of every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub magic: u32,
    pub version: u32,
    pub select_ints: u32,
}

impl ConnectRequest {
    /// Handshake frame a conforming client sends.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            select_ints: SELECT_INTS as u32,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.magic);
        buf.put_u32(self.version);
        buf.put_u32(self.select_ints);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            magic: get_u32(buf, "connect magic")?,
            version: get_u32(buf, "connect version")?,
            select_ints: get_u32(buf, "connect select_ints")?,
        })
    }

    /// Check the handshake against our own constants.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ProtocolError::BadMagic(self.magic));
        }
        if self.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                ours: PROTOCOL_VERSION,
                theirs: self.version,
            });
        }
        if self.select_ints as usize != SELECT_INTS {
            return Err(ProtocolError::SelectLengthMismatch {
                ours: SELECT_INTS,
                theirs: self.select_ints as usize,
            });
        }
        Ok(())
    }
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Server's answer to the connect handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReply {
    pub err: i32,
    /// 0 = big, 1 = little; the server's native data order.
    pub endian: i32,
    pub num_events: i32,
    pub event_size: i64,
    pub version: i32,
    pub select_ints: i32,
}

impl ConnectReply {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.err);
        buf.put_i32(self.endian);
        buf.put_i32(self.num_events);
        buf.put_i64(self.event_size);
        buf.put_i32(self.version);
        buf.put_i32(self.select_ints);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            err: get_i32(buf, "connect reply err")?,
            endian: get_i32(buf, "connect reply endian")?,
            num_events: get_i32(buf, "connect reply num_events")?,
            event_size: get_i64(buf, "connect reply event_size")?,
            version: get_i32(buf, "connect reply version")?,
            select_ints: get_i32(buf, "connect reply select_ints")?,
        })
    }
}

/// The fixed event header exchanged on EVS_GET and EVS_PUT. Two words are
/// reserved for native hosts and always travel as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub length: i64,
    pub mem_size: i64,
    pub pri_and_status: i32,
    pub id: i32,
    pub byte_order: i32,
    pub control: [i32; SELECT_INTS],
}

impl EventHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.length);
        buf.put_i64(self.mem_size);
        buf.put_i32(self.pri_and_status);
        buf.put_i32(self.id);
        buf.put_i32(0);
        buf.put_i32(self.byte_order);
        buf.put_i32(0);
        for word in &self.control {
            buf.put_i32(*word);
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        let length = get_i64(buf, "event length")?;
        let mem_size = get_i64(buf, "event mem_size")?;
        let pri_and_status = get_i32(buf, "event pri_and_status")?;
        let id = get_i32(buf, "event id")?;
        let _reserved = get_i32(buf, "event reserved")?;
        let byte_order = get_i32(buf, "event byte_order")?;
        let _reserved = get_i32(buf, "event reserved")?;
        let mut control = [0i32; SELECT_INTS];
        for word in control.iter_mut() {
            *word = get_i32(buf, "event control")?;
        }
        if length < 0 || mem_size < 0 || length > mem_size {
            return Err(ProtocolError::InvalidValue {
                field: "event length",
                value: length,
            });
        }
        Ok(Self {
            length,
            mem_size,
            pri_and_status,
            id,
            byte_order,
            control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn connect_round_trip() {
        let req = ConnectRequest::new();
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        assert_eq!(buf.len(), CONNECT_REQUEST_BYTES);
        let decoded = ConnectRequest::decode(&mut buf).unwrap();
        assert_eq!(decoded, req);
        decoded.validate().unwrap();
    }

    #[test]
    fn connect_validation_rejects_mismatches() {
        let mut req = ConnectRequest::new();
        req.magic = 0xdead_beef;
        assert!(matches!(
            req.validate(),
            Err(ProtocolError::BadMagic(0xdead_beef))
        ));

        let mut req = ConnectRequest::new();
        req.version += 1;
        assert!(matches!(
            req.validate(),
            Err(ProtocolError::VersionMismatch { .. })
        ));

        let mut req = ConnectRequest::new();
        req.select_ints = 4;
        assert!(matches!(
            req.validate(),
            Err(ProtocolError::SelectLengthMismatch { .. })
        ));
    }

    #[test]
    fn event_header_round_trip() {
        let header = EventHeader {
            length: 48,
            mem_size: 128,
            pri_and_status: 0x11,
            id: 7,
            byte_order: 0,
            control: [1, 0, -3, 0, 0, 9],
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), EVENT_HEADER_BYTES);
        assert_eq!(EventHeader::decode(&mut buf).unwrap(), header);
    }

    #[test]
    fn event_header_rejects_oversize_length() {
        let header = EventHeader {
            length: 256,
            mem_size: 128,
            pri_and_status: 0,
            id: 0,
            byte_order: 0,
            control: [0; SELECT_INTS],
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert!(EventHeader::decode(&mut buf).is_err());
    }

    #[test]
    fn strings_are_nul_terminated() {
        let mut buf = BytesMut::new();
        let len = put_string(&mut buf, "GRAND_CENTRAL");
        assert_eq!(len as usize, "GRAND_CENTRAL".len() + 1);
        let s = get_string(&mut buf, len as usize, "station name").unwrap();
        assert_eq!(s, "GRAND_CENTRAL");
    }

    #[test]
    fn truncated_reads_fail() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        assert!(get_u32(&mut (&buf[..]), "short").is_err());
    }
}
