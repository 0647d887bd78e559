// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The unit of transport: a fixed-capacity data buffer plus routing
//! metadata. Events are created once at pool creation and recirculate
//! forever; their `id` and `group` never change.

use crate::attachment::AttachId;
use crate::error::{EtError, Result};
use et_protocol::{
    pack_pri_status, unpack_pri_status, ByteOrder, DataStatus, EventHeader, ModifyFlags, Priority,
    SELECT_INTS,
};

/// Stable index of an event within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ev{}", self.0)
    }
}

/// Who holds an event right now. Exactly one holder at any moment: either
/// an attachment or the system (free pool and station lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    System,
    Attachment(AttachId),
}

/// Freshness tag: `New` events come straight from `new_events`; once put
/// they travel as `Used` until recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    New,
    Used,
}

/// A transport event. The buffer capacity is fixed when the pool is built;
/// `length` tracks the valid prefix.
#[derive(Debug)]
pub struct Event {
    id: EventId,
    group: u32,
    data: Vec<u8>,
    length: usize,
    pub priority: Priority,
    pub data_status: DataStatus,
    pub byte_order: ByteOrder,
    pub control: [i32; SELECT_INTS],
    pub owner: Owner,
    pub modify: ModifyFlags,
    pub age: Age,
}

impl Event {
    /// Build a pool event. Called once per id at system start.
    pub fn new(id: EventId, capacity: usize, group: u32) -> Self {
        Self {
            id,
            group,
            data: vec![0u8; capacity],
            length: 0,
            priority: Priority::Low,
            data_status: DataStatus::Ok,
            byte_order: ByteOrder::Big,
            control: [0; SELECT_INTS],
            owner: Owner::System,
            modify: ModifyFlags::Nothing,
            age: Age::New,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    /// The static group partition this event was born into.
    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Set the valid data length. Fails if it exceeds the buffer capacity.
    pub fn set_length(&mut self, length: usize) -> Result<()> {
        if length > self.capacity() {
            return Err(EtError::Error(format!(
                "length {length} exceeds event capacity {}",
                self.capacity()
            )));
        }
        self.length = length;
        Ok(())
    }

    /// The valid prefix of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Mutable access to the whole buffer; pair with `set_length`.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Wire header for this event.
    pub fn to_header(&self) -> EventHeader {
        EventHeader {
            length: self.length as i64,
            mem_size: self.capacity() as i64,
            pri_and_status: pack_pri_status(self.priority, self.data_status),
            id: self.id.0 as i32,
            byte_order: self.byte_order.get_index() as i32,
            control: self.control,
        }
    }

    /// Apply a client-supplied header. The id, group and capacity are
    /// immutable; only length, priority, status, byte order and control are
    /// taken from the wire.
    pub fn apply_header(&mut self, header: &EventHeader) -> Result<()> {
        let (priority, data_status) = unpack_pri_status(header.pri_and_status)?;
        let byte_order = ByteOrder::from_index(header.byte_order as u32).ok_or_else(|| {
            EtError::Error(format!("bad byte order on the wire: {}", header.byte_order))
        })?;
        self.set_length(header.length as usize)?;
        self.priority = priority;
        self.data_status = data_status;
        self.byte_order = byte_order;
        self.control = header.control;
        Ok(())
    }

    /// Reinitialise an event that has come home to the free pool. Identity
    /// (id, group) and the buffer allocation survive; everything else is
    /// scrubbed.
    pub fn recycle(&mut self) {
        self.length = 0;
        self.priority = Priority::Low;
        self.data_status = DataStatus::Ok;
        self.control = [0; SELECT_INTS];
        self.owner = Owner::System;
        self.modify = ModifyFlags::Nothing;
        self.age = Age::New;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_bounded_by_capacity() {
        let mut event = Event::new(EventId(0), 64, 1);
        assert!(event.set_length(64).is_ok());
        assert!(event.set_length(65).is_err());
        assert_eq!(event.length(), 64);
    }

    #[test]
    fn header_round_trip_preserves_identity() {
        let mut event = Event::new(EventId(9), 128, 2);
        event.priority = Priority::High;
        event.data_status = DataStatus::PossiblyCorrupt;
        event.control = [5, 0, 0, 0, 0, -1];
        event.set_length(17).unwrap();

        let mut header = event.to_header();
        assert_eq!(header.id, 9);
        assert_eq!(header.length, 17);

        // A client must not be able to change our capacity through mem_size.
        header.mem_size = 4096;
        header.length = 100;
        let mut other = Event::new(EventId(9), 128, 2);
        other.apply_header(&header).unwrap();
        assert_eq!(other.capacity(), 128);
        assert_eq!(other.length(), 100);
        assert_eq!(other.priority, Priority::High);
        assert_eq!(other.control, event.control);
    }

    #[test]
    fn recycle_scrubs_transient_state() {
        let mut event = Event::new(EventId(3), 32, 7);
        event.priority = Priority::High;
        event.owner = Owner::Attachment(AttachId(4));
        event.modify = ModifyFlags::HeaderAndData;
        event.age = Age::Used;
        event.set_length(10).unwrap();

        event.recycle();
        assert_eq!(event.group(), 7);
        assert_eq!(event.length(), 0);
        assert_eq!(event.priority, Priority::Low);
        assert_eq!(event.owner, Owner::System);
        assert_eq!(event.age, Age::New);
    }
}
