// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! # et-node
//!
//! The Event Transport broker: a shared in-memory event pipeline for
//! data-acquisition systems. Producers draw fixed-size events from the
//! free pool behind the GRAND_CENTRAL station, fill and publish them;
//! conductors route them down a ring of stations by priority and selection
//! rules; consumers attached to stations process and recirculate them.
//!
//! ## Architecture
//!
//! - **EventList**: the priority-preserving queue on each side of a
//!   station, with blocking reads and cooperative wakeup.
//! - **Station / Attachment**: named ring nodes and the reader/writer
//!   identities bound to them.
//! - **Conductor**: the per-station task moving events from output lists
//!   into downstream input lists, honouring parallel-group policies.
//! - **EtSystem**: registry, lifecycle, free-pool bootstrap.
//! - **Server**: the framed TCP front end bridging remote clients onto the
//!   same core operations the in-process API offers.

#[macro_use]
extern crate tracing;

pub mod attachment;
pub mod conductor;
pub mod config;
pub mod error;
pub mod event;
pub mod event_list;
pub mod server;
pub mod station;
pub mod system;

pub use attachment::{AttachId, Attachment, AttachmentStats};
pub use config::SystemConfig;
pub use error::{EtError, Result};
pub use event::{Age, Event, EventId, Owner};
pub use event_list::{EventList, GetMode, ListStats};
pub use server::Server;
pub use station::{Station, StationConfig, StationId, StationStatus, GRAND_CENTRAL_ID};
pub use system::{
    AttachmentSnapshot, EtSystem, ParallelPosition, Position, StationSnapshot, SystemSnapshot,
};
