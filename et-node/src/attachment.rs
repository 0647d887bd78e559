// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! A reader/writer identity bound to one station for its whole lifetime.
//!
//! The attachment carries the cooperative wakeup flag used to abort a
//! blocking get, and the reclaim set: every event the client has drawn and
//! not yet returned. When the client dies the reclaim set is what the
//! restore policy re-homes.

use crate::error::{EtError, Result};
use crate::event::{Event, EventId};
use crate::station::StationId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Monotonically assigned attachment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachId(pub u32);

impl std::fmt::Display for AttachId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "att{}", self.0)
    }
}

/// Per-attachment counters reported by SYS_DATA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentStats {
    pub events_make: u64,
    pub events_get: u64,
    pub events_put: u64,
    pub events_dump: u64,
}

#[derive(Debug)]
pub struct Attachment {
    id: AttachId,
    station_id: StationId,
    host: String,
    pid: i32,
    wake_up: AtomicBool,
    waiting: AtomicBool,
    usable: AtomicBool,
    events_make: AtomicU64,
    events_get: AtomicU64,
    events_put: AtomicU64,
    events_dump: AtomicU64,
    held: Mutex<HashMap<EventId, Event>>,
}

impl Attachment {
    pub fn new(id: AttachId, station_id: StationId, host: String, pid: i32) -> Self {
        Self {
            id,
            station_id,
            host,
            pid,
            wake_up: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            usable: AtomicBool::new(true),
            events_make: AtomicU64::new(0),
            events_get: AtomicU64::new(0),
            events_put: AtomicU64::new(0),
            events_dump: AtomicU64::new(0),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> AttachId {
        self.id
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// One-shot signal telling a parked get to abort with `WakeUp`. The
    /// signal is established before the list is notified, so a get about to
    /// park observes it.
    pub fn signal_wake(&self) {
        self.wake_up.store(true, Ordering::SeqCst);
    }

    /// Consume the wakeup signal.
    pub fn take_wake(&self) -> bool {
        self.wake_up.swap(false, Ordering::SeqCst)
    }

    pub fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }

    /// Whether the attachment is currently parked on its input list.
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Attachments are poisoned on detach and on system close; every
    /// operation checks this first.
    pub fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        self.usable.store(false, Ordering::SeqCst);
    }

    pub fn bump_make(&self, n: u64) {
        self.events_make.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_get(&self, n: u64) {
        self.events_get.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_put(&self, n: u64) {
        self.events_put.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_dump(&self, n: u64) {
        self.events_dump.fetch_add(n, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AttachmentStats {
        AttachmentStats {
            events_make: self.events_make.load(Ordering::Relaxed),
            events_get: self.events_get.load(Ordering::Relaxed),
            events_put: self.events_put.load(Ordering::Relaxed),
            events_dump: self.events_dump.load(Ordering::Relaxed),
        }
    }

    /// Record events as drawn by this attachment.
    pub fn hold(&self, events: Vec<Event>) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        for event in events {
            held.insert(event.id(), event);
        }
    }

    /// Take back specific events the client is returning. Fails if any id
    /// is not actually held here, without releasing anything.
    pub fn release(&self, ids: &[EventId]) -> Result<Vec<Event>> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(missing) = ids.iter().find(|id| !held.contains_key(id)) {
            return Err(EtError::Error(format!(
                "{missing} is not held by {}",
                self.id
            )));
        }
        Ok(ids
            .iter()
            .filter_map(|id| held.remove(id))
            .collect::<Vec<_>>())
    }

    /// Run `f` against one held event, e.g. to fill its buffer or read it
    /// back for the wire.
    pub fn with_held<R>(&self, id: EventId, f: impl FnOnce(&mut Event) -> R) -> Result<R> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        match held.get_mut(&id) {
            Some(event) => Ok(f(event)),
            None => Err(EtError::Error(format!("{id} is not held by {}", self.id))),
        }
    }

    /// Empty the reclaim set, priority order first. Used when the client
    /// disappears.
    pub fn drain_held(&self) -> Vec<Event> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let mut events = held.drain().map(|(_, event)| event).collect::<Vec<_>>();
        events.sort_by_key(|event| (std::cmp::Reverse(event.priority), event.id()));
        events
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use et_protocol::Priority;

    #[test]
    fn wake_signal_is_one_shot() {
        let att = Attachment::new(AttachId(1), StationId(0), "local".into(), -1);
        assert!(!att.take_wake());
        att.signal_wake();
        assert!(att.take_wake());
        assert!(!att.take_wake());
    }

    #[test]
    fn release_is_all_or_nothing() {
        let att = Attachment::new(AttachId(1), StationId(0), "local".into(), -1);
        att.hold(vec![Event::new(EventId(0), 8, 1), Event::new(EventId(1), 8, 1)]);

        let err = att.release(&[EventId(0), EventId(9)]);
        assert!(err.is_err());
        assert_eq!(att.held_count(), 2);

        let events = att.release(&[EventId(1)]).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(att.held_count(), 1);
    }

    #[test]
    fn drain_orders_high_before_low() {
        let att = Attachment::new(AttachId(1), StationId(0), "local".into(), -1);
        let mut high = Event::new(EventId(5), 8, 1);
        high.priority = Priority::High;
        att.hold(vec![Event::new(EventId(2), 8, 1), high]);

        let drained = att.drain_held();
        assert_eq!(drained[0].id(), EventId(5));
        assert_eq!(drained[1].id(), EventId(2));
    }
}
