// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The priority-preserving event queue backing every station's input and
//! output side.
//!
//! Invariant at every observable moment: the queue is a run of high-priority
//! events followed by a run of low-priority events, FIFO within each run.
//! `last_high` tracks the length of the leading high run so user-side `put`
//! can splice without scanning.
//!
//! Blocking reads park on a `tokio::sync::Notify`; the list mutex is never
//! held across an await. Wakeups are cooperative: the signal is established
//! first (attachment flag or the list-wide `wake_all`), then the notify is
//! fired, and the waiter observes the flag and leaves with `WakeUp`. The
//! last waiter out resets `wake_all` so later reads do not fail spuriously.

use crate::attachment::Attachment;
use crate::error::{EtError, Result};
use crate::event::Event;
use et_protocol::Priority;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// How long a read is willing to wait for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMode {
    /// Never park; an empty result fails with `Empty`.
    Async,
    /// Park up to the given bound, then fail with `Timeout`.
    Timed(Duration),
    /// Park until events arrive or a wakeup aborts the read.
    Sleep,
}

/// Counters and gauges exposed through SYS_DATA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListStats {
    pub len: usize,
    pub last_high: usize,
    pub events_try: u64,
    pub events_in: u64,
    pub events_out: u64,
    pub waiting: usize,
    pub wake_all: bool,
}

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<Event>,
    last_high: usize,
    events_try: u64,
    events_in: u64,
    events_out: u64,
    wake_all: bool,
    waiting: usize,
}

impl Inner {
    /// Length of the leading high-priority run, by scan. `last_high` is the
    /// cached form kept exact on output lists; conductor-side inserts scan
    /// instead of trusting it.
    fn leading_high(&self) -> usize {
        self.events
            .iter()
            .take_while(|event| event.priority == Priority::High)
            .count()
    }
}

#[derive(Debug, Default)]
pub struct EventList {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.locked().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().events.is_empty()
    }

    pub fn stats(&self) -> ListStats {
        let g = self.locked();
        ListStats {
            len: g.events.len(),
            last_high: g.last_high,
            events_try: g.events_try,
            events_in: g.events_in,
            events_out: g.events_out,
            waiting: g.waiting,
            wake_all: g.wake_all,
        }
    }

    /// Count one selection attempt (prescale bookkeeping) and return the
    /// running total.
    pub fn bump_try(&self) -> u64 {
        let mut g = self.locked();
        g.events_try += 1;
        g.events_try
    }

    /// Append low-priority events at the tail. Hot conductor path and pool
    /// seeding; the caller guarantees every event is low priority and
    /// serialises with other writers. Does not wake anyone.
    pub fn put_low(&self, events: Vec<Event>) {
        let mut g = self.locked();
        g.events_in += events.len() as u64;
        g.events.extend(events);
    }

    /// Synchronised funnel for user dumps into GRAND_CENTRAL's input list.
    pub fn put_in_gc(&self, events: Vec<Event>) {
        self.put_low(events);
        self.notify.notify_waiters();
    }

    /// Conductor-side insertion into an input list. `events` arrives
    /// pre-sorted with all highs first; highs are spliced after the list's
    /// current high run, lows appended at the tail.
    pub fn put_all(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut g = self.locked();
        g.events_in += events.len() as u64;
        let mut at = g.leading_high();
        for event in events {
            match event.priority {
                Priority::High => {
                    g.events.insert(at, event);
                    at += 1;
                }
                Priority::Low => g.events.push_back(event),
            }
        }
        g.last_high = at;
        drop(g);
        self.notify.notify_waiters();
    }

    /// User-side insertion into an output list. Maintains `last_high` and
    /// wakes a single waiter (the conductor).
    pub fn put(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut g = self.locked();
        if g.events.is_empty() {
            g.last_high = 0;
        }
        g.events_in += events.len() as u64;
        for event in events {
            match event.priority {
                Priority::High => {
                    let at = g.last_high;
                    g.events.insert(at, event);
                    g.last_high += 1;
                }
                Priority::Low => g.events.push_back(event),
            }
        }
        drop(g);
        self.notify.notify_one();
    }

    /// Restore path: place events *before* their equal-priority peers.
    /// Highs go to the very front, lows right after the high run. The
    /// events were already counted into `events_in` on their first arrival,
    /// so this instead takes them back out of `events_out`.
    pub fn put_reverse(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut g = self.locked();
        g.events_out = g.events_out.saturating_sub(events.len() as u64);
        let mut highs = 0usize;
        let mut lows = 0usize;
        let existing_high = g.leading_high();
        for event in events {
            match event.priority {
                Priority::High => {
                    g.events.insert(highs, event);
                    highs += 1;
                }
                Priority::Low => {
                    let at = highs + existing_high + lows;
                    g.events.insert(at, event);
                    lows += 1;
                }
            }
        }
        g.last_high = highs + existing_high;
        drop(g);
        self.notify.notify_waiters();
    }

    /// Conductor-side move of the whole list.
    pub fn drain_all(&self) -> Vec<Event> {
        let mut g = self.locked();
        let events: Vec<Event> = g.events.drain(..).collect();
        g.events_out += events.len() as u64;
        g.last_high = 0;
        events
    }

    /// Park until the list is non-empty, without consuming anything.
    /// Returns false once `stopped` reports true; `nudge` wakes the parked
    /// conductor so it can observe that. The conductor drains afterwards,
    /// under the registry lock, so events are never in limbo between lists.
    pub async fn wait_nonempty(&self, stopped: impl Fn() -> bool) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let g = self.locked();
                if stopped() {
                    return false;
                }
                if !g.events.is_empty() {
                    return true;
                }
            }
            notified.await;
        }
    }

    /// Wake every parked waiter so it can re-check state (conductor
    /// shutdown, list teardown).
    pub fn nudge(&self) {
        self.notify.notify_waiters();
    }

    /// Abort one attachment's parked read. The flag is set before the
    /// notify fires.
    pub fn wake_up(&self, att: &Attachment) {
        att.signal_wake();
        self.notify.notify_waiters();
    }

    /// Abort every parked read on this list. A no-op when nobody is
    /// waiting, so the flag cannot poison a later read.
    pub fn wake_up_all(&self) {
        let mut g = self.locked();
        if g.waiting > 0 {
            g.wake_all = true;
        }
        drop(g);
        self.notify.notify_waiters();
    }

    /// Blocking read from the head of the list.
    pub async fn get(
        &self,
        att: &Attachment,
        mode: GetMode,
        quantity: usize,
    ) -> Result<Vec<Event>> {
        self.get_inner(att, mode, quantity, None).await
    }

    /// Blocking read restricted to one event group. Matching events are
    /// pulled out of the middle of the list in order; non-matching events
    /// stay put. An async read of an empty-of-matches list fails `Empty`.
    pub async fn get_by_group(
        &self,
        att: &Attachment,
        mode: GetMode,
        quantity: usize,
        group: u32,
    ) -> Result<Vec<Event>> {
        self.get_inner(att, mode, quantity, Some(group)).await
    }

    async fn get_inner(
        &self,
        att: &Attachment,
        mode: GetMode,
        quantity: usize,
        group: Option<u32>,
    ) -> Result<Vec<Event>> {
        let deadline = match mode {
            GetMode::Timed(bound) => Some(Instant::now() + bound),
            _ => None,
        };
        let mut registered = false;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut g = self.locked();
                if let Some(events) = Self::take(&mut g, quantity, group) {
                    if registered {
                        g.waiting -= 1;
                        att.set_waiting(false);
                    }
                    return Ok(events);
                }
                // Nothing to take. Async reads never park and never consume
                // wakeup signals; blocking reads observe the signals here,
                // just before (re-)parking.
                if mode == GetMode::Async {
                    return Err(EtError::Empty);
                }
                if att.take_wake() || g.wake_all {
                    if registered {
                        g.waiting -= 1;
                        att.set_waiting(false);
                    }
                    if g.wake_all && g.waiting == 0 {
                        g.wake_all = false;
                    }
                    return Err(EtError::WakeUp);
                }
                if !registered {
                    g.waiting += 1;
                    registered = true;
                    att.set_waiting(true);
                }
            }
            match deadline {
                None => notified.await,
                Some(at) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        let mut g = self.locked();
                        if let Some(events) = Self::take(&mut g, quantity, group) {
                            g.waiting -= 1;
                            att.set_waiting(false);
                            return Ok(events);
                        }
                        g.waiting -= 1;
                        att.set_waiting(false);
                        if g.wake_all && g.waiting == 0 {
                            g.wake_all = false;
                        }
                        return Err(EtError::Timeout);
                    }
                }
            }
        }
    }

    /// Take up to `quantity` events: from the head, or the first matching
    /// events of `group` in list order. `None` means nothing takeable.
    fn take(g: &mut Inner, quantity: usize, group: Option<u32>) -> Option<Vec<Event>> {
        if g.events.is_empty() || quantity == 0 {
            return None;
        }
        let taken = match group {
            None => {
                let n = quantity.min(g.events.len());
                g.events.drain(..n).collect::<Vec<_>>()
            }
            Some(wanted) => {
                let mut taken = Vec::new();
                let mut kept = VecDeque::with_capacity(g.events.len());
                for event in g.events.drain(..) {
                    if taken.len() < quantity && event.group() == wanted {
                        taken.push(event);
                    } else {
                        kept.push_back(event);
                    }
                }
                g.events = kept;
                taken
            }
        };
        if taken.is_empty() {
            return None;
        }
        g.events_out += taken.len() as u64;
        g.last_high = g.leading_high();
        Some(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachId;
    use crate::event::EventId;
    use crate::station::StationId;
    use std::sync::Arc;

    fn event(id: u32, priority: Priority) -> Event {
        let mut event = Event::new(EventId(id), 16, 1);
        event.priority = priority;
        event
    }

    fn grouped(id: u32, group: u32) -> Event {
        Event::new(EventId(id), 16, group)
    }

    fn att() -> Attachment {
        Attachment::new(AttachId(0), StationId(0), "local".into(), -1)
    }

    fn ids(events: &[Event]) -> Vec<u32> {
        events.iter().map(|e| e.id().0).collect()
    }

    #[test]
    fn put_keeps_highs_ahead_of_lows() {
        let list = EventList::new();
        list.put(vec![
            event(1, Priority::High),
            event(2, Priority::Low),
            event(3, Priority::High),
            event(4, Priority::Low),
            event(5, Priority::High),
        ]);
        assert_eq!(list.stats().last_high, 3);
        let drained = list.drain_all();
        assert_eq!(ids(&drained), [1, 3, 5, 2, 4]);
    }

    #[test]
    fn put_all_splices_behind_existing_high_run() {
        let list = EventList::new();
        list.put_all(vec![event(1, Priority::High), event(2, Priority::Low)]);
        list.put_all(vec![event(3, Priority::High), event(4, Priority::Low)]);
        let drained = list.drain_all();
        assert_eq!(ids(&drained), [1, 3, 2, 4]);
    }

    #[test]
    fn put_reverse_goes_ahead_of_equal_priority_peers() {
        let list = EventList::new();
        list.put(vec![
            event(1, Priority::High),
            event(2, Priority::Low),
        ]);
        list.put_reverse(vec![event(3, Priority::High), event(4, Priority::Low)]);
        assert_eq!(list.stats().last_high, 2);
        let drained = list.drain_all();
        assert_eq!(ids(&drained), [3, 1, 4, 2]);
    }

    #[test]
    fn stats_track_ins_and_outs() {
        let list = EventList::new();
        list.put(vec![event(1, Priority::Low), event(2, Priority::Low)]);
        let stats = list.stats();
        assert_eq!(stats.events_in, 2);
        assert_eq!(stats.events_out, 0);
        assert_eq!(stats.len, 2);
        let _ = list.drain_all();
        let stats = list.stats();
        assert_eq!(stats.events_out, 2);
        assert_eq!(stats.events_in - stats.events_out, stats.len as u64);
    }

    #[tokio::test]
    async fn async_get_on_empty_list_fails_empty() {
        let list = EventList::new();
        let att = att();
        let err = list.get(&att, GetMode::Async, 1).await.unwrap_err();
        assert!(matches!(err, EtError::Empty));
    }

    #[tokio::test]
    async fn get_returns_head_in_priority_order() {
        let list = EventList::new();
        let att = att();
        list.put(vec![
            event(1, Priority::Low),
            event(2, Priority::High),
        ]);
        let events = list.get(&att, GetMode::Async, 5).await.unwrap();
        assert_eq!(ids(&events), [2, 1]);
    }

    #[tokio::test]
    async fn get_by_group_filters_and_preserves_order() {
        let list = EventList::new();
        let att = att();
        list.put(vec![grouped(1, 1), grouped(2, 2), grouped(3, 1), grouped(4, 2)]);
        let events = list.get_by_group(&att, GetMode::Async, 10, 2).await.unwrap();
        assert_eq!(ids(&events), [2, 4]);
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn get_by_group_without_matches_fails_empty_in_async() {
        let list = EventList::new();
        let att = att();
        list.put(vec![grouped(1, 1)]);
        let err = list
            .get_by_group(&att, GetMode::Async, 1, 9)
            .await
            .unwrap_err();
        assert!(matches!(err, EtError::Empty));
        assert_eq!(list.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_get_times_out_without_consuming() {
        let list = EventList::new();
        let att = att();
        let err = list
            .get(&att, GetMode::Timed(Duration::from_millis(200)), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EtError::Timeout));
        assert_eq!(list.stats().waiting, 0);
    }

    #[tokio::test]
    async fn wake_up_all_releases_every_waiter_and_clears_flag() {
        let list = Arc::new(EventList::new());
        let mut handles = Vec::new();
        for i in 0..3 {
            let list = Arc::clone(&list);
            handles.push(tokio::spawn(async move {
                let att = Attachment::new(AttachId(i), StationId(0), "local".into(), -1);
                list.get(&att, GetMode::Sleep, 1).await
            }));
        }
        // Let all three park.
        while list.stats().waiting < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        list.wake_up_all();
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(EtError::WakeUp)));
        }
        let stats = list.stats();
        assert!(!stats.wake_all);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn wake_up_before_park_is_observed() {
        let list = EventList::new();
        let att = att();
        list.wake_up(&att);
        let err = list.get(&att, GetMode::Sleep, 1).await.unwrap_err();
        assert!(matches!(err, EtError::WakeUp));
    }

    #[tokio::test]
    async fn put_wakes_a_sleeping_getter() {
        let list = Arc::new(EventList::new());
        let waiter = {
            let list = Arc::clone(&list);
            tokio::spawn(async move {
                let att = att();
                list.get(&att, GetMode::Sleep, 2).await
            })
        };
        while list.stats().waiting == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        list.put(vec![event(7, Priority::Low)]);
        let events = waiter.await.unwrap().unwrap();
        assert_eq!(ids(&events), [7]);
    }
}
