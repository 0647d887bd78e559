// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The per-station conductor: drains the station's output list and routes
//! every event to the input list of the next station that wants it.
//!
//! A conductor holds the registry's shared lock for the whole routing pass,
//! so structural changes (create/remove/move) are excluded while events are
//! in flight between lists, and nothing is ever in flight when a station
//! disappears. Events nobody accepts wrap around to GRAND_CENTRAL; they
//! never vanish.

use crate::event::Event;
use crate::station::Station;
use crate::system::{Registry, SystemInner};
use et_protocol::{BlockMode, Priority, RestoreMode, SelectMode};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) fn spawn(inner: Arc<SystemInner>, station: Arc<Station>) -> JoinHandle<()> {
    tokio::spawn(run(inner, station))
}

async fn run(inner: Arc<SystemInner>, station: Arc<Station>) {
    debug!("conductor for {} ({}) starting", station.name(), station.id());
    loop {
        let stopped = || station.is_removed() || !inner.is_alive();
        if !station.output().wait_nonempty(stopped).await {
            break;
        }
        // Drain only once the ring is readable: an event is always in a
        // list, in a reclaim set, or being routed under this lock.
        let registry = inner.registry.read().await;
        let events = station.output().drain_all();
        if events.is_empty() {
            continue;
        }
        route(&registry, &station, partition_highs_first(events));
    }
    debug!("conductor for {} exiting", station.name());
}

/// Stable partition: all highs ahead of all lows, FIFO within each class.
pub(crate) fn partition_highs_first(events: Vec<Event>) -> Vec<Event> {
    let (mut highs, lows): (Vec<_>, Vec<_>) = events
        .into_iter()
        .partition(|event| event.priority == Priority::High);
    highs.extend(lows);
    highs
}

/// Route a drained batch from `from` forward around the ring.
pub(crate) fn route(registry: &Registry, from: &Arc<Station>, events: Vec<Event>) {
    let mut remaining = events;
    // A station that lost its place (removed mid-drain) sends everything
    // home.
    let start = registry
        .position_of(from.id())
        .map(|(main, _)| main + 1)
        .unwrap_or_else(|| registry.ring.len());
    for position in start..registry.ring.len() {
        if remaining.is_empty() {
            return;
        }
        remaining = offer_to_group(registry, &registry.ring[position], remaining);
    }
    if !remaining.is_empty() {
        deliver_to_grand_central(registry, remaining);
    }
}

/// Hand leftovers to the free pool, scrubbed for reuse.
pub(crate) fn deliver_to_grand_central(registry: &Registry, mut events: Vec<Event>) {
    for event in &mut events {
        event.recycle();
    }
    registry.grand_central().input().put_in_gc(events);
}

/// Offer a batch to one ring slot (a single station or a parallel group).
/// Returns the events nobody took.
fn offer_to_group(
    registry: &Registry,
    group: &[Arc<Station>],
    events: Vec<Event>,
) -> Vec<Event> {
    if group.len() == 1 {
        offer_to_station(registry, &group[0], events)
    } else {
        distribute(group, events, true)
    }
}

/// Serial-station acceptance: predicate, then prescale, then the cue check
/// for non-blocking stations.
fn offer_to_station(
    registry: &Registry,
    station: &Arc<Station>,
    events: Vec<Event>,
) -> Vec<Event> {
    if station.status() == crate::station::StationStatus::Idle {
        return events;
    }
    let config = station.config();
    let mut accepted: Vec<Event> = Vec::new();
    let mut overflow: Vec<Event> = Vec::new();
    let mut remaining: Vec<Event> = Vec::new();
    let cue_room = match config.block_mode {
        BlockMode::Blocking => usize::MAX,
        BlockMode::NonBlocking => config.cue.saturating_sub(station.input().len()),
    };
    for event in events {
        if !station.selects(&event) {
            remaining.push(event);
            continue;
        }
        let tries = station.input().bump_try();
        if tries % config.prescale as u64 != 0 {
            remaining.push(event);
            continue;
        }
        if accepted.len() < cue_room {
            accepted.push(event);
        } else {
            overflow.push(event);
        }
    }
    station.input().put_all(accepted);
    if !overflow.is_empty() {
        warn!(
            "station {} overflowed {} events, restoring {:?}",
            station.name(),
            overflow.len(),
            config.restore_mode
        );
        restore_events(registry, station, overflow);
    }
    remaining
}

/// Parallel-group admission and distribution, per the head's policy.
/// `count_try` is false on the redistribute path, where admission already
/// happened once.
fn distribute(group: &[Arc<Station>], events: Vec<Event>, count_try: bool) -> Vec<Event> {
    let head = &group[0];
    let eligible: Vec<&Arc<Station>> = group
        .iter()
        .filter(|station| station.status() == crate::station::StationStatus::Active)
        .collect();
    if eligible.is_empty() {
        return events;
    }
    let mut remaining = Vec::new();
    let mut batches: Vec<Vec<Event>> = eligible.iter().map(|_| Vec::new()).collect();
    for event in events {
        let admitted = match head.config().select_mode {
            SelectMode::RoundRobin | SelectMode::EqualCue | SelectMode::User => true,
            _ => head.selects(&event),
        };
        if admitted && count_try {
            let _ = head.input().bump_try();
        }
        if !admitted {
            remaining.push(event);
            continue;
        }
        let target = match head.config().select_mode {
            SelectMode::EqualCue => {
                // Least-loaded member, batched deliveries included; ties go
                // to the earliest parallel position.
                (0..eligible.len())
                    .min_by_key(|&i| eligible[i].input().len() + batches[i].len())
                    .unwrap_or(0)
            }
            SelectMode::User => {
                match eligible
                    .iter()
                    .position(|station| station.selects(&event))
                {
                    Some(index) => index,
                    None => {
                        remaining.push(event);
                        continue;
                    }
                }
            }
            // Round robin, and the rotation fallback for all/match heads.
            _ => head.next_rr(eligible.len()),
        };
        batches[target].push(event);
    }
    for (station, batch) in eligible.iter().zip(batches) {
        station.input().put_all(batch);
    }
    remaining
}

/// Re-home events whose holder died or whose station overflowed, following
/// the station's restore mode. Restored events always precede their
/// equal-priority peers.
pub(crate) fn restore_events(registry: &Registry, station: &Arc<Station>, events: Vec<Event>) {
    if events.is_empty() {
        return;
    }
    let events = partition_highs_first(events);
    match station.config().restore_mode {
        RestoreMode::ToStation => station.input().put_reverse(events),
        RestoreMode::ToGrandCentral => deliver_to_grand_central(registry, events),
        RestoreMode::ToInput => {
            // Explicit upstream: the previous main-line slot's head station
            // re-conducts them through here.
            let upstream = registry
                .position_of(station.id())
                .and_then(|(main, _)| main.checked_sub(1))
                .and_then(|previous| registry.ring.get(previous))
                .and_then(|group| group.first());
            match upstream {
                Some(upstream) => upstream.output().put_reverse(events),
                None => deliver_to_grand_central(registry, events),
            }
        }
        RestoreMode::Redistribute => {
            let group = registry
                .position_of(station.id())
                .map(|(main, _)| registry.ring[main].clone());
            match group {
                Some(group) if group.len() > 1 => {
                    let leftover = distribute(&group, events, false);
                    if !leftover.is_empty() {
                        deliver_to_grand_central(registry, leftover);
                    }
                }
                _ => deliver_to_grand_central(registry, events),
            }
        }
    }
}
