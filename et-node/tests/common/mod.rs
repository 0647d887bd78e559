// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

#![allow(dead_code)]

use et_node::{AttachId, EtSystem, EventId, GetMode, SystemConfig};
use et_protocol::{Priority, GRAND_CENTRAL, SELECT_INTS};
use std::future::Future;
use std::time::Duration;

/// A small pool so tests can count every event.
pub fn small_config(num_events: usize) -> SystemConfig {
    SystemConfig {
        num_events,
        event_size: 64,
        groups: vec![num_events],
        ..Default::default()
    }
}

/// Poll an async condition until it holds, for at most two seconds.
pub async fn wait_for<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Input-list length of a station, by name.
pub async fn input_len(system: &EtSystem, name: &str) -> usize {
    system
        .snapshot()
        .await
        .stations
        .iter()
        .find(|station| station.name == name)
        .map(|station| station.input.len)
        .unwrap_or(0)
}

pub async fn gc_input_len(system: &EtSystem) -> usize {
    input_len(system, GRAND_CENTRAL).await
}

/// Total events visible anywhere: station lists plus attachment reclaim
/// sets. Must always equal the configured pool size.
pub async fn visible_events(system: &EtSystem) -> usize {
    let snapshot = system.snapshot().await;
    let in_lists: usize = snapshot
        .stations
        .iter()
        .map(|station| station.input.len + station.output.len)
        .sum();
    let held: usize = snapshot.attachments.iter().map(|att| att.held).sum();
    in_lists + held
}

/// Draw events, stamp priority and control words, publish them.
pub async fn produce(
    system: &EtSystem,
    producer: AttachId,
    specs: &[(Priority, [i32; SELECT_INTS])],
) -> Vec<EventId> {
    let ids = system
        .new_events(producer, GetMode::Async, specs.len(), 8, None)
        .await
        .expect("pool should have events");
    assert_eq!(ids.len(), specs.len());
    for (id, (priority, control)) in ids.iter().zip(specs) {
        system
            .with_held(producer, *id, |event| {
                event.priority = *priority;
                event.control = *control;
            })
            .await
            .expect("freshly drawn event is held");
    }
    system
        .put_events(producer, &ids)
        .await
        .expect("publishing held events");
    ids
}

/// `count` low-priority events with zeroed control words.
pub fn low_events(count: usize) -> Vec<(Priority, [i32; SELECT_INTS])> {
    vec![(Priority::Low, [0; SELECT_INTS]); count]
}
