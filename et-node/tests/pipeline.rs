// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! End-to-end pipeline behaviour of an in-process broker: priority order,
//! parallel distribution, wakeup and timeout semantics, restore policies
//! and event conservation.

mod common;

use common::{gc_input_len, input_len, low_events, produce, small_config, visible_events, wait_for};
use et_node::{
    EtError, EtSystem, GetMode, ParallelPosition, Position, StationConfig, GRAND_CENTRAL_ID,
};
use et_protocol::{BlockMode, FlowMode, Priority, RestoreMode, SelectMode, SELECT_INTS};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn parallel_config(select_mode: SelectMode) -> StationConfig {
    StationConfig {
        flow_mode: FlowMode::Parallel,
        block_mode: BlockMode::Blocking,
        select_mode,
        restore_mode: RestoreMode::ToGrandCentral,
        prescale: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn priority_order_survives_the_pipeline() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "inspector",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    let zero = [0i32; SELECT_INTS];
    let published = produce(
        &system,
        producer,
        &[
            (Priority::High, zero),
            (Priority::Low, zero),
            (Priority::High, zero),
            (Priority::Low, zero),
            (Priority::High, zero),
        ],
    )
    .await;

    let sys = &system;
    wait_for("events to reach the inspector", move || async move {
        input_len(sys, "inspector").await == 5
    })
    .await;

    let got = system
        .get_events(consumer, GetMode::Async, et_protocol::ModifyFlags::Nothing, 5, None)
        .await
        .unwrap();
    // Highs (published positions 0, 2, 4) lead, FIFO within each class.
    let expected = vec![
        published[0],
        published[2],
        published[4],
        published[1],
        published[3],
    ];
    assert_eq!(got, expected);

    system.close().await;
}

#[tokio::test]
async fn round_robin_group_distributes_in_rotation() {
    let system = EtSystem::start(small_config(10)).unwrap();
    system
        .create_station(
            "rr0",
            parallel_config(SelectMode::RoundRobin),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    for name in ["rr1", "rr2"] {
        system
            .create_station(
                name,
                parallel_config(SelectMode::RoundRobin),
                Position::At(1),
                ParallelPosition::End,
            )
            .await
            .unwrap();
    }
    for name in ["rr0", "rr1", "rr2"] {
        let id = system.station_exists(name).await.unwrap();
        system.attach(id, "tests", -1).await.unwrap();
    }
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    produce(&system, producer, &low_events(7)).await;

    let sys = &system;
    wait_for("seven events to spread over the group", move || async move {
        input_len(sys, "rr0").await
            + input_len(sys, "rr1").await
            + input_len(sys, "rr2").await
            == 7
    })
    .await;
    assert_eq!(input_len(&system, "rr0").await, 3);
    assert_eq!(input_len(&system, "rr1").await, 2);
    assert_eq!(input_len(&system, "rr2").await, 2);

    system.close().await;
}

#[tokio::test]
async fn equal_cue_group_feeds_the_least_loaded_member() {
    let system = EtSystem::start(small_config(20)).unwrap();
    let a = system
        .create_station(
            "eq_a",
            parallel_config(SelectMode::EqualCue),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let b = system
        .create_station(
            "eq_b",
            parallel_config(SelectMode::EqualCue),
            Position::At(1),
            ParallelPosition::End,
        )
        .await
        .unwrap();
    system.attach(a, "tests", -1).await.unwrap();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    // With eq_b idle, everything piles onto eq_a.
    produce(&system, producer, &low_events(5)).await;
    let sys = &system;
    wait_for("preload to land on eq_a", move || async move {
        input_len(sys, "eq_a").await == 5
    })
    .await;

    system.attach(b, "tests", -1).await.unwrap();
    produce(&system, producer, &low_events(6)).await;
    let sys = &system;
    wait_for("second batch to spread", move || async move {
        input_len(sys, "eq_a").await + input_len(sys, "eq_b").await == 11
    })
    .await;

    let a_len = input_len(&system, "eq_a").await;
    let b_len = input_len(&system, "eq_b").await;
    // eq_b catches up first; the ends differ by at most one.
    assert_eq!(a_len, 6);
    assert_eq!(b_len, 5);

    system.close().await;
}

#[tokio::test]
async fn wake_up_all_unparks_a_sleeping_consumer() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "sleepy",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();

    let waiter = {
        let system = system.clone();
        tokio::spawn(async move {
            system
                .get_events(consumer, GetMode::Sleep, et_protocol::ModifyFlags::Nothing, 1, None)
                .await
        })
    };
    let sys = &system;
    wait_for("the consumer to park", move || async move {
        sys.snapshot()
            .await
            .attachments
            .iter()
            .any(|att| att.id == consumer && att.waiting)
    })
    .await;

    system.wake_up_all(station).await.unwrap();
    let result = tokio::time::timeout(Duration::from_millis(100), waiter)
        .await
        .expect("wakeup must release the waiter promptly")
        .unwrap();
    assert!(matches!(result, Err(EtError::WakeUp)));

    let snapshot = system.snapshot().await;
    let sleepy = snapshot
        .stations
        .iter()
        .find(|s| s.name == "sleepy")
        .unwrap();
    assert!(!sleepy.input.wake_all);
    assert_eq!(sleepy.input.waiting, 0);

    system.close().await;
}

#[tokio::test]
async fn timed_get_expires_empty_handed() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "patient",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();

    let started = Instant::now();
    let result = system
        .get_events(
            consumer,
            GetMode::Timed(Duration::from_millis(200)),
            et_protocol::ModifyFlags::Nothing,
            1,
            None,
        )
        .await;
    let elapsed = started.elapsed();
    assert!(matches!(result, Err(EtError::Timeout)));
    assert!(elapsed >= Duration::from_millis(150), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
    assert_eq!(input_len(&system, "patient").await, 0);

    system.close().await;
}

#[tokio::test]
async fn detach_restores_held_events_to_grand_central() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "fragile",
            StationConfig {
                restore_mode: RestoreMode::ToGrandCentral,
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    produce(&system, producer, &low_events(4)).await;
    let sys = &system;
    wait_for("events to reach the station", move || async move {
        input_len(sys, "fragile").await == 4
    })
    .await;
    assert_eq!(gc_input_len(&system).await, 6);

    let got = system
        .get_events(consumer, GetMode::Async, et_protocol::ModifyFlags::Nothing, 4, None)
        .await
        .unwrap();
    assert_eq!(got.len(), 4);

    // The consumer dies holding all four events.
    system.detach(consumer).await.unwrap();
    let sys = &system;
    wait_for("held events to return to the pool", move || async move {
        gc_input_len(sys).await == 10
    })
    .await;
    let snapshot = system.snapshot().await;
    let fragile = snapshot
        .stations
        .iter()
        .find(|s| s.name == "fragile")
        .unwrap();
    assert_eq!(fragile.input.len, 0);
    assert_eq!(fragile.output.len, 0);

    system.close().await;
}

#[tokio::test]
async fn detach_can_restore_to_the_stations_own_input() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "keeper",
            StationConfig {
                restore_mode: RestoreMode::ToStation,
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    produce(&system, producer, &low_events(3)).await;
    let sys = &system;
    wait_for("events to reach the station", move || async move {
        input_len(sys, "keeper").await == 3
    })
    .await;
    let got = system
        .get_events(consumer, GetMode::Async, et_protocol::ModifyFlags::Nothing, 3, None)
        .await
        .unwrap();
    assert_eq!(got.len(), 3);
    assert_eq!(input_len(&system, "keeper").await, 0);

    system.detach(consumer).await.unwrap();
    assert_eq!(input_len(&system, "keeper").await, 3);

    system.close().await;
}

#[tokio::test]
async fn create_station_is_idempotent_for_identical_config() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let config = StationConfig::default();
    let first = system
        .create_station("twin", config.clone(), Position::End, ParallelPosition::End)
        .await
        .unwrap();
    let second = system
        .create_station("twin", config, Position::End, ParallelPosition::End)
        .await
        .unwrap();
    assert_eq!(first, second);

    let different = StationConfig {
        prescale: 7,
        ..Default::default()
    };
    let err = system
        .create_station("twin", different, Position::End, ParallelPosition::End)
        .await
        .unwrap_err();
    assert!(matches!(err, EtError::Exists(_)));

    system.close().await;
}

#[tokio::test]
async fn every_event_is_always_somewhere() {
    let system = EtSystem::start(small_config(12)).unwrap();
    let station = system
        .create_station(
            "hop",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let consumer = system.attach(station, "tests", -1).await.unwrap().id();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    assert_eq!(visible_events(&system).await, 12);
    produce(&system, producer, &low_events(5)).await;
    assert_eq!(visible_events(&system).await, 12);

    let sys = &system;
    wait_for("events to reach the station", move || async move {
        input_len(sys, "hop").await == 5
    })
    .await;
    let got = system
        .get_events(consumer, GetMode::Async, et_protocol::ModifyFlags::Nothing, 5, None)
        .await
        .unwrap();
    assert_eq!(visible_events(&system).await, 12);

    system.dump_events(consumer, &got).await.unwrap();
    assert_eq!(visible_events(&system).await, 12);
    let sys = &system;
    wait_for("the pool to refill", move || async move {
        gc_input_len(sys).await == 12
    })
    .await;

    system.close().await;
}

#[tokio::test]
async fn new_events_can_draw_from_one_group() {
    let mut config = small_config(10);
    config.groups = vec![3, 7];
    let system = EtSystem::start(config).unwrap();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    let ids = system
        .new_events(producer, GetMode::Async, 10, 8, Some(2))
        .await
        .unwrap();
    assert_eq!(ids.len(), 7);
    // Group 2 is laid out after the three group-1 events.
    assert!(ids.iter().all(|id| (3..10).contains(&id.0)));

    let err = system
        .new_events(producer, GetMode::Async, 1, 8, Some(9))
        .await
        .unwrap_err();
    assert!(matches!(err, EtError::Error(_)));

    system.close().await;
}

#[tokio::test]
async fn prescale_decimates_accepted_events() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "halved",
            StationConfig {
                prescale: 2,
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    system.attach(station, "tests", -1).await.unwrap();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    produce(&system, producer, &low_events(4)).await;
    let sys = &system;
    wait_for("half the events to be accepted", move || async move {
        input_len(sys, "halved").await == 2 && gc_input_len(sys).await == 8
    })
    .await;
    let snapshot = system.snapshot().await;
    let halved = snapshot
        .stations
        .iter()
        .find(|s| s.name == "halved")
        .unwrap();
    assert_eq!(halved.input.events_try, 4);

    system.close().await;
}

#[tokio::test]
async fn nonblocking_station_overflows_past_its_cue() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let station = system
        .create_station(
            "narrow",
            StationConfig {
                block_mode: BlockMode::NonBlocking,
                cue: 2,
                restore_mode: RestoreMode::ToGrandCentral,
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    system.attach(station, "tests", -1).await.unwrap();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    produce(&system, producer, &low_events(5)).await;
    let sys = &system;
    wait_for("overflow to drain back to the pool", move || async move {
        input_len(sys, "narrow").await == 2 && gc_input_len(sys).await == 8
    })
    .await;

    system.close().await;
}

#[tokio::test]
async fn match_and_user_predicates_filter_events() {
    let system = EtSystem::start(small_config(10)).unwrap();
    system.register_select(
        "even_first_word",
        Arc::new(|event, _config| event.control[0] % 2 == 0),
    );

    let matcher = system
        .create_station(
            "matcher",
            StationConfig {
                select_mode: SelectMode::Match,
                select: [0x4, 0, 0, 0, 0, 0],
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let chooser = system
        .create_station(
            "chooser",
            StationConfig {
                select_mode: SelectMode::User,
                select_function: Some("even_first_word".into()),
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    system.attach(matcher, "tests", -1).await.unwrap();
    system.attach(chooser, "tests", -1).await.unwrap();
    let producer = system.attach(GRAND_CENTRAL_ID, "tests", -1).await.unwrap().id();

    // control[0]: 0x4 matches "matcher"; 2 is even so "chooser" takes it;
    // 1 matches nobody and wraps home.
    produce(
        &system,
        producer,
        &[
            (Priority::Low, [0x4, 0, 0, 0, 0, 0]),
            (Priority::Low, [2, 0, 0, 0, 0, 0]),
            (Priority::Low, [1, 0, 0, 0, 0, 0]),
        ],
    )
    .await;

    let sys = &system;
    wait_for("selection to settle", move || async move {
        input_len(sys, "matcher").await == 1
            && input_len(sys, "chooser").await == 1
            && gc_input_len(sys).await == 8
    })
    .await;

    let missing = system
        .create_station(
            "broken",
            StationConfig {
                select_mode: SelectMode::User,
                select_function: Some("no_such_predicate".into()),
                ..Default::default()
            },
            Position::End,
            ParallelPosition::End,
        )
        .await;
    assert!(missing.is_err());

    system.close().await;
}

#[tokio::test]
async fn grand_central_is_immovable() {
    let system = EtSystem::start(small_config(10)).unwrap();

    let err = system
        .create_station(
            "GRAND_CENTRAL",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EtError::Error(_)));

    assert!(system.remove_station(GRAND_CENTRAL_ID).await.is_err());
    assert!(system
        .set_station_position(GRAND_CENTRAL_ID, Position::At(1), ParallelPosition::End)
        .await
        .is_err());

    system.close().await;
}

#[tokio::test]
async fn stations_can_be_repositioned_and_removed() {
    let system = EtSystem::start(small_config(10)).unwrap();
    let first = system
        .create_station(
            "first",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    let second = system
        .create_station(
            "second",
            StationConfig::default(),
            Position::End,
            ParallelPosition::End,
        )
        .await
        .unwrap();
    assert_eq!(system.get_station_position(first).await.unwrap(), (1, 0));
    assert_eq!(system.get_station_position(second).await.unwrap(), (2, 0));

    system
        .set_station_position(second, Position::At(1), ParallelPosition::End)
        .await
        .unwrap();
    assert_eq!(system.get_station_position(second).await.unwrap(), (1, 0));
    assert_eq!(system.get_station_position(first).await.unwrap(), (2, 0));

    let att = system.attach(first, "tests", -1).await.unwrap().id();
    assert!(system.remove_station(first).await.is_err());
    system.detach(att).await.unwrap();
    system.remove_station(first).await.unwrap();
    assert!(system.station_exists("first").await.is_none());
    assert!(system.get_station_position(first).await.is_err());

    system.close().await;
}
