// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The broker itself: the station ring, the attachment table, the free
//! pool behind GRAND_CENTRAL and the system lifecycle.
//!
//! Structural operations (create/remove/move/attach/detach) take the
//! registry write lock; conductors route under the read lock. Event-plane
//! operations only hold the lock long enough to clone the station handles
//! they need, then block on the lists without it.

use crate::attachment::{AttachId, Attachment, AttachmentStats};
use crate::conductor;
use crate::config::SystemConfig;
use crate::error::{EtError, Result};
use crate::event::{Age, Event, EventId, Owner};
use crate::event_list::{GetMode, ListStats};
use crate::station::{
    SelectFn, Station, StationConfig, StationId, StationStatus, GRAND_CENTRAL_ID,
};
use et_protocol::{ModifyFlags, SelectMode, END, GRAND_CENTRAL, NEW_HEAD};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const HEARTBEAT_PERIOD: Duration = Duration::from_millis(500);

/// Requested place on the main line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    End,
    At(usize),
}

impl Position {
    pub fn from_wire(value: i32) -> Result<Self> {
        match value {
            END => Ok(Self::End),
            p if p >= 1 => Ok(Self::At(p as usize)),
            _ => Err(EtError::Error(format!("bad station position {value}"))),
        }
    }
}

/// Requested place inside a parallel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPosition {
    End,
    NewHead,
    At(usize),
}

impl ParallelPosition {
    pub fn from_wire(value: i32) -> Result<Self> {
        match value {
            END => Ok(Self::End),
            NEW_HEAD => Ok(Self::NewHead),
            p if p >= 0 => Ok(Self::At(p as usize)),
            _ => Err(EtError::Error(format!("bad parallel position {value}"))),
        }
    }
}

/// The station ring plus every table the broker keys by id.
pub(crate) struct Registry {
    /// Outer index: main-line position (0 is GRAND_CENTRAL, alone). Inner
    /// index: parallel position, head first.
    pub(crate) ring: Vec<Vec<Arc<Station>>>,
    pub(crate) by_id: HashMap<StationId, Arc<Station>>,
    pub(crate) attachments: HashMap<AttachId, Arc<Attachment>>,
    next_station: u32,
}

impl Registry {
    pub(crate) fn grand_central(&self) -> &Arc<Station> {
        &self.ring[0][0]
    }

    /// (main position, parallel position) of a station still on the ring.
    pub(crate) fn position_of(&self, id: StationId) -> Option<(usize, usize)> {
        self.ring.iter().enumerate().find_map(|(main, group)| {
            group
                .iter()
                .position(|station| station.id() == id)
                .map(|parallel| (main, parallel))
        })
    }

    fn find_by_name(&self, name: &str) -> Option<&Arc<Station>> {
        self.by_id.values().find(|station| station.name() == name)
    }
}

pub(crate) struct SystemInner {
    pub(crate) config: SystemConfig,
    pub(crate) registry: RwLock<Registry>,
    alive: AtomicBool,
    heartbeat: AtomicU64,
    histogram: Mutex<Vec<u64>>,
    next_attach: AtomicU32,
    selects: Mutex<HashMap<String, Arc<SelectFn>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SystemInner {
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Point-in-time view of one station, for SYS_DATA.
#[derive(Debug, Clone)]
pub struct StationSnapshot {
    pub id: StationId,
    pub name: String,
    pub position: usize,
    pub parallel_position: usize,
    pub status: StationStatus,
    pub attachments: Vec<AttachId>,
    pub config: StationConfig,
    pub input: ListStats,
    pub output: ListStats,
}

/// Point-in-time view of one attachment, for SYS_DATA.
#[derive(Debug, Clone)]
pub struct AttachmentSnapshot {
    pub id: AttachId,
    pub station_id: StationId,
    pub pid: i32,
    pub host: String,
    pub waiting: bool,
    /// Events drawn and not yet returned.
    pub held: usize,
    pub stats: AttachmentStats,
}

/// Point-in-time view of the whole broker.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub alive: bool,
    pub heartbeat: u64,
    pub num_events: usize,
    pub event_size: usize,
    pub max_stations: usize,
    pub max_attachments: usize,
    pub stations: Vec<StationSnapshot>,
    pub attachments: Vec<AttachmentSnapshot>,
}

/// Handle to a running broker. Clones share the same system.
#[derive(Clone)]
pub struct EtSystem {
    inner: Arc<SystemInner>,
}

impl EtSystem {
    /// Boot a broker: build the pool, seed GRAND_CENTRAL and start its
    /// conductor and the heartbeat. Must be called inside a tokio runtime.
    pub fn start(config: SystemConfig) -> Result<Self> {
        config.validate()?;
        let gc_config = StationConfig {
            select_mode: SelectMode::All,
            cue: config.num_events,
            ..Default::default()
        };
        let grand_central = Arc::new(Station::new(
            GRAND_CENTRAL_ID,
            GRAND_CENTRAL.to_string(),
            gc_config,
            None,
        ));
        let pool: Vec<Event> = (0..config.num_events)
            .map(|i| Event::new(EventId(i as u32), config.event_size, config.group_of(i)))
            .collect();
        grand_central.input().put_low(pool);

        let mut by_id = HashMap::new();
        by_id.insert(GRAND_CENTRAL_ID, Arc::clone(&grand_central));
        let histogram = vec![0u64; config.num_events + 1];
        let inner = Arc::new(SystemInner {
            registry: RwLock::new(Registry {
                ring: vec![vec![Arc::clone(&grand_central)]],
                by_id,
                attachments: HashMap::new(),
                next_station: 1,
            }),
            config,
            alive: AtomicBool::new(true),
            heartbeat: AtomicU64::new(0),
            histogram: Mutex::new(histogram),
            next_attach: AtomicU32::new(0),
            selects: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        });

        let system = Self { inner };
        system.push_task(conductor::spawn(
            Arc::clone(&system.inner),
            grand_central,
        ));
        system.push_task(system.spawn_heartbeat());
        info!(
            "event transport system started: {} events of {} bytes",
            system.inner.config.num_events, system.inner.config.event_size
        );
        Ok(system)
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
            loop {
                ticker.tick().await;
                if !inner.is_alive() {
                    break;
                }
                inner.heartbeat.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    pub fn heartbeat(&self) -> u64 {
        self.inner.heartbeat.load(Ordering::Relaxed)
    }

    pub fn pid(&self) -> i32 {
        std::process::id() as i32
    }

    /// Register a named user selection predicate. Stations created with
    /// select mode `User` resolve their predicate here; unknown names make
    /// STATION_CREATE_AT fail.
    pub fn register_select(&self, name: &str, predicate: Arc<SelectFn>) {
        self.inner
            .selects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), predicate);
    }

    fn resolve_select(&self, config: &StationConfig) -> Result<Option<Arc<SelectFn>>> {
        if config.select_mode != SelectMode::User {
            return Ok(None);
        }
        let name = config
            .select_function
            .as_deref()
            .ok_or_else(|| EtError::Error("user select mode requires a predicate name".into()))?;
        let selects = self.inner.selects.lock().unwrap_or_else(|e| e.into_inner());
        match selects.get(name) {
            Some(predicate) => Ok(Some(Arc::clone(predicate))),
            None => Err(EtError::Error(format!("unknown select predicate {name:?}"))),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(EtError::Dead("system is closed".into()))
        }
    }

    /// Create a station at the requested place on the ring. Idempotent for
    /// an identical configuration under the same name; a differing
    /// configuration fails with `Exists`.
    pub async fn create_station(
        &self,
        name: &str,
        mut config: StationConfig,
        position: Position,
        parallel_position: ParallelPosition,
    ) -> Result<StationId> {
        self.check_alive()?;
        if name == GRAND_CENTRAL {
            return Err(EtError::Error(format!("{GRAND_CENTRAL} is reserved")));
        }
        config.cue = config.cue.min(self.inner.config.num_events);
        config.validate()?;
        let user_select = self.resolve_select(&config)?;

        let mut registry = self.inner.registry.write().await;
        if let Some(existing) = registry.find_by_name(name) {
            return if existing.config() == &config {
                Ok(existing.id())
            } else {
                Err(EtError::Exists(name.to_string()))
            };
        }
        if registry.by_id.len() >= self.inner.config.max_stations {
            return Err(EtError::TooMany(format!(
                "station limit {} reached",
                self.inner.config.max_stations
            )));
        }
        let id = StationId(registry.next_station);
        let station = Arc::new(Station::new(id, name.to_string(), config, user_select));
        insert_into_ring(&mut registry, Arc::clone(&station), position, parallel_position)?;
        registry.next_station += 1;
        registry.by_id.insert(id, Arc::clone(&station));
        drop(registry);

        self.push_task(conductor::spawn(Arc::clone(&self.inner), station));
        info!("created station {name:?} as {id}");
        Ok(id)
    }

    /// Remove an idle station and send whatever sits in its lists home.
    pub async fn remove_station(&self, id: StationId) -> Result<()> {
        self.check_alive()?;
        if id == GRAND_CENTRAL_ID {
            return Err(EtError::Error(format!("{GRAND_CENTRAL} cannot be removed")));
        }
        let mut registry = self.inner.registry.write().await;
        let station = registry
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))?;
        if station.attachment_count() > 0 {
            return Err(EtError::Error(format!(
                "station {} still has attachments",
                station.name()
            )));
        }
        let (main, parallel) = registry
            .position_of(id)
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))?;
        registry.ring[main].remove(parallel);
        if registry.ring[main].is_empty() {
            registry.ring.remove(main);
        }
        registry.by_id.remove(&id);
        station.mark_removed();
        let mut stranded = station.input().drain_all();
        stranded.extend(station.output().drain_all());
        if !stranded.is_empty() {
            conductor::deliver_to_grand_central(&registry, stranded);
        }
        info!("removed station {} ({id})", station.name());
        Ok(())
    }

    /// Move a station to a new place on the ring, revalidating group
    /// compatibility at the target.
    pub async fn set_station_position(
        &self,
        id: StationId,
        position: Position,
        parallel_position: ParallelPosition,
    ) -> Result<()> {
        self.check_alive()?;
        if id == GRAND_CENTRAL_ID {
            return Err(EtError::Error(format!("{GRAND_CENTRAL} cannot be moved")));
        }
        let mut registry = self.inner.registry.write().await;
        let station = registry
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))?;
        let (main, parallel) = registry
            .position_of(id)
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))?;
        let saved = registry.ring.clone();
        registry.ring[main].remove(parallel);
        if registry.ring[main].is_empty() {
            registry.ring.remove(main);
        }
        if let Err(err) = insert_into_ring(&mut registry, station, position, parallel_position) {
            registry.ring = saved;
            return Err(err);
        }
        Ok(())
    }

    /// Current (position, parallel position) of a station.
    pub async fn get_station_position(&self, id: StationId) -> Result<(usize, usize)> {
        let registry = self.inner.registry.read().await;
        registry
            .position_of(id)
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))
    }

    pub async fn station_exists(&self, name: &str) -> Option<StationId> {
        let registry = self.inner.registry.read().await;
        registry.find_by_name(name).map(|station| station.id())
    }

    pub(crate) async fn station(&self, id: StationId) -> Result<Arc<Station>> {
        let registry = self.inner.registry.read().await;
        registry
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| EtError::Error(format!("no such station {id}")))
    }

    pub async fn is_attached(&self, station_id: StationId, att_id: AttachId) -> Result<bool> {
        Ok(self.station(station_id).await?.has_attachment(att_id))
    }

    /// Bind a new attachment to a station.
    pub async fn attach(
        &self,
        station_id: StationId,
        host: &str,
        pid: i32,
    ) -> Result<Arc<Attachment>> {
        self.check_alive()?;
        let mut registry = self.inner.registry.write().await;
        let station = registry
            .by_id
            .get(&station_id)
            .cloned()
            .ok_or_else(|| EtError::Error(format!("no such station {station_id}")))?;
        if registry.attachments.len() >= self.inner.config.max_attachments {
            return Err(EtError::TooMany(format!(
                "attachment limit {} reached",
                self.inner.config.max_attachments
            )));
        }
        let id = AttachId(self.inner.next_attach.fetch_add(1, Ordering::Relaxed));
        station.add_attachment(id)?;
        let attachment = Arc::new(Attachment::new(id, station_id, host.to_string(), pid));
        registry.attachments.insert(id, Arc::clone(&attachment));
        info!("attached {id} to station {} from {host}", station.name());
        Ok(attachment)
    }

    /// Unbind an attachment; its held events are re-homed by the station's
    /// restore mode before anything else lands in the target list.
    pub async fn detach(&self, att_id: AttachId) -> Result<()> {
        let mut registry = self.inner.registry.write().await;
        let attachment = registry
            .attachments
            .remove(&att_id)
            .ok_or_else(|| EtError::Dead(format!("no such attachment {att_id}")))?;
        attachment.invalidate();
        let station = registry.by_id.get(&attachment.station_id()).cloned();
        if let Some(station) = &station {
            station.remove_attachment(att_id);
            // Unpark a blocked get so the worker can observe the death.
            station.input().wake_up(&attachment);
        }
        registry.grand_central().input().wake_up(&attachment);
        let held = attachment.drain_held();
        if !held.is_empty() {
            let station = station.unwrap_or_else(|| Arc::clone(registry.grand_central()));
            warn!(
                "restoring {} events held by dead {att_id} via {:?}",
                held.len(),
                station.config().restore_mode
            );
            conductor::restore_events(&registry, &station, held);
        }
        info!("detached {att_id}");
        Ok(())
    }

    /// Look an attachment up, refusing poisoned handles.
    pub async fn attachment(&self, att_id: AttachId) -> Result<Arc<Attachment>> {
        let registry = self.inner.registry.read().await;
        let attachment = registry
            .attachments
            .get(&att_id)
            .cloned()
            .ok_or_else(|| EtError::Dead(format!("no such attachment {att_id}")))?;
        if !attachment.is_usable() {
            return Err(EtError::Dead(format!("{att_id} is no longer usable")));
        }
        Ok(attachment)
    }

    /// Abort one attachment's parked read, wherever it is parked.
    pub async fn wake_up_attachment(&self, att_id: AttachId) -> Result<()> {
        let registry = self.inner.registry.read().await;
        let attachment = registry
            .attachments
            .get(&att_id)
            .cloned()
            .ok_or_else(|| EtError::Dead(format!("no such attachment {att_id}")))?;
        attachment.signal_wake();
        if let Some(station) = registry.by_id.get(&attachment.station_id()) {
            station.input().nudge();
        }
        registry.grand_central().input().nudge();
        Ok(())
    }

    /// Abort every read parked on a station's input list.
    pub async fn wake_up_all(&self, station_id: StationId) -> Result<()> {
        self.station(station_id).await?.input().wake_up_all();
        Ok(())
    }

    /// Draw fresh events from the free pool. The events stay registered to
    /// the attachment until they are put or dumped.
    pub async fn new_events(
        &self,
        att_id: AttachId,
        mode: GetMode,
        count: usize,
        size: usize,
        group: Option<u32>,
    ) -> Result<Vec<EventId>> {
        self.check_alive()?;
        let attachment = self.attachment(att_id).await?;
        if count == 0 {
            return Err(EtError::Error("cannot request zero events".into()));
        }
        if size > self.inner.config.event_size {
            return Err(EtError::Error(format!(
                "requested size {size} exceeds event capacity {}",
                self.inner.config.event_size
            )));
        }
        if let Some(group) = group {
            if group == 0 || group as usize > self.inner.config.groups.len() {
                return Err(EtError::Error(format!("no such event group {group}")));
            }
        }
        let grand_central = {
            let registry = self.inner.registry.read().await;
            Arc::clone(registry.grand_central())
        };
        self.record_histogram(grand_central.input().len());
        let mut events = match group {
            Some(group) => {
                grand_central
                    .input()
                    .get_by_group(&attachment, mode, count, group)
                    .await?
            }
            None => grand_central.input().get(&attachment, mode, count).await?,
        };
        let ids = events.iter().map(|event| event.id()).collect::<Vec<_>>();
        for event in &mut events {
            event.owner = Owner::Attachment(att_id);
            event.modify = ModifyFlags::HeaderAndData;
            event.age = Age::New;
            event.set_length(size)?;
        }
        attachment.bump_make(events.len() as u64);
        attachment.hold(events);
        Ok(ids)
    }

    /// Blocking read from the attachment's station input list. The events
    /// stay registered to the attachment until they are put or dumped.
    pub async fn get_events(
        &self,
        att_id: AttachId,
        mode: GetMode,
        modify: ModifyFlags,
        count: usize,
        group: Option<u32>,
    ) -> Result<Vec<EventId>> {
        self.check_alive()?;
        let attachment = self.attachment(att_id).await?;
        if count == 0 {
            return Err(EtError::Error("cannot request zero events".into()));
        }
        let station = self.station(attachment.station_id()).await?;
        let mut events = match group {
            Some(group) => {
                station
                    .input()
                    .get_by_group(&attachment, mode, count, group)
                    .await?
            }
            None => station.input().get(&attachment, mode, count).await?,
        };
        let ids = events.iter().map(|event| event.id()).collect::<Vec<_>>();
        for event in &mut events {
            event.owner = Owner::Attachment(att_id);
            event.modify = modify;
        }
        attachment.bump_get(events.len() as u64);
        attachment.hold(events);
        Ok(ids)
    }

    /// Access one event the attachment holds, to fill or serialize it.
    pub async fn with_held<R>(
        &self,
        att_id: AttachId,
        event_id: EventId,
        f: impl FnOnce(&mut Event) -> R,
    ) -> Result<R> {
        let attachment = self.attachment(att_id).await?;
        attachment.with_held(event_id, f)
    }

    /// Return held events into the station's output list, to be conducted
    /// downstream.
    pub async fn put_events(&self, att_id: AttachId, ids: &[EventId]) -> Result<()> {
        self.check_alive()?;
        let attachment = self.attachment(att_id).await?;
        let station = self.station(attachment.station_id()).await?;
        let mut events = attachment.release(ids)?;
        for event in &mut events {
            event.owner = Owner::System;
            event.age = Age::Used;
        }
        attachment.bump_put(events.len() as u64);
        station.output().put(events);
        Ok(())
    }

    /// Return held events straight to the free pool, bypassing the ring.
    pub async fn dump_events(&self, att_id: AttachId, ids: &[EventId]) -> Result<()> {
        self.check_alive()?;
        let attachment = self.attachment(att_id).await?;
        let mut events = attachment.release(ids)?;
        for event in &mut events {
            event.recycle();
        }
        attachment.bump_dump(events.len() as u64);
        let registry = self.inner.registry.read().await;
        registry.grand_central().input().put_in_gc(events);
        Ok(())
    }

    fn record_histogram(&self, available: usize) {
        let mut histogram = self.inner.histogram.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = available.min(self.inner.config.num_events);
        histogram[bucket] += 1;
    }

    /// Histogram of free-pool occupancy sampled at every `new_events`.
    pub fn histogram(&self) -> Vec<u64> {
        self.inner
            .histogram
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn station_count(&self) -> usize {
        self.inner.registry.read().await.by_id.len()
    }

    pub async fn attachment_count(&self) -> usize {
        self.inner.registry.read().await.attachments.len()
    }

    /// Full statistics view served by SYS_DATA. Takes the exclusive lock:
    /// conductors route under the shared lock, so this view never catches
    /// events mid-flight between lists and the pool-conservation identity
    /// holds in every snapshot.
    pub async fn snapshot(&self) -> SystemSnapshot {
        let registry = self.inner.registry.write().await;
        let mut stations = Vec::new();
        for (main, group) in registry.ring.iter().enumerate() {
            for (parallel, station) in group.iter().enumerate() {
                stations.push(StationSnapshot {
                    id: station.id(),
                    name: station.name().to_string(),
                    position: main,
                    parallel_position: parallel,
                    status: station.status(),
                    attachments: station.attachment_ids(),
                    config: station.config().clone(),
                    input: station.input().stats(),
                    output: station.output().stats(),
                });
            }
        }
        let mut attachments: Vec<AttachmentSnapshot> = registry
            .attachments
            .values()
            .map(|attachment| AttachmentSnapshot {
                id: attachment.id(),
                station_id: attachment.station_id(),
                pid: attachment.pid(),
                host: attachment.host().to_string(),
                waiting: attachment.is_waiting(),
                held: attachment.held_count(),
                stats: attachment.stats(),
            })
            .collect();
        attachments.sort_by_key(|snapshot| snapshot.id);
        SystemSnapshot {
            alive: self.is_alive(),
            heartbeat: self.heartbeat(),
            num_events: self.inner.config.num_events,
            event_size: self.inner.config.event_size,
            max_stations: self.inner.config.max_stations,
            max_attachments: self.inner.config.max_attachments,
            stations,
            attachments,
        }
    }

    /// Shut the broker down: poison every attachment, unpark every waiter,
    /// stop every conductor and wait for them.
    pub async fn close(&self) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            info!("closing event transport system");
        } else {
            return;
        }
        {
            let registry = self.inner.registry.read().await;
            for attachment in registry.attachments.values() {
                attachment.invalidate();
            }
            for group in &registry.ring {
                for station in group {
                    station.input().wake_up_all();
                    station.input().nudge();
                    station.output().nudge();
                }
            }
        }
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        let _ = futures::future::join_all(tasks).await;
    }
}

/// Place a station on the ring, enforcing positional bounds and parallel
/// compatibility. The caller owns the write lock.
fn insert_into_ring(
    registry: &mut Registry,
    station: Arc<Station>,
    position: Position,
    parallel_position: ParallelPosition,
) -> Result<()> {
    use et_protocol::FlowMode;

    let main_len = registry.ring.len();
    let main_pos = match position {
        Position::End => main_len,
        Position::At(p) if (1..=main_len).contains(&p) => p,
        Position::At(p) => {
            return Err(EtError::Error(format!(
                "position {p} outside [1, {main_len}]"
            )))
        }
    };

    if station.config().flow_mode == FlowMode::Serial || main_pos == main_len {
        // A serial station always forms its own slot; a parallel station
        // landing past the end starts a fresh group.
        registry.ring.insert(main_pos, vec![station]);
        return Ok(());
    }

    if parallel_position == ParallelPosition::NewHead {
        registry.ring.insert(main_pos, vec![station]);
        return Ok(());
    }

    let group = &mut registry.ring[main_pos];
    let head = Arc::clone(&group[0]);
    if head.config().flow_mode != FlowMode::Parallel {
        return Err(EtError::Error(format!(
            "station {} at position {main_pos} is not parallel",
            head.name()
        )));
    }
    let parallel_pos = match parallel_position {
        ParallelPosition::End | ParallelPosition::NewHead => group.len(),
        ParallelPosition::At(q) if q <= group.len() => q,
        ParallelPosition::At(q) => {
            return Err(EtError::Error(format!(
                "parallel position {q} outside [0, {}]",
                group.len()
            )))
        }
    };
    let compatible = if parallel_pos == 0 {
        // The newcomer becomes the head; the group must be able to follow
        // its policy.
        group
            .iter()
            .all(|member| member.config().compatible_with_head(station.config()))
    } else {
        station.config().compatible_with_head(head.config())
    };
    if !compatible {
        return Err(EtError::Error(format!(
            "station {} is incompatible with its parallel group",
            station.name()
        )));
    }
    group.insert(parallel_pos, station);
    Ok(())
}
