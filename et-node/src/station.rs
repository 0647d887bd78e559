// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Stations: named nodes on the transport ring, each with a configuration,
//! a selection predicate, an input list and an output list.

use crate::attachment::AttachId;
use crate::error::{EtError, Result};
use crate::event::Event;
use crate::event_list::EventList;
use et_protocol::{BlockMode, FlowMode, RestoreMode, SelectMode, SELECT_INTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stable station identifier. GRAND_CENTRAL is always id 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(pub u32);

/// The root station's id.
pub const GRAND_CENTRAL_ID: StationId = StationId(0);

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "st{}", self.0)
    }
}

/// A pluggable user selection predicate: `(event, station config) -> accept`.
pub type SelectFn = dyn Fn(&Event, &StationConfig) -> bool + Send + Sync;

/// Whether a station takes part in routing. A station with no attachments
/// is idle and events flow past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    Idle,
    Active,
}

/// Full station configuration, as carried by STATION_CREATE_AT.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationConfig {
    pub flow_mode: FlowMode,
    pub block_mode: BlockMode,
    pub select_mode: SelectMode,
    pub restore_mode: RestoreMode,
    /// Maximum simultaneous attachments; 0 means unlimited.
    pub user_mode: u32,
    /// Accept one of every `prescale` passing events.
    pub prescale: u32,
    /// Advisory input-list limit for non-blocking stations; clamped to the
    /// pool size at creation.
    pub cue: usize,
    pub select: [i32; SELECT_INTS],
    /// Name of the user predicate, resolved against the host registry.
    pub select_function: Option<String>,
    /// Shared-library name, carried opaquely for non-native hosts.
    pub select_library: Option<String>,
    /// Class name, carried opaquely for non-native hosts.
    pub select_class: Option<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            flow_mode: FlowMode::Serial,
            block_mode: BlockMode::Blocking,
            select_mode: SelectMode::All,
            restore_mode: RestoreMode::ToGrandCentral,
            user_mode: 0,
            prescale: 1,
            cue: usize::MAX,
            select: [0; SELECT_INTS],
            select_function: None,
            select_library: None,
            select_class: None,
        }
    }
}

impl StationConfig {
    /// Self-consistency checks applied at station create and move.
    pub fn validate(&self) -> Result<()> {
        if self.prescale == 0 {
            return Err(EtError::Error("prescale must be at least 1".into()));
        }
        if self.cue == 0 {
            return Err(EtError::Error("cue must be at least 1".into()));
        }
        if self.select_mode == SelectMode::User && self.select_function.is_none() {
            return Err(EtError::Error(
                "user select mode requires a predicate name".into(),
            ));
        }
        if self.flow_mode == FlowMode::Parallel {
            if self.block_mode != BlockMode::Blocking {
                return Err(EtError::Error(
                    "parallel stations must be blocking".into(),
                ));
            }
            if self.prescale != 1 {
                return Err(EtError::Error(
                    "parallel stations must have prescale 1".into(),
                ));
            }
            if self.restore_mode == RestoreMode::ToInput {
                return Err(EtError::Error(
                    "parallel stations cannot restore to input".into(),
                ));
            }
        }
        Ok(())
    }

    /// Whether this configuration may join a parallel group led by `head`.
    pub fn compatible_with_head(&self, head: &StationConfig) -> bool {
        match head.select_mode {
            SelectMode::RoundRobin | SelectMode::EqualCue => {
                self.select_mode == head.select_mode
            }
            SelectMode::User => {
                self.select_mode == SelectMode::User && self.select == head.select
            }
            _ => true,
        }
    }
}

pub struct Station {
    id: StationId,
    name: String,
    config: StationConfig,
    input: EventList,
    output: EventList,
    attachments: Mutex<BTreeSet<AttachId>>,
    user_select: Option<Arc<SelectFn>>,
    /// Rotating pointer used when this station heads a round-robin group.
    rr_cursor: AtomicUsize,
    removed: AtomicBool,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Station {
    pub fn new(
        id: StationId,
        name: String,
        config: StationConfig,
        user_select: Option<Arc<SelectFn>>,
    ) -> Self {
        Self {
            id,
            name,
            config,
            input: EventList::new(),
            output: EventList::new(),
            attachments: Mutex::new(BTreeSet::new()),
            user_select,
            rr_cursor: AtomicUsize::new(0),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn input(&self) -> &EventList {
        &self.input
    }

    pub fn output(&self) -> &EventList {
        &self.output
    }

    pub fn is_grand_central(&self) -> bool {
        self.id == GRAND_CENTRAL_ID
    }

    pub fn status(&self) -> StationStatus {
        if self.attachment_count() > 0 {
            StationStatus::Active
        } else {
            StationStatus::Idle
        }
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn attachment_ids(&self) -> Vec<AttachId> {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn has_attachment(&self, id: AttachId) -> bool {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
    }

    /// Admit a new attachment, honouring the user-mode cap.
    pub fn add_attachment(&self, id: AttachId) -> Result<()> {
        let mut atts = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        if self.config.user_mode != 0 && atts.len() >= self.config.user_mode as usize {
            return Err(EtError::TooMany(format!(
                "station {} allows {} attachments",
                self.name, self.config.user_mode
            )));
        }
        atts.insert(id);
        Ok(())
    }

    pub fn remove_attachment(&self, id: AttachId) {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Advance the round-robin cursor over `len` members.
    pub fn next_rr(&self, len: usize) -> usize {
        self.rr_cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
        self.input.nudge();
        self.output.nudge();
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// The station's own acceptance predicate. Group distribution modes
    /// carry no filter of their own.
    pub fn selects(&self, event: &Event) -> bool {
        match self.config.select_mode {
            SelectMode::All | SelectMode::RoundRobin | SelectMode::EqualCue => true,
            SelectMode::Match => matches_select(&self.config.select, &event.control),
            SelectMode::User => match &self.user_select {
                Some(predicate) => predicate(event, &self.config),
                None => false,
            },
        }
    }
}

/// The match rule: at every position where the station select word is
/// nonzero, the bitwise AND with the event control word must be nonzero.
pub fn matches_select(select: &[i32; SELECT_INTS], control: &[i32; SELECT_INTS]) -> bool {
    select
        .iter()
        .zip(control.iter())
        .all(|(s, c)| *s == 0 || (s & c) != 0)
}
