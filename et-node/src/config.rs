// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! System-wide configuration: pool geometry, limits and the listening port.

use crate::error::{EtError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of events in the pool.
pub const DEFAULT_NUM_EVENTS: usize = 300;
/// Default event buffer capacity in bytes.
pub const DEFAULT_EVENT_SIZE: usize = 128;
/// Default station limit, GRAND_CENTRAL included.
pub const DEFAULT_MAX_STATIONS: usize = 200;
/// Default attachment limit across all stations.
pub const DEFAULT_MAX_ATTACHMENTS: usize = 110;
/// Default TCP port of the protocol server.
pub const DEFAULT_PORT: u16 = 11111;

/// Broker configuration, loadable from a JSON file with per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SystemConfig {
    pub num_events: usize,
    pub event_size: usize,
    /// Sizes of the static group partitions, in group order (group numbers
    /// start at 1). Must sum to `num_events`.
    pub groups: Vec<usize>,
    pub max_stations: usize,
    pub max_attachments: usize,
    pub port: u16,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_events: DEFAULT_NUM_EVENTS,
            event_size: DEFAULT_EVENT_SIZE,
            groups: vec![DEFAULT_NUM_EVENTS],
            max_stations: DEFAULT_MAX_STATIONS,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            port: DEFAULT_PORT,
        }
    }
}

impl SystemConfig {
    /// Load from a JSON file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| EtError::Error(format!("bad config file: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_events == 0 {
            return Err(EtError::Error("num_events must be nonzero".into()));
        }
        if self.event_size == 0 {
            return Err(EtError::Error("event_size must be nonzero".into()));
        }
        if self.max_stations < 2 {
            return Err(EtError::Error(
                "max_stations must admit at least one station beyond GRAND_CENTRAL".into(),
            ));
        }
        if self.max_attachments == 0 {
            return Err(EtError::Error("max_attachments must be nonzero".into()));
        }
        if self.groups.is_empty() {
            return Err(EtError::Error("at least one event group is required".into()));
        }
        if self.groups.iter().any(|&size| size == 0) {
            return Err(EtError::Error("event groups must be non-empty".into()));
        }
        let total: usize = self.groups.iter().sum();
        if total != self.num_events {
            return Err(EtError::Error(format!(
                "group sizes sum to {total}, expected num_events {}",
                self.num_events
            )));
        }
        Ok(())
    }

    /// Group number (1-based) for each event id, laid out partition after
    /// partition.
    pub fn group_of(&self, event_index: usize) -> u32 {
        let mut index = event_index;
        for (group, &size) in self.groups.iter().enumerate() {
            if index < size {
                return group as u32 + 1;
            }
            index -= size;
        }
        self.groups.len() as u32
    }
}
