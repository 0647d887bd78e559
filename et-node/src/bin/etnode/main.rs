// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The `etnode` binary: boots an Event Transport broker and serves it over
//! TCP until interrupted.

mod log;

use clap::Parser;
use color_eyre::eyre::Result;
use et_node::{EtSystem, Server, SystemConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "etnode", about = "Event Transport broker node", version)]
struct Opt {
    /// JSON configuration file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port the protocol server listens on.
    #[arg(long)]
    port: Option<u16>,

    /// IP address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    ip: IpAddr,

    /// Number of events in the pool.
    #[arg(long)]
    num_events: Option<usize>,

    /// Capacity of each event buffer in bytes.
    #[arg(long)]
    event_size: Option<usize>,

    /// Comma-separated event-group sizes; must sum to the pool size.
    #[arg(long, value_delimiter = ',')]
    groups: Option<Vec<usize>>,

    /// Maximum number of stations, GRAND_CENTRAL included.
    #[arg(long)]
    max_stations: Option<usize>,

    /// Maximum number of attachments across all stations.
    #[arg(long)]
    max_attachments: Option<usize>,

    /// Directory for rolling log files; stdout only when absent.
    #[arg(long)]
    log_output_dest: Option<PathBuf>,
}

impl Opt {
    fn into_config(self) -> Result<(SystemConfig, IpAddr, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => SystemConfig::load(path)?,
            None => SystemConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(num_events) = self.num_events {
            config.num_events = num_events;
            // A bare pool-size override keeps a single group covering it.
            if self.groups.is_none() {
                config.groups = vec![num_events];
            }
        }
        if let Some(event_size) = self.event_size {
            config.event_size = event_size;
        }
        if let Some(groups) = self.groups.clone() {
            config.groups = groups;
        }
        if let Some(max_stations) = self.max_stations {
            config.max_stations = max_stations;
        }
        if let Some(max_attachments) = self.max_attachments {
            config.max_attachments = max_attachments;
        }
        config.validate()?;
        Ok((config, self.ip, self.log_output_dest))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    let (config, ip, log_dir) = opt.into_config()?;
    let _log_guard = log::init(log_dir.as_deref())?;

    let system = EtSystem::start(config.clone())?;
    let server = Server::bind(system.clone(), SocketAddr::new(ip, config.port)).await?;
    info!("etnode serving on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.shutdown();
    system.close().await;
    Ok(())
}
