// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The framed TCP front end: one accept task per listener, one worker task
//! per connected client, requests strictly serialised per connection.

mod connection;

use crate::error::Result;
use crate::system::EtSystem;
use connection::Connection;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How often the accept loop checks whether the system went away.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

/// A listening protocol server. Workers live as long as their client or
/// the system, whichever goes first.
pub struct Server {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind and start accepting clients for `system`.
    pub async fn bind(system: EtSystem, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("event transport server listening on {local_addr}");
        let accept_task = tokio::spawn(accept_loop(system, listener));
        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new clients. Existing workers wind down on their own
    /// once the system closes or their client hangs up.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(system: EtSystem, listener: TcpListener) {
    loop {
        match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("client connected from {peer}");
                if let Err(err) = stream.set_nodelay(true) {
                    warn!("could not disable buffering for {peer}: {err}");
                }
                let system = system.clone();
                tokio::spawn(async move {
                    Connection::new(system, stream, peer).run().await;
                });
            }
            Ok(Err(err)) => {
                error!("accept failed, stopping server: {err}");
                break;
            }
            Err(_) => {
                if !system.is_alive() {
                    debug!("system closed, stopping accept loop");
                    break;
                }
            }
        }
    }
}
