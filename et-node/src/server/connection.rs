// Copyright 2025 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! One connected client: the connect handshake, then a strict
//! request/response loop. Data-plane failures travel back as wire codes;
//! framing violations and socket errors tear the connection down, which
//! detaches the client's attachments and restores every event they held.

use crate::attachment::AttachId;
use crate::error::{EtError, Result};
use crate::event::EventId;
use crate::event_list::GetMode;
use crate::station::{StationConfig, StationId, StationStatus};
use crate::system::{EtSystem, ParallelPosition, Position};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use et_protocol::wire::{
    get_i32, get_i64, get_string, put_string, ConnectReply, ConnectRequest, CONNECT_REQUEST_BYTES,
};
use et_protocol::{cmd, ErrorCode, GetModeCode, ModifyFlags, ProtocolError, SELECT_INTS};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Socket read timeout; expiries while the system is alive are retried
/// transparently.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-event fixed part of an EVS_PUT record: id, reserved, length (i64),
/// pri_and_status, byte_order, reserved, control.
const PUT_RECORD_BYTES: usize = 4 + 4 + 8 + 4 + 4 + 4 + 4 * SELECT_INTS;

/// Upper bound on any length-prefixed string field.
const MAX_STRING: usize = 512;

pub(super) struct Connection {
    system: EtSystem,
    stream: TcpStream,
    peer: SocketAddr,
    attachments: Vec<AttachId>,
}

impl Connection {
    pub(super) fn new(system: EtSystem, stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            system,
            stream,
            peer,
            attachments: Vec::new(),
        }
    }

    pub(super) async fn run(mut self) {
        if let Err(err) = self.handshake().await {
            warn!("handshake with {} failed: {err}", self.peer);
            return;
        }
        loop {
            let command = match self.read_u32().await {
                Ok(command) => command,
                Err(EtError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("client {} hung up", self.peer);
                    break;
                }
                Err(err) => {
                    warn!("dropping client {}: {err}", self.peer);
                    break;
                }
            };
            match self.dispatch(command).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("client {} closed the session", self.peer);
                    break;
                }
                Err(err) => {
                    warn!("dropping client {}: {err}", self.peer);
                    break;
                }
            }
        }
        self.teardown().await;
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut frame = self.read_bytes(CONNECT_REQUEST_BYTES).await?;
        let request = ConnectRequest::decode(&mut frame)?;
        if let Err(err) = request.validate() {
            let mut buf = BytesMut::new();
            ConnectReply {
                err: ErrorCode::Error.value(),
                endian: 0,
                num_events: 0,
                event_size: 0,
                version: et_protocol::PROTOCOL_VERSION as i32,
                select_ints: SELECT_INTS as i32,
            }
            .encode(&mut buf);
            let _ = self.write_all(&buf).await;
            return Err(err.into());
        }
        let mut buf = BytesMut::new();
        ConnectReply {
            err: ErrorCode::Ok.value(),
            endian: 0,
            num_events: self.system.config().num_events as i32,
            event_size: self.system.config().event_size as i64,
            version: et_protocol::PROTOCOL_VERSION as i32,
            select_ints: SELECT_INTS as i32,
        }
        .encode(&mut buf);
        self.write_all(&buf).await
    }

    /// Dispatch one command. `Ok(false)` ends the session gracefully.
    async fn dispatch(&mut self, command: u32) -> Result<bool> {
        match command {
            cmd::CLOSE => {
                let mut buf = BytesMut::new();
                buf.put_i32(ErrorCode::Ok.value());
                self.write_all(&buf).await?;
                Ok(false)
            }
            cmd::ALIVE => {
                let mut buf = BytesMut::new();
                buf.put_i32(i32::from(self.system.is_alive()));
                self.write_all(&buf).await?;
                Ok(true)
            }
            cmd::WAKE_ATT => {
                let mut args = self.read_bytes(4).await?;
                let att = as_id(get_i32(&mut args, "att_id")?)?;
                if let Err(err) = self.system.wake_up_attachment(AttachId(att)).await {
                    debug!("wake_att from {} failed: {err}", self.peer);
                }
                Ok(true)
            }
            cmd::WAKE_ALL => {
                let mut args = self.read_bytes(4).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                if let Err(err) = self.system.wake_up_all(StationId(station)).await {
                    debug!("wake_all from {} failed: {err}", self.peer);
                }
                Ok(true)
            }
            cmd::STATION_CREATE_AT => self.station_create_at().await,
            cmd::STATION_REMOVE => {
                let mut args = self.read_bytes(4).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                let result = self.system.remove_station(StationId(station)).await;
                self.write_err_only(result).await
            }
            cmd::STATION_SET_POS => {
                let mut args = self.read_bytes(12).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                let position = get_i32(&mut args, "position")?;
                let parallel = get_i32(&mut args, "parallel_position")?;
                let result = self.set_station_position(station, position, parallel).await;
                self.write_err_only(result).await
            }
            cmd::STATION_GET_POS => {
                let mut args = self.read_bytes(4).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                let mut buf = BytesMut::new();
                match self.system.get_station_position(StationId(station)).await {
                    Ok((position, parallel)) => {
                        buf.put_i32(ErrorCode::Ok.value());
                        buf.put_i32(position as i32);
                        buf.put_i32(parallel as i32);
                    }
                    Err(err) => buf.put_i32(err.code().value()),
                }
                self.write_all(&buf).await?;
                Ok(true)
            }
            cmd::STATION_EXISTS => {
                let mut args = self.read_bytes(4).await?;
                let name_len = get_i32(&mut args, "name_len")? as usize;
                let name = self.read_string_field(name_len, "station name").await?;
                let mut buf = BytesMut::new();
                match self.system.station_exists(&name).await {
                    Some(id) => {
                        buf.put_i32(1);
                        buf.put_i32(id.0 as i32);
                    }
                    None => {
                        buf.put_i32(0);
                        buf.put_i32(0);
                    }
                }
                self.write_all(&buf).await?;
                Ok(true)
            }
            cmd::STATION_ATTACH => {
                let mut args = self.read_bytes(12).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                let pid = get_i32(&mut args, "pid")?;
                let host_len = get_i32(&mut args, "host_len")? as usize;
                let host = self.read_string_field(host_len, "host").await?;
                let mut buf = BytesMut::new();
                match self.system.attach(StationId(station), &host, pid).await {
                    Ok(attachment) => {
                        self.attachments.push(attachment.id());
                        buf.put_i32(ErrorCode::Ok.value());
                        buf.put_i32(attachment.id().0 as i32);
                    }
                    Err(err) => {
                        buf.put_i32(err.code().value());
                        buf.put_i32(0);
                    }
                }
                self.write_all(&buf).await?;
                Ok(true)
            }
            cmd::STATION_DETACH => {
                let mut args = self.read_bytes(4).await?;
                let att = AttachId(as_id(get_i32(&mut args, "att_id")?)?);
                let result = self.system.detach(att).await;
                self.attachments.retain(|&id| id != att);
                self.write_err_only(result).await
            }
            cmd::STATION_IS_ATTACHED => {
                let mut args = self.read_bytes(8).await?;
                let station = as_id(get_i32(&mut args, "station_id")?)?;
                let att = as_id(get_i32(&mut args, "att_id")?)?;
                let mut buf = BytesMut::new();
                match self
                    .system
                    .is_attached(StationId(station), AttachId(att))
                    .await
                {
                    Ok(attached) => buf.put_i32(i32::from(attached)),
                    Err(err) => buf.put_i32(err.code().value()),
                }
                self.write_all(&buf).await?;
                Ok(true)
            }
            cmd::EVS_NEW_GRP => self.events_new().await,
            cmd::EVS_GET => self.events_get().await,
            cmd::EVS_PUT => self.events_put().await,
            cmd::EVS_DUMP => self.events_dump().await,
            cmd::SYS_DATA => self.sys_data().await,
            cmd::SYS_HISTOGRAM => self.sys_histogram().await,
            cmd::SYS_STATIONS => {
                let value = self.system.station_count().await as i32;
                self.write_scalar(value).await
            }
            cmd::SYS_STATIONS_MAX => {
                let value = self.system.config().max_stations as i32;
                self.write_scalar(value).await
            }
            cmd::SYS_ATTACHMENTS => {
                let value = self.system.attachment_count().await as i32;
                self.write_scalar(value).await
            }
            cmd::SYS_ATTACHMENTS_MAX => {
                let value = self.system.config().max_attachments as i32;
                self.write_scalar(value).await
            }
            // Native processes and temporary events belong to the mapped
            // shared-memory world; a socket server has none.
            cmd::SYS_PROCS | cmd::SYS_PROCS_MAX | cmd::SYS_TEMPS | cmd::SYS_TEMPS_MAX => {
                self.write_scalar(0).await
            }
            cmd::SYS_HEARTBEAT => {
                let value = self.system.heartbeat() as i32;
                self.write_scalar(value).await
            }
            cmd::SYS_PID => self.write_scalar(self.system.pid()).await,
            other => Err(ProtocolError::UnknownCommand(other).into()),
        }
    }

    async fn station_create_at(&mut self) -> Result<bool> {
        let mut args = self.read_bytes(80).await?;
        let _struct_ok = get_i32(&mut args, "struct_ok")?;
        let flow = get_i32(&mut args, "flow")?;
        let user = get_i32(&mut args, "user")?;
        let restore = get_i32(&mut args, "restore")?;
        let block = get_i32(&mut args, "block")?;
        let prescale = get_i32(&mut args, "prescale")?;
        let cue = get_i32(&mut args, "cue")?;
        let select_mode = get_i32(&mut args, "select_mode")?;
        let mut select = [0i32; SELECT_INTS];
        for word in select.iter_mut() {
            *word = get_i32(&mut args, "select")?;
        }
        let func_len = get_i32(&mut args, "func_len")? as usize;
        let lib_len = get_i32(&mut args, "lib_len")? as usize;
        let class_len = get_i32(&mut args, "class_len")? as usize;
        let name_len = get_i32(&mut args, "name_len")? as usize;
        let position = get_i32(&mut args, "position")?;
        let parallel_position = get_i32(&mut args, "parallel_position")?;
        let func = self.read_optional_string(func_len, "select function").await?;
        let lib = self.read_optional_string(lib_len, "select library").await?;
        let class = self.read_optional_string(class_len, "select class").await?;
        let name = self.read_string_field(name_len, "station name").await?;

        let result = match self.build_station_config(
            flow,
            user,
            restore,
            block,
            prescale,
            cue,
            select_mode,
            select,
            func,
            lib,
            class,
        ) {
            Ok(config) => {
                let position = Position::from_wire(position);
                let parallel = ParallelPosition::from_wire(parallel_position);
                match (position, parallel) {
                    (Ok(position), Ok(parallel)) => {
                        self.system
                            .create_station(&name, config, position, parallel)
                            .await
                    }
                    (Err(err), _) | (_, Err(err)) => Err(err),
                }
            }
            Err(err) => Err(err),
        };

        let mut buf = BytesMut::new();
        match result {
            Ok(id) => {
                buf.put_i32(ErrorCode::Ok.value());
                buf.put_i32(id.0 as i32);
            }
            Err(err) => {
                debug!("station create from {} refused: {err}", self.peer);
                buf.put_i32(err.code().value());
                buf.put_i32(0);
            }
        }
        self.write_all(&buf).await?;
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_station_config(
        &self,
        flow: i32,
        user: i32,
        restore: i32,
        block: i32,
        prescale: i32,
        cue: i32,
        select_mode: i32,
        select: [i32; SELECT_INTS],
        func: Option<String>,
        lib: Option<String>,
        class: Option<String>,
    ) -> Result<StationConfig> {
        let bad = |field: &str, value: i32| EtError::Error(format!("bad {field} value {value}"));
        Ok(StationConfig {
            flow_mode: et_protocol::FlowMode::from_index(flow as u32)
                .ok_or_else(|| bad("flow mode", flow))?,
            block_mode: et_protocol::BlockMode::from_index(block as u32)
                .ok_or_else(|| bad("block mode", block))?,
            select_mode: et_protocol::SelectMode::from_index(select_mode as u32)
                .ok_or_else(|| bad("select mode", select_mode))?,
            restore_mode: et_protocol::RestoreMode::from_index(restore as u32)
                .ok_or_else(|| bad("restore mode", restore))?,
            user_mode: u32::try_from(user).map_err(|_| bad("user mode", user))?,
            prescale: u32::try_from(prescale).map_err(|_| bad("prescale", prescale))?,
            cue: usize::try_from(cue).map_err(|_| bad("cue", cue))?,
            select,
            select_function: func,
            select_library: lib,
            select_class: class,
        })
    }

    async fn set_station_position(
        &mut self,
        station: u32,
        position: i32,
        parallel: i32,
    ) -> Result<()> {
        let position = Position::from_wire(position)?;
        let parallel = ParallelPosition::from_wire(parallel)?;
        self.system
            .set_station_position(StationId(station), position, parallel)
            .await
    }

    async fn events_new(&mut self) -> Result<bool> {
        let mut args = self.read_bytes(32).await?;
        let att = AttachId(as_id(get_i32(&mut args, "att_id")?)?);
        let mode = get_i32(&mut args, "mode")?;
        let size = get_i64(&mut args, "size")?;
        let count = get_i32(&mut args, "count")?;
        let group = get_i32(&mut args, "group")?;
        let sec = get_i32(&mut args, "sec")?;
        let nsec = get_i32(&mut args, "nsec")?;

        let result = match decode_mode(mode, sec, nsec) {
            Ok(mode) => {
                let group = if group > 0 { Some(group as u32) } else { None };
                self.system
                    .new_events(att, mode, count.max(0) as usize, size.max(0) as usize, group)
                    .await
            }
            Err(err) => Err(err),
        };
        let mut buf = BytesMut::new();
        match result {
            Ok(ids) => {
                buf.put_i32(ids.len() as i32);
                for id in ids {
                    buf.put_i32(id.0 as i32);
                }
            }
            Err(err) => buf.put_i32(err.code().value()),
        }
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn events_get(&mut self) -> Result<bool> {
        let mut args = self.read_bytes(24).await?;
        let att = AttachId(as_id(get_i32(&mut args, "att_id")?)?);
        let wait = get_i32(&mut args, "wait")?;
        let modify = get_i32(&mut args, "modify")?;
        let count = get_i32(&mut args, "count")?;
        let sec = get_i32(&mut args, "sec")?;
        let nsec = get_i32(&mut args, "nsec")?;

        let result = match decode_mode(wait, sec, nsec) {
            Ok(mode) => {
                let modify = ModifyFlags::from_bits(modify as u32);
                self.system
                    .get_events(att, mode, modify, count.max(0) as usize, None)
                    .await
            }
            Err(err) => Err(err),
        };
        let ids = match result {
            Ok(ids) => ids,
            Err(err) => {
                let mut buf = BytesMut::new();
                buf.put_i32(err.code().value());
                self.write_all(&buf).await?;
                return Ok(true);
            }
        };

        // Consumers always see the payload; the modify flag only governs
        // what comes back on the matching put.
        let mut payload = BytesMut::new();
        for id in &ids {
            self.system
                .with_held(att, *id, |event| {
                    event.to_header().encode(&mut payload);
                    payload.put_slice(event.data());
                })
                .await?;
        }
        let mut buf = BytesMut::new();
        buf.put_i32(ids.len() as i32);
        buf.put_i64(payload.len() as i64);
        buf.extend_from_slice(&payload);
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn events_put(&mut self) -> Result<bool> {
        let mut args = self.read_bytes(16).await?;
        let att = AttachId(as_id(get_i32(&mut args, "att_id")?)?);
        let count = get_i32(&mut args, "count")?;
        let _total_bytes = get_i64(&mut args, "total_bytes")?;
        if count < 0 {
            return Err(ProtocolError::InvalidValue {
                field: "event count",
                value: count as i64,
            }
            .into());
        }

        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut record = self.read_bytes(PUT_RECORD_BYTES).await?;
            let id = EventId(as_id(get_i32(&mut record, "event id")?)?);
            let _reserved = get_i32(&mut record, "reserved")?;
            let length = get_i64(&mut record, "length")?;
            let pri_and_status = get_i32(&mut record, "pri_and_status")?;
            let byte_order = get_i32(&mut record, "byte_order")?;
            let _reserved = get_i32(&mut record, "reserved")?;
            let mut control = [0i32; SELECT_INTS];
            for word in control.iter_mut() {
                *word = get_i32(&mut record, "control")?;
            }
            if length < 0 || length as usize > self.system.config().event_size {
                return Err(ProtocolError::InvalidValue {
                    field: "event length",
                    value: length,
                }
                .into());
            }

            // Whether payload bytes follow depends on what this client
            // declared when it drew the event; a mismatch desynchronises
            // the stream, so an unknown id is fatal here.
            let modify = self.system.with_held(att, id, |event| event.modify).await?;
            let data = if modify == ModifyFlags::HeaderAndData {
                Some(self.read_bytes(length as usize).await?)
            } else {
                None
            };
            if modify != ModifyFlags::Nothing {
                let header = et_protocol::EventHeader {
                    length,
                    mem_size: self.system.config().event_size as i64,
                    pri_and_status,
                    id: id.0 as i32,
                    byte_order,
                    control,
                };
                self.system
                    .with_held(att, id, |event| -> Result<()> {
                        event.apply_header(&header)?;
                        if let Some(data) = &data {
                            event.data_mut()[..data.len()].copy_from_slice(data);
                        }
                        Ok(())
                    })
                    .await??;
            }
            ids.push(id);
        }

        let result = self.system.put_events(att, &ids).await;
        self.write_err_only(result).await
    }

    async fn events_dump(&mut self) -> Result<bool> {
        let mut args = self.read_bytes(8).await?;
        let att = AttachId(as_id(get_i32(&mut args, "att_id")?)?);
        let count = get_i32(&mut args, "count")?;
        if count < 0 {
            return Err(ProtocolError::InvalidValue {
                field: "event count",
                value: count as i64,
            }
            .into());
        }
        let mut raw = self.read_bytes(count as usize * 4).await?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(EventId(as_id(get_i32(&mut raw, "event id")?)?));
        }
        let result = self.system.dump_events(att, &ids).await;
        self.write_err_only(result).await
    }

    async fn sys_data(&mut self) -> Result<bool> {
        let snapshot = self.system.snapshot().await;
        let mut body = BytesMut::new();
        body.put_i32(i32::from(snapshot.alive));
        body.put_i32(snapshot.heartbeat as i32);
        body.put_i32(snapshot.num_events as i32);
        body.put_i64(snapshot.event_size as i64);
        body.put_i32(snapshot.max_stations as i32);
        body.put_i32(snapshot.stations.len() as i32);
        body.put_i32(snapshot.max_attachments as i32);
        body.put_i32(snapshot.attachments.len() as i32);
        body.put_i32(self.system.pid());
        body.put_i32(i32::from(self.system.config().port));

        body.put_i32(snapshot.stations.len() as i32);
        for station in &snapshot.stations {
            body.put_i32(station.id.0 as i32);
            body.put_i32(station.position as i32);
            body.put_i32(station.parallel_position as i32);
            body.put_i32(i32::from(station.status == StationStatus::Active));
            body.put_i32(station.attachments.len() as i32);
            body.put_i32(station.config.flow_mode.get_index() as i32);
            body.put_i32(station.config.user_mode as i32);
            body.put_i32(station.config.restore_mode.get_index() as i32);
            body.put_i32(station.config.block_mode.get_index() as i32);
            body.put_i32(station.config.prescale as i32);
            body.put_i32(station.config.cue.min(i32::MAX as usize) as i32);
            body.put_i32(station.config.select_mode.get_index() as i32);
            for word in &station.config.select {
                body.put_i32(*word);
            }
            body.put_i32(station.input.len as i32);
            body.put_i64(station.input.events_try as i64);
            body.put_i64(station.input.events_in as i64);
            body.put_i64(station.input.events_out as i64);
            body.put_i32(station.output.len as i32);
            body.put_i64(station.output.events_in as i64);
            body.put_i64(station.output.events_out as i64);
            body.put_i32(station.output.last_high as i32);
            let mut name = BytesMut::new();
            let name_len = put_string(&mut name, &station.name);
            body.put_i32(name_len as i32);
            body.extend_from_slice(&name);
        }

        body.put_i32(snapshot.attachments.len() as i32);
        for attachment in &snapshot.attachments {
            body.put_i32(attachment.id.0 as i32);
            body.put_i32(attachment.station_id.0 as i32);
            body.put_i32(attachment.pid);
            body.put_i32(i32::from(attachment.waiting));
            body.put_i64(attachment.stats.events_make as i64);
            body.put_i64(attachment.stats.events_get as i64);
            body.put_i64(attachment.stats.events_put as i64);
            body.put_i64(attachment.stats.events_dump as i64);
            let mut host = BytesMut::new();
            let host_len = put_string(&mut host, &attachment.host);
            body.put_i32(host_len as i32);
            body.extend_from_slice(&host);
        }

        // No native processes on a socket-only host.
        body.put_i32(0);

        let mut buf = BytesMut::new();
        buf.put_i32(ErrorCode::Ok.value());
        buf.put_i32(body.len() as i32);
        buf.extend_from_slice(&body);
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn sys_histogram(&mut self) -> Result<bool> {
        let histogram = self.system.histogram();
        let mut buf = BytesMut::new();
        buf.put_i32(ErrorCode::Ok.value());
        for bucket in histogram {
            buf.put_i32(bucket.min(i32::MAX as u64) as i32);
        }
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn teardown(&mut self) {
        for att in std::mem::take(&mut self.attachments) {
            match self.system.detach(att).await {
                Ok(()) => debug!("reclaimed {att} from {}", self.peer),
                Err(err) => debug!("teardown of {att} from {}: {err}", self.peer),
            }
        }
    }

    async fn write_err_only(&mut self, result: Result<()>) -> Result<bool> {
        let mut buf = BytesMut::new();
        match result {
            Ok(()) => buf.put_i32(ErrorCode::Ok.value()),
            Err(err) => {
                debug!("request from {} refused: {err}", self.peer);
                buf.put_i32(err.code().value());
            }
        }
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn write_scalar(&mut self, value: i32) -> Result<bool> {
        let mut buf = BytesMut::new();
        buf.put_i32(ErrorCode::Ok.value());
        buf.put_i32(value);
        self.write_all(&buf).await?;
        Ok(true)
    }

    async fn read_optional_string(
        &mut self,
        len: usize,
        context: &'static str,
    ) -> Result<Option<String>> {
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(self.read_string_field(len, context).await?))
    }

    async fn read_string_field(&mut self, len: usize, context: &'static str) -> Result<String> {
        if len > MAX_STRING {
            return Err(ProtocolError::InvalidValue {
                field: context,
                value: len as i64,
            }
            .into());
        }
        let mut raw = self.read_bytes(len).await?;
        Ok(get_string(&mut raw, len, context)?)
    }

    async fn read_u32(&mut self) -> Result<u32> {
        let mut raw = self.read_bytes(4).await?;
        Ok(raw.get_u32())
    }

    /// Read exactly `n` bytes. Timeouts are transparent retries while the
    /// system lives; they turn into `Dead` once it closes, so workers of a
    /// closed system drain away even with silent clients.
    async fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match tokio::time::timeout(READ_TIMEOUT, self.stream.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    return Err(EtError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the connection",
                    )))
                }
                Ok(Ok(read)) => filled += read,
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => {
                    if !self.system.is_alive() {
                        return Err(EtError::Dead("system closed".into()));
                    }
                }
            }
        }
        Ok(Bytes::from(buf))
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Ids travel as non-negative i32s.
fn as_id(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        EtError::Protocol(ProtocolError::InvalidValue {
            field: "id",
            value: value as i64,
        })
    })
}

/// (mode, sec, nsec) triple into a `GetMode`.
fn decode_mode(mode: i32, sec: i32, nsec: i32) -> Result<GetMode> {
    let code = GetModeCode::from_index(mode as u32).ok_or(ProtocolError::InvalidValue {
        field: "wait mode",
        value: mode as i64,
    })?;
    Ok(match code {
        GetModeCode::Sleep => GetMode::Sleep,
        GetModeCode::Async => GetMode::Async,
        GetModeCode::Timed => {
            GetMode::Timed(Duration::new(sec.max(0) as u64, nsec.max(0) as u32))
        }
    })
}
