//! Implementation of the modern (1.7+) status query.
//! [Server List Ping](https://wiki.vg/Server_List_Ping#Current_(1.7+))

use std::time::Instant;

use tokio::{io::AsyncWriteExt, net::TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{AsyncPingable, Deadline, Pinger, Resolve};
use crate::{Error, PingResult, ServerAddress, packet, varint};

const READ_CHUNK: usize = 4096;

/// Where a modern status query currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModernState {
    Connecting,
    Handshaking,
    AwaitingLength,
    ReadingBody,
    Parsing,
    Done,
    Failed,
}

impl ModernState {
    /// The error a deadline expiring in this state turns into.
    const fn timeout(self) -> Error {
        match self {
            Self::Connecting => Error::ConnectTimeout,
            _ => Error::ReadTimeout,
        }
    }
}

/// A single modern status query against one server.
#[derive(Debug)]
pub struct Modern<'a, R> {
    pinger: &'a Pinger<R>,
    address: &'a ServerAddress,
    cancel: CancellationToken,
    state: ModernState,
}

impl<'a, R: Resolve> Modern<'a, R> {
    pub(super) const fn new(
        pinger: &'a Pinger<R>,
        address: &'a ServerAddress,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pinger,
            address,
            cancel,
            state: ModernState::Connecting,
        }
    }

    /// The current step. `ping` consumes the query, so from outside this is
    /// always [`ModernState::Connecting`]; later states show up in trace logs.
    pub const fn state(&self) -> ModernState {
        self.state
    }

    fn enter(&mut self, state: ModernState) {
        trace!(target: "mcslp::ping", address = %self.address, from = ?self.state, to = ?state, "state");
        self.state = state;
    }

    async fn run(&mut self, deadline: &Deadline) -> Result<PingResult, Error> {
        let pinger = self.pinger;
        let address = self.address;
        let handshake =
            packet::handshake(&address.host, address.port, pinger.config.protocol_version)?;

        debug!(target: "mcslp::ping", %address, "connecting");
        let mut stream = pinger
            .connector
            .connect(&address.host, address.port, deadline.token())
            .await?;

        self.enter(ModernState::Handshaking);
        deadline.write_all(&mut stream, &handshake).await?;
        debug!(target: "mcslp::ping", len = handshake.len(), "handshake sent");
        let request = packet::status_request();
        deadline.write_all(&mut stream, &request).await?;
        debug!(target: "mcslp::ping", len = request.len(), "status request sent");

        self.enter(ModernState::AwaitingLength);
        let started = Instant::now();
        let frame_len = varint::read(&mut stream, deadline.token()).await? as usize;
        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(target: "mcslp::ping", frame_len, latency, "response length read");

        self.enter(ModernState::ReadingBody);
        let body = read_body(&mut stream, frame_len, deadline).await?;
        close(stream).await;

        self.enter(ModernState::Parsing);
        let (packet_id, json) = packet::split_response(&body)?;
        trace!(target: "mcslp::ping", packet_id, "status response");
        PingResult::from_status_json(&json, latency)
    }
}

/// Collects exactly `len` bytes, however the stream chunks them.
async fn read_body(
    stream: &mut TcpStream,
    len: usize,
    deadline: &Deadline,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::with_capacity(len.min(READ_CHUNK * 16));
    let mut chunk = [0u8; READ_CHUNK];
    while body.len() < len {
        let want = (len - body.len()).min(READ_CHUNK);
        let read = deadline.read(stream, &mut chunk[..want]).await?;
        if read == 0 {
            return Err(Error::ProtocolViolation(format!(
                "response frame declares {len} bytes but the stream ended after {}",
                body.len()
            )));
        }
        body.extend_from_slice(&chunk[..read]);
    }
    Ok(body)
}

async fn close(mut stream: TcpStream) {
    if let Err(e) = stream.shutdown().await {
        trace!(target: "mcslp::ping", error = %e, "shutdown failed");
    }
}

impl<R: Resolve> AsyncPingable for Modern<'_, R> {
    type Response = PingResult;

    async fn ping(mut self) -> Result<(u64, Self::Response), Error> {
        let deadline = Deadline::start(&self.cancel, self.pinger.config.timeout);
        match self.run(&deadline).await {
            Ok(result) => {
                self.enter(ModernState::Done);
                Ok((result.latency_ms, result))
            }
            Err(e) => {
                let e = deadline.explain(e, self.state.timeout());
                self.enter(ModernState::Failed);
                debug!(target: "mcslp::ping", address = %self.address, error = %e, "status query failed");
                Err(e)
            }
        }
    }
}
