//! Implementation of the pre-Netty (1.4 - 1.6) server list ping.
//! [Server List Ping](https://wiki.vg/Server_List_Ping#1.4_to_1.5)

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{AsyncPingable, Deadline, Pinger, Resolve};
use crate::{Error, PingResult, ServerAddress, packet, status::parse_legacy};

/// Where a legacy ping currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyState {
    Connecting,
    Sent,
    ReadUntilClose,
    Parsing,
    Done,
    Failed,
}

/// A single legacy ping against one server.
#[derive(Debug)]
pub struct Legacy<'a, R> {
    pinger: &'a Pinger<R>,
    address: &'a ServerAddress,
    cancel: CancellationToken,
    state: LegacyState,
}

impl<'a, R: Resolve> Legacy<'a, R> {
    pub(super) const fn new(
        pinger: &'a Pinger<R>,
        address: &'a ServerAddress,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pinger,
            address,
            cancel,
            state: LegacyState::Connecting,
        }
    }

    /// The current step. `ping` consumes the query, so from outside this is
    /// always [`LegacyState::Connecting`]; later states show up in trace logs.
    pub const fn state(&self) -> LegacyState {
        self.state
    }

    fn enter(&mut self, state: LegacyState) {
        trace!(target: "mcslp::ping", address = %self.address, from = ?self.state, to = ?state, "legacy state");
        self.state = state;
    }

    async fn run(&mut self, deadline: &Deadline) -> Result<Option<PingResult>, Error> {
        let address = self.address;
        let mut stream = self
            .pinger
            .connector
            .connect(&address.host, address.port, deadline.token())
            .await?;
        debug!(target: "mcslp::ping", %address, "connected for legacy ping");

        deadline.write_all(&mut stream, &packet::LEGACY_QUERY).await?;
        self.enter(LegacyState::Sent);

        self.enter(LegacyState::ReadUntilClose);
        let mut reply = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let read = deadline.read(&mut stream, &mut chunk).await?;
            if read == 0 {
                break;
            }
            reply.extend_from_slice(&chunk[..read]);
        }
        drop(stream);

        self.enter(LegacyState::Parsing);
        parse_legacy(&reply)
    }
}

impl<R: Resolve> AsyncPingable for Legacy<'_, R> {
    type Response = Option<PingResult>;

    async fn ping(mut self) -> Result<(u64, Self::Response), Error> {
        let deadline = Deadline::start(&self.cancel, self.pinger.config.timeout);
        match self.run(&deadline).await {
            Ok(result) => {
                self.enter(LegacyState::Done);
                Ok((0, result))
            }
            Err(e) => {
                let timeout = if self.state == LegacyState::Connecting {
                    Error::ConnectTimeout
                } else {
                    Error::ReadTimeout
                };
                let e = deadline.explain(e, timeout);
                self.enter(LegacyState::Failed);
                debug!(target: "mcslp::ping", address = %self.address, error = %e, "legacy query failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, time::Duration};

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{Config, status::tests::legacy_reply, tokio::connect::tests::FakeResolver};

    async fn legacy_server(reply: Vec<u8>) -> ServerAddress {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut query = [0; 2];
            stream.read_exact(&mut query).await.unwrap();
            assert_eq!(query, packet::LEGACY_QUERY);
            stream.write_all(&reply).await.unwrap();
        });
        ServerAddress::new("127.0.0.1", port)
    }

    fn pinger() -> Pinger<FakeResolver> {
        Pinger::with_resolver(
            Config {
                timeout: Duration::from_secs(5),
                ..Config::default()
            },
            FakeResolver::default(),
        )
    }

    #[tokio::test]
    async fn reads_until_close() {
        let address =
            legacy_server(legacy_reply(&["61", "1.5.2", "Old Server", "1", "10"])).await;
        let pinger = pinger();
        let mut legacy = pinger.legacy(&address, &CancellationToken::new());
        assert_eq!(legacy.state(), LegacyState::Connecting);
        let deadline = Deadline::start(&legacy.cancel, Duration::from_secs(5));
        let result = legacy.run(&deadline).await.unwrap().unwrap();
        assert_eq!(legacy.state(), LegacyState::Parsing);
        assert_eq!(result.version.name, "1.5.2");
        assert_eq!(result.version.protocol, 61);
        assert_eq!(result.players.max, 10);
    }

    #[tokio::test]
    async fn garbage_reply_is_unrecognized() {
        let address = legacy_server(b"HTTP/1.1 400 Bad Request\r\n\r\n".to_vec()).await;
        let pinger = pinger();
        assert!(matches!(
            pinger
                .legacy(&address, &CancellationToken::new())
                .ping()
                .await,
            Err(Error::UnrecognizedLegacyResponse)
        ));
        assert_eq!(
            pinger
                .ping_legacy(&ServerAddress::new("127.0.0.1", 1), &CancellationToken::new())
                .await,
            None
        );
    }
}
