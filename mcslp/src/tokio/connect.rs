use std::net::{IpAddr, SocketAddr};

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::resolve::{self, RecordType, Resolve, SystemResolver};
use crate::{
    Error,
    race::{RaceError, Won, race_first_success},
};

/// Turns a host and port into a connected stream.
///
/// Hostnames are resolved through `R` (A and AAAA in parallel), falling back
/// to the system resolver when `R` fails, and every resulting address is
/// dialed at once. The first connection wins.
#[derive(Debug)]
pub struct Connector<R> {
    resolver: R,
    fallback: SystemResolver,
}

impl<R: Resolve> Connector<R> {
    pub const fn new(resolver: R) -> Self {
        Self {
            resolver,
            fallback: SystemResolver,
        }
    }

    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Every address known for `host`.
    ///
    /// # Errors
    /// [`Error::Cancelled`], or [`Error::Resolve`] if the fallback fails too.
    pub async fn resolve(&self, host: &str, cancel: &CancellationToken) -> Result<Vec<IpAddr>, Error> {
        let (v4, v6) = tokio::join!(
            self.resolver.query(host, RecordType::A, cancel),
            self.resolver.query(host, RecordType::Aaaa, cancel),
        );
        match (v4, v6) {
            (Ok(mut v4), Ok(v6)) => {
                v4.extend(v6);
                Ok(v4)
            }
            (Err(Error::Cancelled), _) | (_, Err(Error::Cancelled)) => Err(Error::Cancelled),
            (Err(e), _) | (_, Err(e)) => {
                warn!(target: "mcslp::dns", host, error = %e, "resolver failed, using system DNS");
                self.fallback.lookup_all(host, cancel).await
            }
        }
    }

    /// Connects to `host:port`, racing every resolved address.
    ///
    /// # Errors
    /// [`Error::NoAddressAvailable`] if resolution yields nothing,
    /// [`Error::AllConnectionsFailed`] with each dial's error if none connect,
    /// [`Error::Cancelled`] if `cancel` fires first.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, Error> {
        if let Some(ip) = resolve::literal(host) {
            return dial(SocketAddr::new(ip, port), cancel).await;
        }

        let addrs = self.resolve(host, cancel).await?;
        if addrs.is_empty() {
            return Err(Error::NoAddressAvailable(host.to_owned()));
        }
        debug!(target: "mcslp::dns", host, ?addrs, "racing connections");

        let attempts = cancel.child_token();
        let dials = addrs.into_iter().map(|ip| {
            let attempts = attempts.clone();
            async move { dial(SocketAddr::new(ip, port), &attempts).await }
        });

        match race_first_success(dials).await {
            Ok(Won { value, mut losers }) => {
                attempts.cancel();
                if !losers.is_empty() {
                    tokio::spawn(async move {
                        while let Some(late) = losers.next().await {
                            match late {
                                Ok(stream) => {
                                    debug!(target: "mcslp::dns", peer = ?stream.peer_addr().ok(), "closing late connection");
                                }
                                Err(Error::Cancelled) => {}
                                Err(e) => {
                                    debug!(target: "mcslp::dns", error = %e, "alternative address failed");
                                }
                            }
                        }
                    });
                }
                debug!(target: "mcslp::dns", host, peer = ?value.peer_addr().ok(), "connected");
                Ok(value)
            }
            Err(RaceError::AllFailed(errors)) => Err(Error::AllConnectionsFailed {
                host: host.to_owned(),
                errors,
            }),
            Err(RaceError::AllCancelled) => Err(Error::Cancelled),
            Err(RaceError::Empty) => Err(Error::NoAddressAvailable(host.to_owned())),
        }
    }
}

/// Opens one TCP connection with Nagle's algorithm disabled.
///
/// Dropping the pending connect on cancellation releases the socket.
///
/// # Errors
/// [`Error::Cancelled`] or [`Error::ConnectFailed`].
pub async fn dial(addr: SocketAddr, cancel: &CancellationToken) -> Result<TcpStream, Error> {
    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        stream = TcpStream::connect(addr) => stream,
    };
    let stream = stream.map_err(|source| Error::ConnectFailed { addr, source })?;
    stream
        .set_nodelay(true)
        .map_err(|source| Error::ConnectFailed { addr, source })?;
    Ok(stream)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        net::Ipv4Addr,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tokio::{io::AsyncReadExt, net::TcpListener, time::timeout};

    use super::*;

    /// Answers every query from a fixed table, or fails like a broken upstream.
    #[derive(Debug, Default)]
    pub(crate) struct FakeResolver {
        pub(crate) v4: Vec<IpAddr>,
        pub(crate) v6: Vec<IpAddr>,
        pub(crate) broken: bool,
        pub(crate) queries: AtomicUsize,
    }

    impl Resolve for FakeResolver {
        async fn query(
            &self,
            _host: &str,
            record: RecordType,
            _cancel: &CancellationToken,
        ) -> Result<Vec<IpAddr>, Error> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.broken {
                return Err(Error::Resolve("upstream unreachable".into()));
            }
            Ok(match record {
                RecordType::A => self.v4.clone(),
                RecordType::Aaaa => self.v6.clone(),
            })
        }
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn closed_port() -> u16 {
        let (listener, port) = listener().await;
        drop(listener);
        port
    }

    #[tokio::test]
    async fn literal_ip_skips_resolver() {
        let (_listener, port) = listener().await;
        let connector = Connector::new(FakeResolver::default());
        let stream = connector
            .connect("127.0.0.1", port, &CancellationToken::new())
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
        assert_eq!(connector.resolver().queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn races_to_the_reachable_address() {
        let (_listener, port) = listener().await;
        let connector = Connector::new(FakeResolver {
            v4: vec![
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)),
                IpAddr::V4(Ipv4Addr::LOCALHOST),
            ],
            ..FakeResolver::default()
        });
        let stream = connector
            .connect("mc.example.test", port, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            stream.peer_addr().unwrap(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, port))
        );
        assert_eq!(connector.resolver().queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn losing_connections_are_closed() {
        let (listener, port) = listener().await;
        let connector = Connector::new(FakeResolver {
            v4: vec![IpAddr::V4(Ipv4Addr::LOCALHOST); 3],
            ..FakeResolver::default()
        });
        let mut winner = connector
            .connect("mc.example.test", port, &CancellationToken::new())
            .await
            .unwrap();
        let winner_addr = winner.local_addr().unwrap();

        let mut accepted = Vec::new();
        while let Ok(Ok(conn)) = timeout(Duration::from_millis(500), listener.accept()).await {
            accepted.push(conn);
        }
        assert!(accepted.iter().any(|(_, peer)| *peer == winner_addr));

        let mut buf = [0u8; 1];
        for (mut stream, peer) in accepted.into_iter().filter(|(_, peer)| *peer != winner_addr) {
            let read = timeout(Duration::from_secs(1), stream.read(&mut buf))
                .await
                .unwrap_or_else(|_| panic!("connection from {peer} left open"));
            assert_eq!(read.unwrap(), 0, "connection from {peer}");
        }
        assert!(
            timeout(Duration::from_millis(50), winner.read(&mut buf))
                .await
                .is_err(),
            "winning connection must stay open"
        );
    }

    #[tokio::test]
    async fn broken_resolver_falls_back_to_system() {
        let (_listener, port) = listener().await;
        let connector = Connector::new(FakeResolver {
            broken: true,
            ..FakeResolver::default()
        });
        let addrs = connector
            .resolve("localhost", &CancellationToken::new())
            .await
            .unwrap();
        assert!(addrs.iter().any(IpAddr::is_loopback));
        connector
            .connect("localhost", port, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_answers() {
        let connector = Connector::new(FakeResolver::default());
        assert!(matches!(
            connector
                .connect("nothing.example.test", 25565, &CancellationToken::new())
                .await,
            Err(Error::NoAddressAvailable(host)) if host == "nothing.example.test"
        ));
    }

    #[tokio::test]
    async fn every_dial_error_is_kept() {
        let port = closed_port().await;
        let connector = Connector::new(FakeResolver {
            v4: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::LOCALHOST),
            ],
            ..FakeResolver::default()
        });
        let Err(Error::AllConnectionsFailed { errors, .. }) = connector
            .connect("down.example.test", port, &CancellationToken::new())
            .await
        else {
            panic!("expected every dial to fail");
        };
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|e| matches!(e, Error::ConnectFailed { addr, .. } if addr.port() == port))
        );
    }

    #[tokio::test]
    async fn cancelled_dial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let connector = Connector::new(FakeResolver {
            v4: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            ..FakeResolver::default()
        });
        assert!(matches!(
            connector.connect("mc.example.test", 25565, &cancel).await,
            Err(Error::Cancelled)
        ));
    }
}
