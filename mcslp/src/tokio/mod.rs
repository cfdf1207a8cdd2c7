mod connect;
mod legacy;
mod modern;
mod resolve;

use std::{
    future::Future,
    time::{Duration, Instant},
};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

pub use connect::{Connector, dial};
pub use legacy::{Legacy, LegacyState};
pub use modern::{Modern, ModernState};
pub use resolve::{DnsResolver, DohResolver, RecordType, Resolve, SystemResolver};

use crate::{Config, Error, PingResult, ServerAddress};

/// Represents a pingable entity.
pub trait AsyncPingable {
    /// The type of response that is expected in reply to the ping.
    type Response;

    /// Ping the entity, gathering the latency and response.
    fn ping(self) -> impl Future<Output = Result<(u64, Self::Response), Error>> + Send;
}

/// Retrieve the status of a given Minecraft server using a `AsyncPingable` configuration.
///
/// Returns `(latency_ms, response)` where response is a response type of the `Pingable` configuration.
///
/// # Examples
///
/// ```no_run
/// # async {
/// use mcslp::{Config, ServerAddress, tokio::Pinger};
/// use tokio_util::sync::CancellationToken;
///
/// let pinger = Pinger::new(Config::default());
/// let address = ServerAddress::parse("mc.hypixel.net")?;
/// let (latency, response) =
///     mcslp::tokio::get_status(pinger.modern(&address, &CancellationToken::new())).await?;
/// # Ok::<(), mcslp::Error>(())
/// # };
/// ```
///
/// # Errors
/// If the server status cannot be received.
pub async fn get_status<P: AsyncPingable + Send>(pingable: P) -> Result<(u64, P::Response), Error> {
    pingable.ping().await
}

/// A long-lived client that owns the resolver and the settings.
///
/// Its `ping` methods log failures and return `None`, so callers only see
/// "unreachable" or a result.
#[derive(Debug)]
pub struct Pinger<R = DnsResolver> {
    connector: Connector<R>,
    config: Config,
}

impl Pinger<DnsResolver> {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let resolver = DnsResolver::from_config(&config);
        Self::with_resolver(config, resolver)
    }
}

impl<R: Resolve> Pinger<R> {
    pub const fn with_resolver(config: Config, resolver: R) -> Self {
        Self {
            connector: Connector::new(resolver),
            config,
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn connector(&self) -> &Connector<R> {
        &self.connector
    }

    #[must_use]
    pub fn modern<'a>(&'a self, address: &'a ServerAddress, cancel: &CancellationToken) -> Modern<'a, R> {
        Modern::new(self, address, cancel.clone())
    }

    #[must_use]
    pub fn legacy<'a>(&'a self, address: &'a ServerAddress, cancel: &CancellationToken) -> Legacy<'a, R> {
        Legacy::new(self, address, cancel.clone())
    }

    /// Queries `address` with the modern status protocol.
    ///
    /// Returns `Ok(None)` when the server is unreachable or answers with
    /// something unusable.
    ///
    /// # Errors
    /// Only [`Error::MalformedResponse`]: the server answered, but its status
    /// payload is not JSON at all.
    pub async fn ping(
        &self,
        address: &ServerAddress,
        cancel: &CancellationToken,
    ) -> Result<Option<PingResult>, Error> {
        match get_status(self.modern(address, cancel)).await {
            Ok((_, result)) => Ok(Some(result)),
            Err(e @ Error::MalformedResponse(_)) => {
                error!(target: "mcslp::ping", %address, error = %e, "unparsable status response");
                Err(e)
            }
            Err(e) => {
                error!(target: "mcslp::ping", %address, error = %e, "ping failed");
                Ok(None)
            }
        }
    }

    /// Queries `address` with the legacy (pre-1.7) ping.
    ///
    /// Every failure, including a reply in an unexpected shape, is `None`.
    pub async fn ping_legacy(
        &self,
        address: &ServerAddress,
        cancel: &CancellationToken,
    ) -> Option<PingResult> {
        match get_status(self.legacy(address, cancel)).await {
            Ok((_, result)) => result,
            Err(Error::UnrecognizedLegacyResponse) => {
                info!(target: "mcslp::ping", %address, "unknown legacy response, ignoring");
                None
            }
            Err(e) => {
                error!(target: "mcslp::ping", %address, error = %e, "legacy ping failed");
                None
            }
        }
    }
}

/// One end-to-end time budget, linked to the caller's cancellation.
///
/// Dropping it cancels everything still running under its token.
struct Deadline {
    parent: CancellationToken,
    token: CancellationToken,
    expires: Instant,
    _guard: DropGuard,
}

impl Deadline {
    fn start(parent: &CancellationToken, timeout: Duration) -> Self {
        let expires = Instant::now() + timeout;
        let token = parent.child_token();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(expires.into()) => timer.cancel(),
                () = timer.cancelled() => {}
            }
        });
        Self {
            parent: parent.clone(),
            _guard: token.clone().drop_guard(),
            token,
            expires,
        }
    }

    const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Reports a cancellation caused by the timer as `timeout` instead.
    fn explain(&self, error: Error, timeout: Error) -> Error {
        match error {
            Error::Cancelled if !self.parent.is_cancelled() && Instant::now() >= self.expires => {
                timeout
            }
            other => other,
        }
    }

    async fn write_all<W>(&self, writer: &mut W, buf: &[u8]) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled),
            res = writer.write_all(buf) => Ok(res?),
        }
    }

    async fn read<R>(&self, reader: &mut R, buf: &mut [u8]) -> Result<usize, Error>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled),
            res = reader.read(buf) => Ok(res?),
        }
    }
}
