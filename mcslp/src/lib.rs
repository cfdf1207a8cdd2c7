#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
//! `mcslp` is a Minecraft Server List Ping client. It resolves a server's
//! hostname (DNS-over-HTTPS first, the system resolver as a fallback), races a
//! TCP connection to every resolved address, and speaks both the modern
//! length-prefixed JSON status protocol and the legacy pre-Netty ping.
//!
//! The main API surface is [`tokio::Pinger`], which turns every failure into
//! `None` except a status payload that cannot be parsed at all. The lower level
//! [`tokio::get_status`] returns the full [`Error`] instead.

pub mod motd;
pub mod packet;
pub mod race;
pub mod tokio;
pub mod varint;

mod status;

use std::{net::SocketAddr, time::Duration};

pub use status::{Mod, ModInfo, PingResult, Player, Players, Version, parse_legacy};

/// The default port of a Java server.
pub const DEFAULT_PORT: u16 = 25565;

/// Errors that can occur when pinging a server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("the status response is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("the status response is not valid JSON: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("timed out connecting to the server")]
    ConnectTimeout,
    #[error("timed out reading from the server")]
    ReadTimeout,
    #[error("the operation was cancelled")]
    Cancelled,
    #[error("no address found for `{0}`")]
    NoAddressAvailable(String),
    #[error("all {count} connection attempts to `{host}` failed", count = .errors.len())]
    AllConnectionsFailed { host: String, errors: Vec<Error> },
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("the server address is {0} bytes long, at most 255 are allowed")]
    AddressTooLong(usize),
    #[error("the server answered the legacy ping in an unrecognized shape")]
    UnrecognizedLegacyResponse,
    #[error("DNS lookup failed: {0}")]
    Resolve(String),
    #[error("an invalid address was provided")]
    InvalidAddress,
    #[error("an I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),
}

/// Public DNS-over-HTTPS upstreams the default resolver can use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DohProvider {
    #[default]
    Cloudflare,
    Google,
    Quad9,
}

/// Settings for a ping, supplied by the caller.
///
/// # Examples
///
/// ```
/// use mcslp::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     timeout: Duration::from_secs(3),
///     ..Default::default()
/// };
/// assert_eq!(config.protocol_version, 772);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Deadline for a whole ping, from the first DNS query to the last byte read.
    pub timeout: Duration,
    /// Protocol version number announced in the handshake.
    pub protocol_version: u32,
    /// Resolve hostnames over HTTPS before falling back to the system resolver.
    pub enable_doh: bool,
    /// Upstream used when `enable_doh` is set.
    pub doh_provider: DohProvider,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            protocol_version: packet::DEFAULT_PROTOCOL_VERSION,
            enable_doh: true,
            doh_provider: DohProvider::default(),
        }
    }
}

/// A host and port pair to ping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// An IP literal or a hostname. Sent verbatim in the handshake.
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port`, `ip`, `ip:port`, `ipv6` or `[ipv6]:port`.
    ///
    /// The port defaults to [`DEFAULT_PORT`].
    ///
    /// # Errors
    /// [`Error::InvalidAddress`] if the host is empty or the port is not a number.
    pub fn parse(address: &str) -> Result<Self, Error> {
        let address = address.trim();
        if let Ok(socket) = address.parse::<SocketAddr>() {
            return Ok(Self::new(socket.ip().to_string(), socket.port()));
        }
        if let Ok(ip) = address.parse::<std::net::IpAddr>() {
            return Ok(Self::new(ip.to_string(), DEFAULT_PORT));
        }
        if let Some(inner) = address.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let ip: std::net::Ipv6Addr = inner.parse().map_err(|_| Error::InvalidAddress)?;
            return Ok(Self::new(ip.to_string(), DEFAULT_PORT));
        }
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| Error::InvalidAddress)?),
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(Error::InvalidAddress);
        }
        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hostnames_and_ports() {
        assert_eq!(
            ServerAddress::parse("mc.example.com").unwrap(),
            ServerAddress::new("mc.example.com", DEFAULT_PORT)
        );
        assert_eq!(
            ServerAddress::parse("mc.example.com:19384").unwrap(),
            ServerAddress::new("mc.example.com", 19384)
        );
        assert_eq!(
            ServerAddress::parse("13.212.76.209:23193").unwrap(),
            ServerAddress::new("13.212.76.209", 23193)
        );
    }

    #[test]
    fn parses_ipv6_forms() {
        assert_eq!(
            ServerAddress::parse("::1").unwrap(),
            ServerAddress::new("::1", DEFAULT_PORT)
        );
        assert_eq!(
            ServerAddress::parse("[::1]").unwrap(),
            ServerAddress::new("::1", DEFAULT_PORT)
        );
        let parsed = ServerAddress::parse("[2001:db8::1]:25570").unwrap();
        assert_eq!(parsed, ServerAddress::new("2001:db8::1", 25570));
        assert_eq!(parsed.to_string(), "[2001:db8::1]:25570");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ServerAddress::parse("host:port"),
            Err(Error::InvalidAddress)
        ));
        assert!(matches!(
            ServerAddress::parse(":25565"),
            Err(Error::InvalidAddress)
        ));
    }
}
