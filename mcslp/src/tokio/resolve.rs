use std::{future::Future, net::IpAddr};

use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Config, DohProvider, Error};

/// Address record families the connector asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    #[must_use]
    pub const fn matches(self, ip: &IpAddr) -> bool {
        match self {
            Self::A => ip.is_ipv4(),
            Self::Aaaa => ip.is_ipv6(),
        }
    }
}

/// Something that can turn a hostname into addresses.
///
/// An `Err` means the lookup itself broke (transport failure, bad upstream);
/// a name with no records of the asked type is `Ok` with an empty list.
pub trait Resolve: Send + Sync {
    fn query(
        &self,
        host: &str,
        record: RecordType,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<IpAddr>, Error>> + Send;
}

/// DNS-over-HTTPS through one of the public upstreams.
pub struct DohResolver {
    inner: TokioResolver,
}

impl std::fmt::Debug for DohResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DohResolver").finish_non_exhaustive()
    }
}

impl DohResolver {
    #[must_use]
    pub fn new(provider: DohProvider) -> Self {
        let config = match provider {
            DohProvider::Cloudflare => ResolverConfig::cloudflare_https(),
            DohProvider::Google => ResolverConfig::google_https(),
            DohProvider::Quad9 => ResolverConfig::quad9_https(),
        };
        let mut opts = ResolverOpts::default();
        opts.cache_size = 64;
        opts.attempts = 3;
        let inner = TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self { inner }
    }

    async fn lookup(&self, host: &str, record: RecordType) -> Result<Vec<IpAddr>, ResolveError> {
        Ok(match record {
            RecordType::A => self
                .inner
                .ipv4_lookup(host)
                .await?
                .iter()
                .map(|a| IpAddr::V4(a.0))
                .collect(),
            RecordType::Aaaa => self
                .inner
                .ipv6_lookup(host)
                .await?
                .iter()
                .map(|aaaa| IpAddr::V6(aaaa.0))
                .collect(),
        })
    }
}

impl Resolve for DohResolver {
    async fn query(
        &self,
        host: &str,
        record: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, Error> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.lookup(host, record) => result,
        };
        match result {
            Ok(addrs) => Ok(addrs),
            Err(e) if e.is_no_records_found() || e.is_nx_domain() => {
                debug!(target: "mcslp::dns", host, ?record, "no records");
                Ok(Vec::new())
            }
            Err(e) => Err(Error::Resolve(e.to_string())),
        }
    }
}

/// The platform's resolver (`getaddrinfo` and friends).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    /// Every address the system knows for `host`, both families.
    ///
    /// # Errors
    /// [`Error::Cancelled`] or [`Error::Resolve`].
    pub async fn lookup_all(
        &self,
        host: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, Error> {
        let addrs = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            addrs = tokio::net::lookup_host((host, 0)) => addrs,
        };
        let addrs = addrs.map_err(|e| Error::Resolve(e.to_string()))?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

impl Resolve for SystemResolver {
    async fn query(
        &self,
        host: &str,
        record: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, Error> {
        let mut addrs = self.lookup_all(host, cancel).await?;
        addrs.retain(|ip| record.matches(ip));
        Ok(addrs)
    }
}

/// The resolver a [`Config`] asks for.
#[derive(Debug)]
pub enum DnsResolver {
    Doh(DohResolver),
    System(SystemResolver),
}

impl DnsResolver {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        if config.enable_doh {
            Self::Doh(DohResolver::new(config.doh_provider))
        } else {
            Self::System(SystemResolver)
        }
    }
}

impl Resolve for DnsResolver {
    async fn query(
        &self,
        host: &str,
        record: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, Error> {
        match self {
            Self::Doh(doh) => doh.query(host, record, cancel).await,
            Self::System(system) => system.query(host, record, cancel).await,
        }
    }
}

/// Returns the address if `host` is an IP literal.
pub(crate) fn literal(host: &str) -> Option<IpAddr> {
    host.parse().ok().or_else(|| {
        host.strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .and_then(|h| h.parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn ip_literals() {
        assert_eq!(literal("127.0.0.1"), Some(LOCALHOST));
        assert_eq!(literal("::1"), Some("::1".parse().unwrap()));
        assert_eq!(literal("[::1]"), Some("::1".parse().unwrap()));
        assert_eq!(literal("localhost"), None);
    }

    #[tokio::test]
    async fn system_resolver_filters_family() {
        let cancel = CancellationToken::new();
        let v4 = SystemResolver
            .query("127.0.0.1", RecordType::A, &cancel)
            .await
            .unwrap();
        assert_eq!(v4, [LOCALHOST]);
        let v6 = SystemResolver
            .query("127.0.0.1", RecordType::Aaaa, &cancel)
            .await
            .unwrap();
        assert!(v6.is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_lookup() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            SystemResolver.query("localhost", RecordType::A, &cancel).await,
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn config_picks_resolver() {
        let config = Config {
            enable_doh: false,
            ..Config::default()
        };
        assert!(matches!(
            DnsResolver::from_config(&config),
            DnsResolver::System(_)
        ));
    }
}
