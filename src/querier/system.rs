//! Querier backed by the host's resolver configuration
//!
//! A and AAAA lookups both go through a dual-stack address lookup and are
//! filtered afterwards, so asking for one family puts queries for both on
//! the wire.  Transfers over this backend therefore generate roughly twice
//! the A/AAAA query volume a single-family lookup would.

use super::{QueryError, Querier, Result};
use async_trait::async_trait;
use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts,
};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, SocketAddr};

/// [`Querier`] using an ordinary stub resolver
pub struct SystemQuerier {
    resolver: TokioAsyncResolver,
}

impl SystemQuerier {
    /// Use the nameservers from the host configuration (`/etc/resolv.conf`
    /// or the platform equivalent)
    pub fn from_system_conf() -> Result<Self> {
        let (config, opts) = hickory_resolver::system_conf::read_system_conf()?;
        Ok(Self::with_config(config, opts))
    }

    /// Send every query straight to `nameserver` over UDP, falling back to
    /// TCP for truncated answers
    pub fn with_nameserver(nameserver: SocketAddr) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(
            &[nameserver.ip()],
            nameserver.port(),
            true,
        );
        Self::with_config(
            ResolverConfig::from_parts(None, vec![], group),
            ResolverOpts::default(),
        )
    }

    fn with_config(config: ResolverConfig, mut opts: ResolverOpts) -> Self {
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
        // Every query name is asked for once
        opts.cache_size = 0;

        log::debug!(
            "System querier using {} nameserver(s)",
            config.name_servers().len()
        );

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }

    async fn lookup_ip(&self, name: &str, want_v4: bool) -> Result<Vec<String>> {
        match self.resolver.lookup_ip(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .filter(|ip| matches!(ip, IpAddr::V4(_)) == want_v4)
                .map(|ip| ip.to_string())
                .collect()),
            Err(e) => no_records(name, e),
        }
    }
}

/// Split NXDOMAIN from empty answers and real failures
fn no_records(name: &str, err: ResolveError) -> Result<Vec<String>> {
    let nxdomain = match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            Some(*response_code == ResponseCode::NXDomain)
        }
        _ => None,
    };

    match nxdomain {
        Some(true) => Err(QueryError::NotFound {
            name: Some(name.to_string()),
        }),
        Some(false) => Ok(Vec::new()),
        None => Err(err.into()),
    }
}

#[async_trait]
impl Querier for SystemQuerier {
    async fn a(&self, name: &str) -> Result<Vec<String>> {
        self.lookup_ip(name, true).await
    }

    async fn aaaa(&self, name: &str) -> Result<Vec<String>> {
        self.lookup_ip(name, false).await
    }

    async fn txt(&self, name: &str) -> Result<Vec<String>> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|s| String::from_utf8_lossy(s))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => no_records(name, e),
        }
    }
}
