//! dnsdrop configuration
//!
//! Loaded from a TOML file; every field has a default, and command-line
//! flags override whatever the file sets.

use crate::dns::RecordType;
use crate::querier::{
    fronted_post, DohConfig, DohQuerier, PostClient, Querier, Result as QueryResult,
    SystemQuerier,
};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default server listen address
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    5353,
);

/// Default directory from which files are served
pub const DEFAULT_DIR: &str = "fserv";

/// Default TTL on served records, in seconds
pub const DEFAULT_TTL: u32 = 1800;

/// Main dnsdrop configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsDropConfig {
    /// File server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Transfer client settings
    #[serde(default)]
    pub client: ClientConfig,
}

impl DnsDropConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// File server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP address to answer queries on
    pub listen: SocketAddr,

    /// Directory holding the served files
    pub dir: PathBuf,

    /// TTL on answers, in seconds
    pub ttl: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            dir: PathBuf::from(DEFAULT_DIR),
            ttl: DEFAULT_TTL,
        }
    }
}

impl ServerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dir.is_dir() {
            return Err(format!(
                "Serving directory {} does not exist or is not a directory",
                self.dir.display()
            ));
        }

        Ok(())
    }
}

/// Transfer client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Record type carrying the file
    pub record_type: RecordType,

    /// Domain the file server is authoritative for
    pub domain: Option<String>,

    /// DoH server URL; queries go through the system resolver if unset
    pub doh_url: Option<String>,

    /// Front to connect through for DoH, as `host` or `host:port`
    pub doh_sni: Option<String>,

    /// Nameserver to query directly instead of the system's
    pub nameserver: Option<SocketAddr>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            record_type: RecordType::A,
            domain: None,
            doh_url: None,
            doh_sni: None,
            nameserver: None,
        }
    }
}

impl ClientConfig {
    /// Build the querier these settings describe
    ///
    /// A DoH URL wins over a nameserver; with neither, the system
    /// resolver configuration is used.
    pub fn build_querier(&self) -> QueryResult<Arc<dyn Querier>> {
        if let Some(url) = &self.doh_url {
            let post = match &self.doh_sni {
                Some(sni) => {
                    let fronted: Arc<dyn PostClient> = Arc::new(fronted_post(sni)?);
                    Some(fronted)
                }
                None => None,
            };
            let querier = DohQuerier::new(DohConfig {
                url: url.clone(),
                post,
            })?;
            return Ok(Arc::new(querier));
        }

        let querier = match self.nameserver {
            Some(addr) => SystemQuerier::with_nameserver(addr),
            None => SystemQuerier::from_system_conf()?,
        };
        Ok(Arc::new(querier))
    }
}
