//! dnsdrop - file transfer over DNS
//!
//! Serves the files in a directory as DNS answers, and fetches them back
//! through any resolver path.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use dnsdrop::{DnsDropConfig, FileServer, Getter, RecordType};

#[derive(Parser)]
#[command(name = "dnsdrop")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
))]
#[command(about = "File transfer over DNS", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve chunks of files from a directory in response to DNS queries
    Serve {
        /// Listen address [default: 127.0.0.1:5353]
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Directory containing files to serve [default: fserv]
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Response TTL in seconds [default: 1800]
        #[arg(short, long)]
        ttl: Option<u32>,
    },

    /// Fetch a file served by `dnsdrop serve`
    Get {
        /// Domain the server answers for
        #[arg(short, long)]
        domain: Option<String>,

        /// Record type to carry the file (a, aaaa, txt) [default: a]
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        record_type: Option<RecordType>,

        /// Offset at which to start reading
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Stop after this many bytes; 0 reads the whole file
        #[arg(short, long, default_value_t = 0)]
        max: u64,

        /// Query through this DNS over HTTPS URL
        #[arg(long, value_name = "URL")]
        doh_url: Option<String>,

        /// Domain-front DoH queries through HOST[:PORT]
        #[arg(long, value_name = "HOST", requires = "doh_url")]
        doh_sni: Option<String>,

        /// Query this nameserver directly instead of the system's
        #[arg(short, long, value_name = "ADDR")]
        nameserver: Option<SocketAddr>,

        /// Write the file here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Name of the file to fetch
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let mut config = match &cli.config {
        Some(path) => DnsDropConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DnsDropConfig::default(),
    };

    match cli.command {
        Commands::Serve { listen, dir, ttl } => {
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(dir) = dir {
                config.server.dir = dir;
            }
            if let Some(ttl) = ttl {
                config.server.ttl = ttl;
            }
            run_server(config).await?;
        }
        Commands::Get {
            domain,
            record_type,
            offset,
            max,
            doh_url,
            doh_sni,
            nameserver,
            output,
            name,
        } => {
            let client = &mut config.client;
            if domain.is_some() {
                client.domain = domain;
            }
            if let Some(record_type) = record_type {
                client.record_type = record_type;
            }
            if doh_url.is_some() {
                client.doh_url = doh_url;
                client.doh_sni = doh_sni;
            }
            if nameserver.is_some() {
                client.nameserver = nameserver;
            }
            run_get(config, &name, offset, max, output).await?;
        }
    }

    Ok(())
}

async fn run_server(config: DnsDropConfig) -> Result<()> {
    config.server.validate().map_err(|e| anyhow!(e))?;

    let server = FileServer::bind(&config.server)
        .await
        .with_context(|| format!("listening on {}", config.server.listen))?;

    info!(
        "Serving files from {} with TTL {}s",
        config.server.dir.display(),
        config.server.ttl
    );

    server.serve().await.context("receiving packet")?;
    Ok(())
}

async fn run_get(
    config: DnsDropConfig,
    name: &str,
    offset: u64,
    max: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = config.client;
    let domain = client
        .domain
        .as_deref()
        .context("no domain given; use --domain or set client.domain")?;

    let querier = client.build_querier().context("setting up querier")?;
    info!(
        "Fetching {} from {} in {} records",
        name, domain, client.record_type
    );

    let mut stream = Getter::new(client.record_type, name, domain)
        .start_offset(offset)
        .max_bytes(max)
        .querier(querier)
        .get();

    let copied = match &output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            let copied = tokio::io::copy(&mut stream, &mut file).await?;
            file.flush().await?;
            copied
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let copied = tokio::io::copy(&mut stream, &mut stdout).await?;
            stdout.flush().await?;
            copied
        }
    };

    info!("Got {} bytes of {}", copied, name);
    Ok(())
}
