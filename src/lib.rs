//! dnsdrop: file transfer over DNS
//!
//! dnsdrop serves files in small chunks as DNS answers.  Each query name
//! encodes a file name and an offset; the answer carries the next few bytes
//! of that file in an A, AAAA or TXT record.  A client rebuilds the file by
//! asking for consecutive offsets until it gets NXDOMAIN.
//!
//! ## Features
//!
//! - **Three carriers**: 3 bytes per A record, 8 per AAAA, 160 per TXT
//! - **Any resolver path**: the system resolver, a specific nameserver, or
//!   DNS over HTTPS
//! - **Domain fronting**: DoH POSTs can be dialed through a different host
//! - **Streaming**: transfers are read as they arrive and can be cut short
//!
//! ## Quick Start
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use dnsdrop::{Getter, RecordType};
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut stream = Getter::new(RecordType::TXT, "payload", "files.example.com")
//!         .max_bytes(4096)
//!         .get();
//!
//!     let mut contents = Vec::new();
//!     stream.read_to_end(&mut contents).await?;
//!     println!("Got {} bytes", contents.len());
//!     Ok(())
//! }
//! ```
//!
//! ### As a Command-Line Tool
//!
//! ```bash
//! # Serve the files in ./fserv
//! dnsdrop serve --listen 0.0.0.0:53 --dir fserv
//!
//! # Fetch one through the system resolver
//! dnsdrop get --domain files.example.com --type txt payload
//!
//! # Fetch one through a fronted DoH server
//! dnsdrop get --domain files.example.com --doh-url https://doh.example/dns-query \
//!     --doh-sni cdn.example.net -o payload payload
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  names  ┌──────────┐  DNS / DoH  ┌───────────┐  UDP  ┌────────────┐
//! │  Getter  │────────▶│ Querier  │────────────▶│ Recursive │──────▶│ FileServer │
//! │          │◀────────│          │◀────────────│ resolver  │◀──────│            │
//! └──────────┘ answers └──────────┘             └───────────┘       └────────────┘
//! ```

pub mod config;
pub mod dns;
pub mod getter;
pub mod pool;
pub mod querier;
pub mod server;

// Re-export core types
pub use config::{ClientConfig, DnsDropConfig, ServerConfig};
pub use dns::{
    decode_name, decode_payload, encode_name, encode_payload, DnsError, RecordBody, RecordType,
};
pub use getter::{Getter, TransferError, TransferStream};
pub use pool::{Pool, Pooled};
pub use querier::{
    builtin_post, fronted_post, DohConfig, DohQuerier, PostClient, QueryError, Querier,
    SystemQuerier, WrapPost,
};
pub use server::{FileServer, QueryHandler};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
