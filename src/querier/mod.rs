//! Resolution backends
//!
//! A [`Querier`] looks up the A, AAAA or TXT records for a name and hands
//! back the answers as text: addresses for A/AAAA, the record text for TXT.
//! Implementations carry no per-transfer state and may be shared between
//! any number of concurrent transfers.
//!
//! Two implementations ship with the crate:
//!
//! - [`SystemQuerier`] uses the host's resolver configuration (or an explicit
//!   nameserver) through hickory-resolver
//! - [`DohQuerier`] builds DNS messages itself and POSTs them to a DNS over
//!   HTTPS server, optionally through a domain-fronted transport

pub mod doh;
pub mod post;
pub mod system;

pub use doh::{append_query, build_query, parse_doh_answer, DohConfig, DohQuerier};
pub use post::{builtin_post, fronted_post, PostClient, WrapPost, DEFAULT_DOH_PORT, MAX_POST_BODY};
pub use system::SystemQuerier;

use crate::dns::{DnsError, RecordType};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    /// The name does not exist; a transfer treats this as end of file
    #[error("name not found: {}", .name.as_deref().unwrap_or("<unknown>"))]
    NotFound { name: Option<String> },

    #[error("unsuccessful DNS response code {name} ({code})")]
    ResponseCode { code: u8, name: &'static str },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("non-2xx response status {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid URL {0:?}: {1}")]
    InvalidUrl(String, String),

    #[error("resolver error: {0}")]
    Resolve(#[from] hickory_resolver::error::ResolveError),

    #[error(transparent)]
    Dns(#[from] DnsError),
}

impl QueryError {
    /// Whether this is the end-of-file signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Performs DNS lookups for a transfer, or standalone
#[async_trait]
pub trait Querier: Send + Sync {
    /// Addresses from the A records for `name`
    async fn a(&self, name: &str) -> Result<Vec<String>>;

    /// Addresses from the AAAA records for `name`
    async fn aaaa(&self, name: &str) -> Result<Vec<String>>;

    /// Text of the TXT records for `name`
    async fn txt(&self, name: &str) -> Result<Vec<String>>;

    /// Dispatch on `rtype`
    async fn resolve(&self, name: &str, rtype: RecordType) -> Result<Vec<String>> {
        match rtype {
            RecordType::A => self.a(name).await,
            RecordType::AAAA => self.aaaa(name).await,
            RecordType::TXT => self.txt(name).await,
            RecordType::Other(_) => Err(DnsError::UnsupportedRecordType(rtype).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Querier for Fixed {
        async fn a(&self, name: &str) -> Result<Vec<String>> {
            Ok(vec![format!("a:{}", name)])
        }

        async fn aaaa(&self, name: &str) -> Result<Vec<String>> {
            Ok(vec![format!("aaaa:{}", name)])
        }

        async fn txt(&self, _name: &str) -> Result<Vec<String>> {
            Err(QueryError::NotFound { name: None })
        }
    }

    #[tokio::test]
    async fn test_resolve_dispatch() {
        let q = Fixed;
        assert_eq!(q.resolve("x", RecordType::A).await.unwrap(), ["a:x"]);
        assert_eq!(q.resolve("x", RecordType::AAAA).await.unwrap(), ["aaaa:x"]);
        assert!(q.resolve("x", RecordType::TXT).await.unwrap_err().is_not_found());

        let err = q.resolve("x", RecordType::Other(15)).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Dns(DnsError::UnsupportedRecordType(RecordType::Other(15)))
        ));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::NotFound {
            name: Some("0-f.example.com.".into()),
        };
        assert_eq!(err.to_string(), "name not found: 0-f.example.com.");

        let err = QueryError::ResponseCode {
            code: 2,
            name: "ServFail",
        };
        assert_eq!(err.to_string(), "unsuccessful DNS response code ServFail (2)");
    }
}
