//! DNS over HTTPS querier (RFC 8484, POST only)
//!
//! Queries are packed by hand and sent as the raw POST body; answers are
//! the raw DNS message in the response body.  CNAME chains are not
//! followed: only answers of the requested type are returned.

use super::post::{builtin_post, PostClient, MAX_POST_BODY};
use super::{QueryError, Querier, Result};
use crate::dns::{DnsMessage, RecordType, ResponseCode};
use crate::pool::Pool;
use async_trait::async_trait;
use std::sync::Arc;

/// Configuration for a [`DohQuerier`]
#[derive(Clone, Default)]
pub struct DohConfig {
    /// URL of the DoH server, e.g. `https://dns.quad9.net/dns-query`
    pub url: String,

    /// Transport for the POSTs; [`builtin_post`] if unset
    pub post: Option<Arc<dyn PostClient>>,
}

/// [`Querier`] speaking DNS over HTTPS
pub struct DohQuerier {
    url: String,
    post: Arc<dyn PostClient>,
    queries: Arc<Pool<Vec<u8>>>,
}

impl DohQuerier {
    pub fn new(config: DohConfig) -> Result<Self> {
        let post = match config.post {
            Some(post) => post,
            None => Arc::new(builtin_post()?),
        };

        Ok(Self {
            url: config.url,
            post,
            queries: Arc::new(Pool::buffers(MAX_POST_BODY)),
        })
    }

    async fn query(&self, name: &str, rtype: RecordType) -> Result<Vec<String>> {
        let mut body = self.queries.get();
        body.clear();
        append_query(name, rtype, &mut body)?;

        log::debug!("DoH {} query for {} ({} bytes)", rtype, name, body.len());

        let answer = self.post.post(&self.url, &body).await?;
        parse_doh_answer(&answer, rtype)
    }
}

#[async_trait]
impl Querier for DohQuerier {
    async fn a(&self, name: &str) -> Result<Vec<String>> {
        self.query(name, RecordType::A).await
    }

    async fn aaaa(&self, name: &str) -> Result<Vec<String>> {
        self.query(name, RecordType::AAAA).await
    }

    async fn txt(&self, name: &str) -> Result<Vec<String>> {
        self.query(name, RecordType::TXT).await
    }
}

/// Append a recursive query for `qname` to `buf`
///
/// The message has ID 0, RD set and a single class IN question, suitable
/// as a DoH POST body.
pub fn append_query(qname: &str, qtype: RecordType, buf: &mut Vec<u8>) -> Result<()> {
    qtype.payload_capacity()?;

    let qname = if qname.ends_with('.') {
        qname.to_string()
    } else {
        format!("{}.", qname)
    };

    DnsMessage::new_query(&qname, qtype).write(buf)?;
    Ok(())
}

/// Build a recursive query for `qname`; see [`append_query`]
pub fn build_query(qname: &str, qtype: RecordType) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(512);
    append_query(qname, qtype, &mut buf)?;
    Ok(buf)
}

/// Parse a DoH answer, returning the text of the records of type `filter`
///
/// A successful answer without matching records gives an empty list, not
/// an error.  NXDOMAIN gives [`QueryError::NotFound`] carrying the question
/// name, if the answer has one.
pub fn parse_doh_answer(answer: &[u8], filter: RecordType) -> Result<Vec<String>> {
    filter.payload_capacity()?;

    let msg = DnsMessage::parse(answer)?;

    match msg.header.rcode() {
        ResponseCode::NO_ERROR => {}
        ResponseCode::NX_DOMAIN => {
            return Err(QueryError::NotFound {
                name: msg.questions.first().map(|q| format!("{}.", q.qname)),
            });
        }
        rcode => {
            return Err(QueryError::ResponseCode {
                code: rcode.0,
                name: rcode.name(),
            });
        }
    }

    msg.answers
        .iter()
        .filter(|record| record.rtype == filter)
        .map(|record| record.rdata_text().map_err(QueryError::from))
        .collect()
}
