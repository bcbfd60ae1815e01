//! # SOAP Transport
//!
//! SOAP 1.1 over HTTPS for WSAA and WSFEv1, plus the small amount of XML
//! handling both services need.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SOAP Request Lifecycle                           │
//! │                                                                         │
//! │  ┌──────────┐   POST    ┌──────────┐  2xx   ┌──────────────────────┐   │
//! │  │ envelope │ ────────► │  AFIP    │ ─────► │ body returned        │   │
//! │  └──────────┘           └────┬─────┘        └──────────────────────┘   │
//! │        ▲                     │ Fault (any status)                      │
//! │        │                     ├──────────► SoapFault (never retried)    │
//! │        │   backoff           │ 5xx / connect / timeout                 │
//! │        └─────────────────────┘ (Retryable only, bounded by max_retries)│
//! │                                4xx ──────► HttpStatus                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only [`Delivery::Retryable`] calls go through the backoff loop. A
//! [`Delivery::AtMostOnce`] call is posted once; when its answer is lost the
//! caller has to ask AFIP what happened instead of sending it again.
//!
//! AFIP's schemas are fixed and small, so responses are read with a
//! prefix-aware tag scanner instead of a full XML parser.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AfipConfig;
use crate::error::{AfipError, AfipResult};

// =============================================================================
// Transport Trait
// =============================================================================

/// Whether a request may be posted again after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queries and logins. Repeating them changes nothing at AFIP.
    Retryable,
    /// Requests that assign numbers or CAEs. Posted exactly once.
    AtMostOnce,
}

/// Sends a SOAP envelope and returns the raw response body.
///
/// Implementations map SOAP faults to [`AfipError::SoapFault`] regardless of
/// the HTTP status they arrive with.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn call(&self, url: &str, soap_action: &str, envelope: String, delivery: Delivery) -> AfipResult<String>;
}

// =============================================================================
// Retry Policy
// =============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AfipConfig) -> Self {
        RetryPolicy {
            max_retries: config.afip.max_retries,
            initial_backoff: Duration::from_millis(config.afip.initial_backoff_ms),
            max_backoff: Duration::from_secs(config.afip.max_backoff_secs),
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> AfipResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AfipResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        ?delay,
                        error = %e,
                        "Transient AFIP transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport with bounded retries for [`Delivery::Retryable`]
/// calls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &AfipConfig) -> AfipResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(HttpTransport {
            client,
            retry: RetryPolicy::from_config(config),
        })
    }

    async fn post_once(&self, url: &str, soap_action: &str, envelope: &str) -> AfipResult<String> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", soap_action))
            .body(envelope.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        debug!(url = %url, status = status.as_u16(), body_len = body.len(), "SOAP response received");

        if let Some(fault) = parse_fault(&body) {
            return Err(fault);
        }

        if !status.is_success() {
            return Err(AfipError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn call(&self, url: &str, soap_action: &str, envelope: String, delivery: Delivery) -> AfipResult<String> {
        debug!(url = %url, soap_action = %soap_action, ?delivery, "Sending SOAP request");
        match delivery {
            Delivery::Retryable => {
                self.retry
                    .run(|_attempt| self.post_once(url, soap_action, &envelope))
                    .await
            }
            Delivery::AtMostOnce => self.post_once(url, soap_action, &envelope).await,
        }
    }
}

// =============================================================================
// Envelope / Fault
// =============================================================================

/// Wraps `body` in a SOAP 1.1 envelope declaring `ns` under prefix `prefix`.
pub fn envelope(prefix: &str, ns: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:{prefix}="{ns}"><soapenv:Header/><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"#,
        prefix = prefix,
        ns = ns,
        body = body
    )
}

/// SOAP fault in `body`, if any.
pub fn parse_fault(body: &str) -> Option<AfipError> {
    let fault = extract_tag(body, "Fault")?;
    let code = extract_tag(&fault, "faultcode").unwrap_or_default();
    let message = extract_tag(&fault, "faultstring")
        .map(|s| unescape_xml(&s))
        .unwrap_or_default();
    Some(AfipError::SoapFault { code, message })
}

// =============================================================================
// XML Helpers
// =============================================================================

struct OpenTag<'a> {
    /// Qualified name as written, e.g. `ns2:token`.
    name: &'a str,
    content_start: usize,
    self_closing: bool,
}

/// Next element whose local name is `tag`, searching from `from`.
fn find_open<'a>(xml: &'a str, tag: &str, from: usize) -> Option<OpenTag<'a>> {
    let mut pos = from;
    while let Some(rel) = xml[pos..].find('<') {
        let lt = pos + rel;
        let after = &xml[lt + 1..];
        let name_len = after
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(after.len());
        let name = &after[..name_len];
        let local = name.rsplit(':').next().unwrap_or(name);

        if local == tag && !name.is_empty() {
            let gt = lt + 1 + after.find('>')?;
            let self_closing = xml[..gt].ends_with('/');
            return Some(OpenTag {
                name,
                content_start: gt + 1,
                self_closing,
            });
        }
        pos = lt + 1;
    }
    None
}

/// Returns `(content, end_of_element)`.
fn element_at(xml: &str, open: &OpenTag<'_>) -> Option<(String, usize)> {
    if open.self_closing {
        return Some((String::new(), open.content_start));
    }
    let close = format!("</{}>", open.name);
    let end = open.content_start + xml[open.content_start..].find(&close)?;
    Some((xml[open.content_start..end].trim().to_string(), end + close.len()))
}

/// Trimmed content of the first element named `tag`, with or without a
/// namespace prefix and with or without attributes.
///
/// ```rust
/// use mostrador_afip::soap::extract_tag;
///
/// let xml = r#"<ns2:resp xmlns:ns2="x"><ns2:CAE>71234567890123</ns2:CAE></ns2:resp>"#;
/// assert_eq!(extract_tag(xml, "CAE").as_deref(), Some("71234567890123"));
/// assert_eq!(extract_tag(xml, "Obs"), None);
/// ```
pub fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = find_open(xml, tag, 0)?;
    element_at(xml, &open).map(|(content, _)| content)
}

/// Contents of every element named `tag`, in document order.
pub fn extract_all(xml: &str, tag: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(open) = find_open(xml, tag, pos) {
        match element_at(xml, &open) {
            Some((content, end)) => {
                found.push(content);
                pos = end;
            }
            None => break,
        }
    }
    found
}

pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

pub fn unescape_xml(escaped: &str) -> String {
    escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#xD;", "\r")
        .replace("&#13;", "\r")
        .replace("&amp;", "&")
}

// =============================================================================
// Scripted Transport (tests)
// =============================================================================

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded request.
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub url: String,
        pub soap_action: String,
        pub envelope: String,
        pub delivery: Delivery,
    }

    /// Replays queued responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<AfipResult<String>>>,
        calls: Mutex<Vec<Recorded>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, body: impl Into<String>) -> Self {
            self.responses.lock().unwrap().push_back(Ok(body.into()));
            self
        }

        pub fn fail(self, err: AfipError) -> Self {
            self.responses.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> Vec<Recorded> {
            self.calls.lock().unwrap().clone()
        }

        pub fn actions(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.soap_action).collect()
        }
    }

    #[async_trait]
    impl SoapTransport for ScriptedTransport {
        async fn call(&self, url: &str, soap_action: &str, envelope: String, delivery: Delivery) -> AfipResult<String> {
            self.calls.lock().unwrap().push(Recorded {
                url: url.to_string(),
                soap_action: soap_action.to_string(),
                envelope,
                delivery,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AfipError::InvalidResponse("no scripted response left".into())))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
