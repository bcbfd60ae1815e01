//! # WSAA Client
//!
//! `loginCms` against AFIP's authentication service.
//!
//! ## Login Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         WSAA loginCms                                   │
//! │                                                                         │
//! │  LoginTicketRequest XML                                                │
//! │       │  SigningCredentials::sign_base64()                             │
//! │       ▼                                                                 │
//! │  <wsaa:loginCms><wsaa:in0>MIAGCSqGSIb3...</wsaa:in0></wsaa:loginCms>    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <loginCmsReturn>&lt;loginTicketResponse ...&gt;</loginCmsReturn>      │
//! │       │  unescape                                                      │
//! │       ▼                                                                 │
//! │  <credentials><token>..</token><sign>..</sign></credentials>           │
//! │  <header><generationTime>..</generationTime>                           │
//! │          <expirationTime>..</expirationTime></header>                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use mostrador_db::StoredTicket;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AfipError, AfipResult};
use crate::soap::{envelope, extract_tag, unescape_xml, Delivery, SoapTransport};

const WSAA_NAMESPACE: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";

/// Fault code suffix WSAA uses while a previous ticket is still valid.
const ALREADY_AUTHENTICATED: &str = "alreadyAuthenticated";

/// Access ticket returned by `loginCms`.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub token: String,
    pub sign: String,
    pub generation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
}

impl std::fmt::Debug for LoginTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginTicket")
            .field("token_len", &self.token.len())
            .field("sign_len", &self.sign.len())
            .field("generation_time", &self.generation_time)
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

impl From<LoginTicket> for StoredTicket {
    fn from(ticket: LoginTicket) -> Self {
        StoredTicket {
            token: ticket.token,
            sign: ticket.sign,
            expires_at: ticket.expiration_time,
        }
    }
}

#[derive(Clone)]
pub struct WsaaClient {
    transport: Arc<dyn SoapTransport>,
    url: String,
}

impl WsaaClient {
    pub fn new(transport: Arc<dyn SoapTransport>, url: impl Into<String>) -> Self {
        WsaaClient {
            transport,
            url: url.into(),
        }
    }

    /// Exchanges a base64 CMS for an access ticket.
    pub async fn login_cms(&self, cms_base64: &str) -> AfipResult<LoginTicket> {
        let body = envelope(
            "wsaa",
            WSAA_NAMESPACE,
            &format!("<wsaa:loginCms><wsaa:in0>{}</wsaa:in0></wsaa:loginCms>", cms_base64),
        );

        debug!(url = %self.url, cms_len = cms_base64.len(), "Calling WSAA loginCms");

        let response = self
            .transport
            .call(&self.url, "", body, Delivery::Retryable)
            .await
            .map_err(map_wsaa_fault)?;

        let ticket = parse_login_response(&response)?;
        info!(
            generation_time = %ticket.generation_time,
            expiration_time = %ticket.expiration_time,
            "WSAA ticket obtained"
        );
        Ok(ticket)
    }
}

fn map_wsaa_fault(err: AfipError) -> AfipError {
    match err {
        AfipError::SoapFault { code, .. } if code.ends_with(ALREADY_AUTHENTICATED) => {
            warn!("WSAA reports the previous ticket is still valid");
            AfipError::AlreadyAuthenticated
        }
        other => other,
    }
}

fn parse_time(xml: &str, tag: &str) -> AfipResult<DateTime<Utc>> {
    let raw = extract_tag(xml, tag)
        .ok_or_else(|| AfipError::InvalidResponse(format!("loginTicketResponse without {}", tag)))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AfipError::InvalidResponse(format!("bad {} '{}': {}", tag, raw, e)))
}

/// Parses the SOAP response of `loginCms`.
pub fn parse_login_response(body: &str) -> AfipResult<LoginTicket> {
    let escaped = extract_tag(body, "loginCmsReturn")
        .ok_or_else(|| AfipError::InvalidResponse("missing loginCmsReturn".into()))?;
    let ticket_xml = unescape_xml(&escaped);

    let token = extract_tag(&ticket_xml, "token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AfipError::InvalidResponse("loginTicketResponse without token".into()))?;
    let sign = extract_tag(&ticket_xml, "sign")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AfipError::InvalidResponse("loginTicketResponse without sign".into()))?;

    Ok(LoginTicket {
        token,
        sign,
        generation_time: parse_time(&ticket_xml, "generationTime")?,
        expiration_time: parse_time(&ticket_xml, "expirationTime")?,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::soap::escape_xml;

    /// A `loginCms` SOAP response carrying the given ticket.
    pub fn login_response(token: &str, sign: &str, generation: &str, expiration: &str) -> String {
        let inner = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<loginTicketResponse version="1.0"><header><source>CN=wsaahomo, O=AFIP, C=AR, SERIALNUMBER=CUIT 33693450239</source><destination>SERIALNUMBER=CUIT 20123456786, CN=mostrador-test</destination><uniqueId>1234567</uniqueId><generationTime>{}</generationTime><expirationTime>{}</expirationTime></header><credentials><token>{}</token><sign>{}</sign></credentials></loginTicketResponse>"#,
            generation, expiration, token, sign
        );
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"><soapenv:Body><loginCmsResponse xmlns="http://wsaa.view.sua.dvadac.desein.afip.gov"><loginCmsReturn>{}</loginCmsReturn></loginCmsResponse></soapenv:Body></soapenv:Envelope>"#,
            escape_xml(&inner)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::login_response;
    use super::*;
    use crate::soap::scripted::ScriptedTransport;
    use chrono::TimeZone;

    #[test]
    fn test_parse_login_response() {
        let body = login_response(
            "PD94bWwgdG9rZW4=",
            "c2lnbg==",
            "2024-05-01T09:50:00.123-03:00",
            "2024-05-01T21:50:00.123-03:00",
        );
        let ticket = parse_login_response(&body).unwrap();

        assert_eq!(ticket.token, "PD94bWwgdG9rZW4=");
        assert_eq!(ticket.sign, "c2lnbg==");
        assert_eq!(
            ticket.expiration_time.timestamp(),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 50, 0).unwrap().timestamp()
        );
        // Debug output never shows credentials
        assert!(!format!("{:?}", ticket).contains("c2lnbg=="));
    }

    #[test]
    fn test_parse_login_response_missing_parts() {
        assert!(matches!(
            parse_login_response("<soapenv:Body/>"),
            Err(AfipError::InvalidResponse(_))
        ));

        let body = login_response("", "c2lnbg==", "2024-05-01T09:50:00-03:00", "2024-05-01T21:50:00-03:00");
        assert!(matches!(parse_login_response(&body), Err(AfipError::InvalidResponse(_))));

        let body = login_response("t", "s", "ayer", "2024-05-01T21:50:00-03:00");
        assert!(matches!(parse_login_response(&body), Err(AfipError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_login_cms_sends_envelope() {
        let transport = Arc::new(ScriptedTransport::new().respond(login_response(
            "tok",
            "sig",
            "2024-05-01T09:50:00-03:00",
            "2024-05-01T21:50:00-03:00",
        )));
        let client = WsaaClient::new(transport.clone(), "https://wsaa.test/LoginCms");

        let ticket = client.login_cms("Q01TLWJhc2U2NA==").await.unwrap();
        assert_eq!(ticket.token, "tok");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://wsaa.test/LoginCms");
        assert!(calls[0].envelope.contains("<wsaa:in0>Q01TLWJhc2U2NA==</wsaa:in0>"));
        assert!(calls[0].envelope.contains(WSAA_NAMESPACE));
    }

    #[tokio::test]
    async fn test_already_authenticated_fault() {
        let transport = Arc::new(ScriptedTransport::new().fail(AfipError::SoapFault {
            code: "ns1:coe.alreadyAuthenticated".into(),
            message: "El CEE ya posee un TA valido para el acceso al WSN solicitado".into(),
        }));
        let client = WsaaClient::new(transport, "https://wsaa.test/LoginCms");

        assert!(matches!(
            client.login_cms("x").await,
            Err(AfipError::AlreadyAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_other_faults_pass_through() {
        let transport = Arc::new(ScriptedTransport::new().fail(AfipError::SoapFault {
            code: "ns1:cms.cert.untrusted".into(),
            message: "Certificado no emitido por AC de confianza".into(),
        }));
        let client = WsaaClient::new(transport, "https://wsaa.test/LoginCms");

        match client.login_cms("x").await {
            Err(AfipError::SoapFault { code, .. }) => assert_eq!(code, "ns1:cms.cert.untrusted"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
