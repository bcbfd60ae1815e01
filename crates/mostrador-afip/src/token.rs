//! # Token Manager
//!
//! Hands out WSAA access tickets, logging in only when needed.
//!
//! ## Ticket Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ticket(business_id)                               │
//! │                                                                         │
//! │  1. in-memory cache   ── more than refresh margin left? ──► reuse      │
//! │  2. database cache    ── more than refresh margin left? ──► reuse      │
//! │  3. loginCms          ── sign request, call WSAA, persist ──► new      │
//! │        │                                                                │
//! │        └─ alreadyAuthenticated                                         │
//! │              ├─ persisted ticket not yet expired ──► reuse it          │
//! │              └─ otherwise ──► AlreadyAuthenticated (wait it out)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WSAA refuses a new ticket for the same certificate and service while the
//! previous one is valid, so tickets are persisted and shared across runs.

use chrono::{DateTime, Utc};
use mostrador_db::{Database, FiscalConfigRepository, StoredTicket};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::certificates::CertificateService;
use crate::config::{AfipConfig, WSFE_SERVICE};
use crate::error::{AfipError, AfipResult};
use crate::ticket::LoginTicketRequest;
use crate::wsaa::WsaaClient;

/// Token and sign for WSFEv1 calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessTicket {
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessTicket {
    /// True while more than `margin` of validity remains.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at - now > margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for AccessTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTicket")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl From<StoredTicket> for AccessTicket {
    fn from(t: StoredTicket) -> Self {
        AccessTicket {
            token: t.token,
            sign: t.sign,
            expires_at: t.expires_at,
        }
    }
}

impl From<&AccessTicket> for StoredTicket {
    fn from(t: &AccessTicket) -> Self {
        StoredTicket {
            token: t.token.clone(),
            sign: t.sign.clone(),
            expires_at: t.expires_at,
        }
    }
}

pub struct TokenManager {
    wsaa: WsaaClient,
    certificates: CertificateService,
    configs: FiscalConfigRepository,
    config: AfipConfig,
    cache: RwLock<HashMap<String, AccessTicket>>,
}

impl TokenManager {
    pub fn new(wsaa: WsaaClient, certificates: CertificateService, db: &Database, config: AfipConfig) -> Self {
        TokenManager {
            wsaa,
            certificates,
            configs: db.fiscal_configs(),
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A ticket with more than the refresh margin left, logging in if needed.
    pub async fn ticket(&self, business_id: &str) -> AfipResult<AccessTicket> {
        let margin = self.config.refresh_margin();

        {
            let cache = self.cache.read().await;
            if let Some(ticket) = cache.get(business_id) {
                if ticket.is_fresh(Utc::now(), margin) {
                    debug!(business_id = %business_id, expires_at = %ticket.expires_at, "Using cached ticket");
                    return Ok(ticket.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Double-check after acquiring write lock
        if let Some(ticket) = cache.get(business_id) {
            if ticket.is_fresh(Utc::now(), margin) {
                return Ok(ticket.clone());
            }
        }

        let persisted: Option<AccessTicket> = self.configs.cached_ticket(business_id).await?.map(Into::into);
        if let Some(ticket) = &persisted {
            if ticket.is_fresh(Utc::now(), margin) {
                debug!(business_id = %business_id, expires_at = %ticket.expires_at, "Using persisted ticket");
                cache.insert(business_id.to_string(), ticket.clone());
                return Ok(ticket.clone());
            }
        }

        match self.login(business_id).await {
            Ok(ticket) => {
                self.configs.cache_ticket(business_id, &StoredTicket::from(&ticket)).await?;
                cache.insert(business_id.to_string(), ticket.clone());
                Ok(ticket)
            }
            Err(AfipError::AlreadyAuthenticated) => match persisted {
                Some(ticket) if !ticket.is_expired(Utc::now()) => {
                    warn!(
                        business_id = %business_id,
                        expires_at = %ticket.expires_at,
                        "WSAA refused a new ticket; reusing the persisted one until it expires"
                    );
                    cache.insert(business_id.to_string(), ticket.clone());
                    Ok(ticket)
                }
                _ => Err(AfipError::AlreadyAuthenticated),
            },
            Err(e) => Err(e),
        }
    }

    /// Drops both caches, e.g. after WSFEv1 rejects the token.
    pub async fn invalidate(&self, business_id: &str) -> AfipResult<()> {
        self.cache.write().await.remove(business_id);
        self.configs.clear_ticket(business_id).await?;
        info!(business_id = %business_id, "WSAA ticket invalidated");
        Ok(())
    }

    async fn login(&self, business_id: &str) -> AfipResult<AccessTicket> {
        let credentials = self.certificates.signing_credentials(business_id).await?;

        let request = LoginTicketRequest::new(
            WSFE_SERVICE,
            Utc::now(),
            self.config.clock_skew(),
            self.config.ticket_validity(),
        );
        debug!(
            business_id = %business_id,
            unique_id = request.unique_id,
            expiration_time = %request.expiration_time,
            "Requesting WSAA ticket"
        );

        let cms = credentials.sign_base64(&request.to_xml())?;
        let ticket = self.wsaa.login_cms(&cms).await?;

        info!(business_id = %business_id, expires_at = %ticket.expiration_time, "Logged in to WSAA");
        Ok(AccessTicket {
            token: ticket.token,
            sign: ticket.sign,
            expires_at: ticket.expiration_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::test_support::{active_fixture, Fixture};
    use crate::soap::scripted::ScriptedTransport;
    use crate::wsaa::fixtures::login_response;
    use chrono::Duration;
    use std::sync::Arc;

    fn manager(fx: &Fixture, transport: Arc<ScriptedTransport>) -> TokenManager {
        TokenManager::new(
            WsaaClient::new(transport, "https://wsaa.test/LoginCms"),
            fx.service.clone(),
            &fx.db,
            fx.config.clone(),
        )
    }

    fn response_expiring_in(hours: i64) -> String {
        let now = Utc::now();
        login_response(
            "tok",
            "sig",
            &now.to_rfc3339(),
            &(now + Duration::hours(hours)).to_rfc3339(),
        )
    }

    #[test]
    fn test_freshness() {
        let now = Utc::now();
        let ticket = AccessTicket {
            token: "t".into(),
            sign: "s".into(),
            expires_at: now + Duration::minutes(5),
        };
        assert!(!ticket.is_fresh(now, Duration::minutes(10)));
        assert!(!ticket.is_expired(now));
        assert!(ticket.is_fresh(now, Duration::minutes(1)));
        assert!(!format!("{:?}", ticket).contains("sig"));
    }

    #[tokio::test]
    async fn test_login_once_then_reuse() {
        let fx = active_fixture().await;
        let transport = Arc::new(ScriptedTransport::new().respond(response_expiring_in(12)));
        let tokens = manager(&fx, transport.clone());

        let first = tokens.ticket("biz-1").await.unwrap();
        let second = tokens.ticket("biz-1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls().len(), 1);

        // The signed request went out as base64 CMS
        assert!(transport.calls()[0].envelope.contains("<wsaa:in0>MI"));

        // A new manager (new process) picks the ticket up from the database
        let other_transport = Arc::new(ScriptedTransport::new());
        let restarted = manager(&fx, other_transport.clone());
        assert_eq!(restarted.ticket("biz-1").await.unwrap().token, "tok");
        assert!(other_transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_near_expiry_ticket_is_refreshed() {
        let fx = active_fixture().await;
        fx.db
            .fiscal_configs()
            .cache_ticket(
                "biz-1",
                &StoredTicket {
                    token: "old".into(),
                    sign: "old".into(),
                    expires_at: Utc::now() + Duration::minutes(5),
                },
            )
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::new().respond(response_expiring_in(12)));
        let tokens = manager(&fx, transport.clone());

        assert_eq!(tokens.ticket("biz-1").await.unwrap().token, "tok");
        assert_eq!(transport.calls().len(), 1);
        let stored = fx.db.fiscal_configs().cached_ticket("biz-1").await.unwrap().unwrap();
        assert_eq!(stored.token, "tok");
    }

    #[tokio::test]
    async fn test_already_authenticated_falls_back_to_persisted() {
        let fx = active_fixture().await;
        fx.db
            .fiscal_configs()
            .cache_ticket(
                "biz-1",
                &StoredTicket {
                    token: "still-valid".into(),
                    sign: "s".into(),
                    expires_at: Utc::now() + Duration::minutes(5),
                },
            )
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::new().fail(AfipError::AlreadyAuthenticated));
        let tokens = manager(&fx, transport);

        assert_eq!(tokens.ticket("biz-1").await.unwrap().token, "still-valid");
    }

    #[tokio::test]
    async fn test_already_authenticated_without_ticket_surfaces() {
        let fx = active_fixture().await;
        let transport = Arc::new(ScriptedTransport::new().fail(AfipError::SoapFault {
            code: "ns1:coe.alreadyAuthenticated".into(),
            message: "El CEE ya posee un TA valido".into(),
        }));
        let tokens = manager(&fx, transport);

        assert!(matches!(
            tokens.ticket("biz-1").await,
            Err(AfipError::AlreadyAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_forces_login() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(response_expiring_in(12))
                .respond(response_expiring_in(12)),
        );
        let tokens = manager(&fx, transport.clone());

        tokens.ticket("biz-1").await.unwrap();
        tokens.invalidate("biz-1").await.unwrap();
        assert!(fx.db.fiscal_configs().cached_ticket("biz-1").await.unwrap().is_none());

        tokens.ticket("biz-1").await.unwrap();
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_inactive_configuration_cannot_login() {
        let fx = crate::certificates::test_support::fixture().await;
        let transport = Arc::new(ScriptedTransport::new());
        let tokens = manager(&fx, transport.clone());

        assert!(matches!(
            tokens.ticket("biz-1").await,
            Err(AfipError::ConfigInactive { .. })
        ));
        assert!(transport.calls().is_empty());
    }
}
