//! # Invoice Authorizer
//!
//! Drives a fiscal invoice from `pending_cae` to `authorized` or `rejected`.
//!
//! ## Authorization Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        authorize(invoice_id)                            │
//! │                                                                         │
//! │  1. Invoice fiscal and pending_cae, configuration active               │
//! │  2. TokenManager::ticket()                                             │
//! │  3. FECompUltimoAutorizado ──► reconcile with local sequence           │
//! │  4. Earlier unanswered attempt? FECompConsultar ──► adopt its CAE      │
//! │  5. Record attempt, FECAESolicitar once (next number, Argentina date)  │
//! │        │                                                                │
//! │        ├─ A ──► store CAE + expiry + number, advance sequence          │
//! │        ├─ R ──► store rejection with AFIP codes                        │
//! │        └─ no answer ──► FECompConsultar                                │
//! │                ├─ found, same sale ──► store its CAE                   │
//! │                └─ otherwise ──► invoice stays pending_cae, error out   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no scheduler: pending invoices are retried when an operator
//! runs [`InvoiceAuthorizer::authorize_pending`].

use chrono::{NaiveDate, Utc};
use mostrador_core::{
    AfipMessage, CoreError, Invoice, InvoiceStatus, Money, VoucherSequence,
};
use mostrador_db::{Database, DbError, FiscalConfigRepository, InvoiceRepository};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::certificates::require_config;
use crate::config::AfipConfig;
use crate::error::{AfipError, AfipResult};
use crate::ticket::argentina_date;
use crate::token::TokenManager;
use crate::wsfe::{AssociatedVoucher, CaeOutcome, CaeRequest, WsfeAuth, WsfeClient, TOKEN_VALIDATION_ERROR};

// =============================================================================
// Outcomes
// =============================================================================

/// What AFIP decided for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Authorized {
        invoice_id: String,
        cae: String,
        cae_expires_on: NaiveDate,
        voucher_number: i64,
    },
    Rejected {
        invoice_id: String,
        errors: Vec<AfipMessage>,
    },
}

impl AuthorizationOutcome {
    pub fn invoice_id(&self) -> &str {
        match self {
            AuthorizationOutcome::Authorized { invoice_id, .. } => invoice_id,
            AuthorizationOutcome::Rejected { invoice_id, .. } => invoice_id,
        }
    }
}

/// An invoice skipped by [`InvoiceAuthorizer::authorize_pending`].
#[derive(Debug)]
pub struct InvoiceFailure {
    pub invoice_id: String,
    pub error: AfipError,
}

/// Result of a manual pending run.
#[derive(Debug, Default)]
pub struct PendingRunReport {
    pub outcomes: Vec<AuthorizationOutcome>,
    /// Invoice-specific failures; the run continued past them.
    pub failures: Vec<InvoiceFailure>,
    /// Failure that ended the run early (transport, credentials, ...).
    pub stopped_by: Option<AfipError>,
    /// Pending invoices not attempted.
    pub remaining: usize,
}

impl PendingRunReport {
    pub fn authorized(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AuthorizationOutcome::Authorized { .. }))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.authorized()
    }
}

/// Failures confined to one invoice; the next invoice may still succeed.
fn is_invoice_specific(err: &AfipError) -> bool {
    matches!(err, AfipError::Core(e) if !matches!(e, CoreError::NonMonotonicSequence { .. }))
}

// =============================================================================
// Authorizer
// =============================================================================

pub struct InvoiceAuthorizer {
    invoices: InvoiceRepository,
    configs: FiscalConfigRepository,
    tokens: Arc<TokenManager>,
    wsfe: WsfeClient,
    config: AfipConfig,
}

impl InvoiceAuthorizer {
    pub fn new(db: &Database, tokens: Arc<TokenManager>, wsfe: WsfeClient, config: AfipConfig) -> Self {
        InvoiceAuthorizer {
            invoices: db.invoices(),
            configs: db.fiscal_configs(),
            tokens,
            wsfe,
            config,
        }
    }

    /// Requests a CAE for one `pending_cae` invoice.
    ///
    /// `FECAESolicitar` is never sent twice for the same attempt. When its
    /// answer is lost, AFIP is asked for the voucher with `FECompConsultar`;
    /// if that fails too, the attempt stays recorded and the next call
    /// settles it before choosing a new number.
    ///
    /// ## Errors
    /// - `Core(NotFiscal)` / `Core(InvalidInvoiceStatus)` for internal sales
    ///   or invoices not pending
    /// - `ConfigInactive` until credentials are validated
    /// - Transport errors, after which the invoice is still `pending_cae`
    /// - `UnrecordedAuthorization` when AFIP granted a CAE that could not be
    ///   stored
    pub async fn authorize(&self, invoice_id: &str) -> AfipResult<AuthorizationOutcome> {
        let invoice = self.invoices.require(invoice_id).await?;
        let (pos, voucher_type) = invoice.voucher()?;
        if invoice.status != InvoiceStatus::PendingCae {
            return Err(CoreError::InvalidInvoiceStatus {
                invoice_id: invoice.id.clone(),
                current_status: invoice.status.to_string(),
                operation: "authorize".to_string(),
            }
            .into());
        }
        let business_id = invoice.business_id.clone();
        let point_of_sale = pos as u32;

        let fiscal = require_config(&self.configs, &business_id).await?;
        if !fiscal.is_active() {
            return Err(AfipError::ConfigInactive {
                business_id,
                status: fiscal.status.to_string(),
            });
        }
        if fiscal.environment != self.config.afip.environment {
            return Err(AfipError::Config(format!(
                "business {} is configured for {} but this installation targets {}",
                business_id, fiscal.environment, self.config.afip.environment
            )));
        }
        let issuer = fiscal.issuer_cuit()?;

        let associated = match &invoice.associated_invoice_id {
            Some(original_id) => Some(AssociatedVoucher::of(&self.invoices.require(original_id).await?)?),
            None => None,
        };

        // Number is filled in after reconciling with AFIP
        let mut request = CaeRequest::for_invoice(&invoice, 0, argentina_date(Utc::now()), associated)?;

        let ticket = self.tokens.ticket(&business_id).await?;
        let auth = WsfeAuth::new(&ticket, issuer);

        let afip_last = match self.wsfe.last_authorized(&auth, point_of_sale, voucher_type).await {
            Ok(last) => last,
            Err(e) => return Err(self.on_wsfe_error(&business_id, e).await),
        };
        let local_last = self
            .configs
            .last_voucher_number(&business_id, point_of_sale, voucher_type)
            .await?
            .unwrap_or(0);
        let sequence = VoucherSequence::new(point_of_sale, voucher_type, local_last);
        let next = sequence.next_from_afip(afip_last)?;

        // An earlier request for this invoice went unanswered
        if let Some(attempted) = self.invoices.cae_attempt(invoice_id).await? {
            if attempted <= afip_last {
                request.number = attempted;
                match self.find_own_authorization(&auth, &request).await {
                    Ok(Some((cae, cae_expires_on))) => {
                        warn!(
                            invoice_id = %invoice_id,
                            voucher_number = attempted,
                            cae = %cae,
                            "Recovered CAE of an unanswered request"
                        );
                        return self
                            .record_approval(invoice, &request, cae, cae_expires_on, attempted)
                            .await;
                    }
                    Ok(None) => {}
                    Err(e) => return Err(self.on_wsfe_error(&business_id, e).await),
                }
            }
            debug!(invoice_id = %invoice_id, voucher_number = attempted, "AFIP holds no CAE for the earlier attempt");
            self.invoices.clear_cae_attempt(invoice_id).await?;
        }
        request.number = next;

        debug!(
            invoice_id = %invoice_id,
            point_of_sale,
            voucher_type = voucher_type.code(),
            local_last,
            afip_last,
            voucher_number = request.number,
            "Voucher number reconciled"
        );

        self.invoices
            .record_cae_attempt(invoice_id, point_of_sale, voucher_type, request.number, Utc::now())
            .await?;

        let response = match self.wsfe.request_cae(&auth, &request).await {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                warn!(
                    invoice_id = %invoice_id,
                    voucher_number = request.number,
                    error = %e,
                    "CAE request unanswered; asking AFIP for the voucher"
                );
                return match self.find_own_authorization(&auth, &request).await {
                    Ok(Some((cae, cae_expires_on))) => {
                        self.record_approval(invoice, &request, cae, cae_expires_on, request.number)
                            .await
                    }
                    Ok(None) => Err(e),
                    Err(lookup) => {
                        warn!(
                            invoice_id = %invoice_id,
                            error = %lookup,
                            "Voucher lookup failed; the next run checks it before requesting again"
                        );
                        Err(e)
                    }
                };
            }
            Err(e) => return Err(self.on_wsfe_error(&business_id, e).await),
        };

        match response.outcome {
            CaeOutcome::Approved => {
                let (Some(cae), Some(cae_expires_on)) = (response.cae.clone(), response.cae_expires_on) else {
                    return Err(AfipError::InvalidResponse(
                        "approved voucher without CAE or CAEFchVto".into(),
                    ));
                };
                let voucher_number = if response.number > 0 { response.number } else { request.number };
                self.record_approval(invoice, &request, cae, cae_expires_on, voucher_number)
                    .await
            }
            CaeOutcome::Rejected | CaeOutcome::Partial => {
                let mut invoice = invoice;
                let now = Utc::now();
                let errors = response.rejection_messages();
                invoice.apply_rejection(&errors, now)?;
                self.invoices.store_rejection(invoice_id, &errors, now).await?;

                warn!(
                    invoice_id = %invoice_id,
                    business_id = %business_id,
                    codes = ?errors.iter().map(|e| e.code).collect::<Vec<_>>(),
                    "Invoice rejected"
                );
                Ok(AuthorizationOutcome::Rejected {
                    invoice_id: invoice_id.to_string(),
                    errors,
                })
            }
        }
    }

    /// Moves a rejected invoice back to `pending_cae` and authorizes it.
    pub async fn retry(&self, invoice_id: &str) -> AfipResult<AuthorizationOutcome> {
        let mut invoice = self.invoices.require(invoice_id).await?;
        let now = Utc::now();
        invoice.reset_for_retry(now)?;
        self.invoices.reset_for_retry(invoice_id, now).await?;
        info!(invoice_id = %invoice_id, "Rejected invoice queued for retry");

        self.authorize(invoice_id).await
    }

    /// Authorizes every pending invoice of a business, oldest first.
    ///
    /// Stops at the first failure that would affect every remaining invoice
    /// (transport, credentials, configuration, numbering).
    pub async fn authorize_pending(&self, business_id: &str) -> AfipResult<PendingRunReport> {
        let pending = self.invoices.list_pending_cae(business_id).await?;
        info!(business_id = %business_id, count = pending.len(), "Authorizing pending invoices");

        let mut report = PendingRunReport::default();
        let total = pending.len();

        for (index, invoice) in pending.iter().enumerate() {
            match self.authorize(&invoice.id).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) if is_invoice_specific(&e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "Skipping invoice");
                    report.failures.push(InvoiceFailure {
                        invoice_id: invoice.id.clone(),
                        error: e,
                    });
                }
                Err(e) => {
                    error!(invoice_id = %invoice.id, error = %e, "Stopping pending run");
                    report.remaining = total - index;
                    report.stopped_by = Some(e);
                    break;
                }
            }
        }

        info!(
            business_id = %business_id,
            authorized = report.authorized(),
            rejected = report.rejected(),
            skipped = report.failures.len(),
            remaining = report.remaining,
            "Pending run finished"
        );
        Ok(report)
    }

    /// Creates and stores a `pending_cae` credit note against an authorized
    /// invoice, bounded by what was not credited yet.
    pub async fn create_credit_note(&self, original_id: &str, amount: Money) -> AfipResult<Invoice> {
        let original = self.invoices.require(original_id).await?;
        let already_credited = self.invoices.credited_total(original_id).await?;

        let note = Invoice::credit_note_for(&original, amount, already_credited, Utc::now())?;
        // Rechecked against notes stored since the read above
        self.invoices.insert_credit_note(&note, original.total()).await?;

        info!(
            invoice_id = %note.id,
            original_id = %original_id,
            amount = %amount,
            "Credit note created"
        );
        Ok(note)
    }

    /// CAE AFIP granted to `request`'s number, if the voucher it holds under
    /// that number is this sale.
    async fn find_own_authorization(
        &self,
        auth: &WsfeAuth,
        request: &CaeRequest,
    ) -> AfipResult<Option<(String, NaiveDate)>> {
        let Some(voucher) = self
            .wsfe
            .query_voucher(auth, request.point_of_sale, request.voucher_type, request.number)
            .await?
        else {
            return Ok(None);
        };

        if !voucher.matches(request) {
            warn!(
                voucher_number = request.number,
                total = %voucher.total,
                "Voucher number belongs to a different sale"
            );
            return Ok(None);
        }
        Ok(voucher
            .authorization()
            .map(|(cae, expires)| (cae.to_string(), expires)))
    }

    /// Stores a granted CAE and advances the local sequence.
    async fn record_approval(
        &self,
        mut invoice: Invoice,
        request: &CaeRequest,
        cae: String,
        cae_expires_on: NaiveDate,
        voucher_number: i64,
    ) -> AfipResult<AuthorizationOutcome> {
        let now = Utc::now();
        let stored = match invoice.apply_authorization(&cae, cae_expires_on, voucher_number, now) {
            Ok(()) => self
                .invoices
                .store_authorization(&invoice.id, &cae, cae_expires_on, voucher_number, now)
                .await
                .map_err(AfipError::from),
            Err(e) => Err(e.into()),
        };

        if let Err(e) = stored {
            error!(
                invoice_id = %invoice.id,
                voucher_number,
                cae = %cae,
                cae_expires_on = %cae_expires_on,
                error = %e,
                "CAE granted by AFIP but not recorded"
            );
            return Err(AfipError::UnrecordedAuthorization {
                invoice_id: invoice.id,
                cae,
                cae_expires_on,
                voucher_number,
                reason: e.to_string(),
            });
        }

        match self
            .configs
            .record_voucher_number(&invoice.business_id, request.point_of_sale, request.voucher_type, voucher_number)
            .await
        {
            Ok(()) => {}
            // AFIP is the authority on numbering; the next run reconciles
            Err(DbError::Conflict { .. }) => warn!(
                business_id = %invoice.business_id,
                voucher_number,
                "Local sequence already at or past the authorized number"
            ),
            Err(e) => return Err(e.into()),
        }

        info!(
            invoice_id = %invoice.id,
            business_id = %invoice.business_id,
            voucher_number,
            cae = %cae,
            "Invoice authorized"
        );
        Ok(AuthorizationOutcome::Authorized {
            invoice_id: invoice.id,
            cae,
            cae_expires_on,
            voucher_number,
        })
    }

    /// Drops the ticket when WSFEv1 says it is no longer valid.
    async fn on_wsfe_error(&self, business_id: &str, err: AfipError) -> AfipError {
        if let AfipError::Wsfe(messages) = &err {
            if messages.iter().any(|m| m.code == TOKEN_VALIDATION_ERROR) {
                if let Err(e) = self.tokens.invalidate(business_id).await {
                    warn!(business_id = %business_id, error = %e, "Could not invalidate ticket");
                }
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificates::test_support::{active_fixture, fixture, Fixture};
    use crate::soap::scripted::ScriptedTransport;
    use crate::soap::Delivery;
    use crate::wsaa::fixtures::login_response;
    use crate::wsaa::WsaaClient;
    use crate::wsfe::fixtures::*;
    use chrono::{DateTime, Duration};
    use mostrador_core::{
        Concept, Customer, Environment, FiscalAmounts, IvaRate, PaymentMethod, VoucherType,
    };

    const CAE: &str = "74123456789012";

    fn authorizer(fx: &Fixture, transport: Arc<ScriptedTransport>) -> InvoiceAuthorizer {
        let tokens = TokenManager::new(
            WsaaClient::new(transport.clone(), "https://wsaa.test/LoginCms"),
            fx.service.clone(),
            &fx.db,
            fx.config.clone(),
        );
        InvoiceAuthorizer::new(
            &fx.db,
            Arc::new(tokens),
            WsfeClient::new(transport, "https://wsfe.test/service.asmx"),
            fx.config.clone(),
        )
    }

    fn login() -> String {
        let now = Utc::now();
        login_response("tok", "sig", &now.to_rfc3339(), &(now + Duration::hours(12)).to_rfc3339())
    }

    async fn pending_invoice(fx: &Fixture, total_cents: i64, issued_at: DateTime<Utc>) -> Invoice {
        let amounts = FiscalAmounts::from_gross(
            Money::from_cents(total_cents),
            Money::zero(),
            IvaRate::GENERAL,
            VoucherType::FacturaB,
        );
        let invoice = Invoice::new_fiscal(
            "biz-1",
            VoucherType::FacturaB,
            3,
            &Customer::Anonymous,
            Concept::Products,
            PaymentMethod::Cash,
            amounts,
            issued_at,
        )
        .unwrap();
        fx.db.invoices().insert(&invoice).await.unwrap();
        invoice
    }

    #[tokio::test]
    async fn test_authorize_approved() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 12_100, Utc::now()).await;

        let outcome = authorizer.authorize(&invoice.id).await.unwrap();
        assert_eq!(
            outcome,
            AuthorizationOutcome::Authorized {
                invoice_id: invoice.id.clone(),
                cae: CAE.to_string(),
                cae_expires_on: NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(),
                voucher_number: 43,
            }
        );

        let stored = fx.db.invoices().require(&invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::Authorized);
        assert_eq!(stored.cae.as_deref(), Some(CAE));
        assert_eq!(stored.voucher_number, Some(43));

        let last = fx
            .db
            .fiscal_configs()
            .last_voucher_number("biz-1", 3, VoucherType::FacturaB)
            .await
            .unwrap();
        assert_eq!(last, Some(43));

        assert_eq!(
            transport.actions(),
            vec![
                "".to_string(),
                "http://ar.gov.afip.dif.FEV1/FECompUltimoAutorizado".to_string(),
                "http://ar.gov.afip.dif.FEV1/FECAESolicitar".to_string(),
            ]
        );
        let calls = transport.calls();
        assert!(calls[2].envelope.contains("<ar:CbteDesde>43</ar:CbteDesde>"));
        assert!(calls[2].envelope.contains("<ar:Cuit>20123456786</ar:Cuit>"));

        // Authorized invoices are final
        assert!(matches!(
            authorizer.authorize(&invoice.id).await,
            Err(AfipError::Core(CoreError::InvalidInvoiceStatus { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejection_then_explicit_retry() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(rejected_response(43, 10016, "El campo CbteFch es invalido"))
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 5_000, Utc::now()).await;

        let outcome = authorizer.authorize(&invoice.id).await.unwrap();
        match &outcome {
            AuthorizationOutcome::Rejected { errors, .. } => assert_eq!(errors[0].code, 10016),
            other => panic!("unexpected: {:?}", other),
        }
        let stored = fx.db.invoices().require(&invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::Rejected);
        assert_eq!(stored.rejection_errors()[0].code, 10016);

        // Rejected invoices are not picked up without an explicit retry
        let report = authorizer.authorize_pending("biz-1").await.unwrap();
        assert!(report.outcomes.is_empty());

        let outcome = authorizer.retry(&invoice.id).await.unwrap();
        assert!(matches!(outcome, AuthorizationOutcome::Authorized { voucher_number: 43, .. }));
        // Ticket was reused for the retry
        assert_eq!(transport.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_invoice_pending() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .fail(AfipError::HttpStatus {
                    status: 503,
                    url: "https://wsfe.test/service.asmx".into(),
                })
                .respond(voucher_not_found_response()),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 5_000, Utc::now()).await;

        let err = authorizer.authorize(&invoice.id).await.unwrap_err();
        assert!(err.is_transport());

        let stored = fx.db.invoices().require(&invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::PendingCae);
        assert!(fx
            .db
            .fiscal_configs()
            .last_voucher_number("biz-1", 3, VoucherType::FacturaB)
            .await
            .unwrap()
            .is_none());

        // Asked, not resent
        let actions = transport.actions();
        assert_eq!(
            actions[2..],
            [
                "http://ar.gov.afip.dif.FEV1/FECAESolicitar".to_string(),
                "http://ar.gov.afip.dif.FEV1/FECompConsultar".to_string(),
            ]
        );
        assert_eq!(fx.db.invoices().cae_attempt(&invoice.id).await.unwrap(), Some(43));
    }

    #[tokio::test]
    async fn test_lost_cae_response_is_recovered_not_resent() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .fail(AfipError::HttpStatus {
                    status: 504,
                    url: "https://wsfe.test/service.asmx".into(),
                })
                .respond(voucher_query_response(43, "121.00", CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 12_100, Utc::now()).await;

        let outcome = authorizer.authorize(&invoice.id).await.unwrap();
        assert!(matches!(
            &outcome,
            AuthorizationOutcome::Authorized { voucher_number: 43, cae, .. } if cae == CAE
        ));

        let solicitar: Vec<_> = transport
            .calls()
            .into_iter()
            .filter(|c| c.soap_action.ends_with("FECAESolicitar"))
            .collect();
        assert_eq!(solicitar.len(), 1);
        assert_eq!(solicitar[0].delivery, Delivery::AtMostOnce);

        let stored = fx.db.invoices().require(&invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::Authorized);
        assert_eq!(stored.voucher_number, Some(43));
        assert_eq!(fx.db.invoices().cae_attempt(&invoice.id).await.unwrap(), None);
        assert_eq!(
            fx.db
                .fiscal_configs()
                .last_voucher_number("biz-1", 3, VoucherType::FacturaB)
                .await
                .unwrap(),
            Some(43)
        );
    }

    #[tokio::test]
    async fn test_unsettled_attempt_is_checked_before_a_new_number() {
        let fx = active_fixture().await;
        let timeout = || AfipError::HttpStatus {
            status: 504,
            url: "https://wsfe.test/service.asmx".into(),
        };
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .fail(timeout())
                .fail(timeout())
                // Next run: AFIP did number it 43, for this sale
                .respond(last_authorized_response(43))
                .respond(voucher_query_response(43, "121.00", CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 12_100, Utc::now()).await;

        assert!(authorizer.authorize(&invoice.id).await.unwrap_err().is_transport());
        assert_eq!(fx.db.invoices().cae_attempt(&invoice.id).await.unwrap(), Some(43));

        let outcome = authorizer.authorize(&invoice.id).await.unwrap();
        assert!(matches!(outcome, AuthorizationOutcome::Authorized { voucher_number: 43, .. }));
        assert_eq!(
            transport
                .actions()
                .iter()
                .filter(|a| a.ends_with("FECAESolicitar"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_attempt_afip_never_numbered_is_sent_again() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 12_100, Utc::now()).await;
        fx.db
            .invoices()
            .record_cae_attempt(&invoice.id, 3, VoucherType::FacturaB, 43, Utc::now())
            .await
            .unwrap();

        // AFIP's last is 42, so 43 was never assigned: no lookup needed
        let outcome = authorizer.authorize(&invoice.id).await.unwrap();
        assert!(matches!(outcome, AuthorizationOutcome::Authorized { voucher_number: 43, .. }));
        assert!(!transport.actions().iter().any(|a| a.ends_with("FECompConsultar")));
    }

    #[tokio::test]
    async fn test_unrecorded_authorization_stops_pending_run() {
        let fx = active_fixture().await;
        // Local row already holding number 43
        let holder = pending_invoice(&fx, 1_000, Utc::now() - Duration::hours(1)).await;
        fx.db
            .invoices()
            .store_authorization(
                &holder.id,
                "74000000000001",
                NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(),
                43,
                Utc::now(),
            )
            .await
            .unwrap();

        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511")),
        );
        let authorizer = authorizer(&fx, transport);
        let invoice = pending_invoice(&fx, 12_100, Utc::now()).await;

        let report = authorizer.authorize_pending("biz-1").await.unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.remaining, 1);
        match &report.stopped_by {
            Some(AfipError::UnrecordedAuthorization {
                invoice_id,
                cae,
                voucher_number,
                ..
            }) => {
                assert_eq!(invoice_id, &invoice.id);
                assert_eq!(cae, CAE);
                assert_eq!(*voucher_number, 43);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Still pending, with the attempt kept for recovery
        let stored = fx.db.invoices().require(&invoice.id).await.unwrap();
        assert_eq!(stored.status, InvoiceStatus::PendingCae);
        assert_eq!(fx.db.invoices().cae_attempt(&invoice.id).await.unwrap(), Some(43));
    }

    #[tokio::test]
    async fn test_token_rejection_invalidates_ticket() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(header_error_response(600, "ValidacionDeToken: token expirado")),
        );
        let authorizer = authorizer(&fx, transport);
        let invoice = pending_invoice(&fx, 5_000, Utc::now()).await;

        assert!(matches!(authorizer.authorize(&invoice.id).await, Err(AfipError::Wsfe(_))));
        assert!(fx.db.fiscal_configs().cached_ticket("biz-1").await.unwrap().is_none());
        assert_eq!(
            fx.db.invoices().require(&invoice.id).await.unwrap().status,
            InvoiceStatus::PendingCae
        );
    }

    #[tokio::test]
    async fn test_afip_behind_local_sequence_is_refused() {
        let fx = active_fixture().await;
        fx.db
            .fiscal_configs()
            .record_voucher_number("biz-1", 3, VoucherType::FacturaB, 50)
            .await
            .unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42)),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let invoice = pending_invoice(&fx, 5_000, Utc::now()).await;

        assert!(matches!(
            authorizer.authorize(&invoice.id).await,
            Err(AfipError::Core(CoreError::NonMonotonicSequence { last: 50, got: 42, .. }))
        ));
        // No CAE was requested
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_pending_run_stops_at_transport_failure() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511"))
                .respond(last_authorized_response(43))
                .fail(AfipError::HttpStatus {
                    status: 502,
                    url: "https://wsfe.test/service.asmx".into(),
                })
                .respond(voucher_not_found_response()),
        );
        let authorizer = authorizer(&fx, transport);
        let base = Utc::now() - Duration::minutes(10);
        let first = pending_invoice(&fx, 1_000, base).await;
        let second = pending_invoice(&fx, 2_000, base + Duration::minutes(1)).await;
        let _third = pending_invoice(&fx, 3_000, base + Duration::minutes(2)).await;

        let report = authorizer.authorize_pending("biz-1").await.unwrap();
        assert_eq!(report.authorized(), 1);
        assert_eq!(report.outcomes[0].invoice_id(), first.id);
        assert!(report.stopped_by.as_ref().is_some_and(AfipError::is_transport));
        assert_eq!(report.remaining, 2);

        let pending = fx.db.invoices().list_pending_cae("biz-1").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, second.id);
    }

    #[tokio::test]
    async fn test_credit_note_references_original() {
        let fx = active_fixture().await;
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(login())
                .respond(last_authorized_response(42))
                .respond(approved_response(43, CAE, "20240511"))
                .respond(last_authorized_response(0))
                .respond(approved_response(1, "74123456789013", "20240511")),
        );
        let authorizer = authorizer(&fx, transport.clone());
        let original = pending_invoice(&fx, 12_100, Utc::now()).await;
        authorizer.authorize(&original.id).await.unwrap();

        let note = authorizer
            .create_credit_note(&original.id, Money::from_cents(12_100))
            .await
            .unwrap();
        assert_eq!(note.voucher_type, Some(VoucherType::NotaCreditoB));

        // Nothing left to credit
        assert!(authorizer
            .create_credit_note(&original.id, Money::from_cents(1))
            .await
            .is_err());

        let outcome = authorizer.authorize(&note.id).await.unwrap();
        assert!(matches!(outcome, AuthorizationOutcome::Authorized { voucher_number: 1, .. }));

        let envelope = &transport.calls()[4].envelope;
        assert!(envelope.contains("<ar:CbteTipo>8</ar:CbteTipo>"));
        assert!(envelope.contains("<ar:Tipo>6</ar:Tipo><ar:PtoVta>3</ar:PtoVta><ar:Nro>43</ar:Nro>"));
    }

    #[tokio::test]
    async fn test_refuses_inactive_or_mismatched_configuration() {
        let fx = fixture().await;
        let transport = Arc::new(ScriptedTransport::new());
        let invoice = pending_invoice(&fx, 1_000, Utc::now()).await;
        assert!(matches!(
            authorizer(&fx, transport.clone()).authorize(&invoice.id).await,
            Err(AfipError::ConfigInactive { .. })
        ));

        let mut fx = active_fixture().await;
        fx.config.afip.environment = Environment::Production;
        let invoice = pending_invoice(&fx, 1_000, Utc::now()).await;
        assert!(matches!(
            authorizer(&fx, transport.clone()).authorize(&invoice.id).await,
            Err(AfipError::Config(_))
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_internal_sale_is_not_fiscal() {
        let fx = active_fixture().await;
        let sale = Invoice::new_internal("biz-1", PaymentMethod::Cash, Money::from_cents(800), Utc::now()).unwrap();
        fx.db.invoices().insert(&sale).await.unwrap();

        let authorizer = authorizer(&fx, Arc::new(ScriptedTransport::new()));
        assert!(matches!(
            authorizer.authorize(&sale.id).await,
            Err(AfipError::Core(CoreError::NotFiscal(_)))
        ));
    }
}
