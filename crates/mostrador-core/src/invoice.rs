//! # Invoice Lifecycle
//!
//! Fiscal and internal sale records, the CAE state machine and credit notes.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Fiscal channel                                                        │
//! │                                                                         │
//! │   ┌────────────┐  Resultado A   ┌────────────┐                          │
//! │   │ PendingCae │ ─────────────► │ Authorized │  write-once; corrections │
//! │   └─────┬──────┘                └────────────┘  only via credit note    │
//! │         │  ▲                                                            │
//! │ Result. R│  │ reset_for_retry (explicit)                                │
//! │         ▼  │                                                            │
//! │   ┌────────────┐                                                        │
//! │   │  Rejected  │  AFIP error codes kept for the operator                │
//! │   └────────────┘                                                        │
//! │                                                                         │
//! │   Internal channel                                                      │
//! │   ┌────────────┐                                                        │
//! │   │  Internal  │  never requests a CAE                                  │
//! │   └────────────┘                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Concept, Customer, DocType, IvaRate, PaymentMethod, SalesChannel, VoucherType};
use crate::validation::{validate_cae, validate_doc_number, validate_point_of_sale};

// =============================================================================
// Invoice Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Waiting for (or retrying) a CAE request.
    PendingCae,
    /// AFIP issued a CAE.
    Authorized,
    /// AFIP answered `R`; needs operator attention and an explicit retry.
    Rejected,
    /// Internal-channel sale.
    Internal,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::PendingCae => "pending_cae",
            InvoiceStatus::Authorized => "authorized",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Internal => "internal",
        };
        f.write_str(s)
    }
}

// =============================================================================
// AFIP Messages
// =============================================================================

/// An error, observation or event returned by WSFEv1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfipMessage {
    pub code: i64,
    pub message: String,
}

impl AfipMessage {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for AfipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// =============================================================================
// Fiscal Amounts
// =============================================================================

/// Tax breakdown submitted as `ImpNeto` / `ImpIVA` / `ImpOpEx` / `ImpTotal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalAmounts {
    pub net: Money,
    pub iva: Money,
    pub exempt: Money,
    pub total: Money,
    pub iva_rate: IvaRate,
}

impl FiscalAmounts {
    /// Breaks an IVA-inclusive taxed amount plus an exempt amount down.
    ///
    /// C vouchers do not discriminate IVA: the whole taxed amount is net.
    pub fn from_gross(taxed_gross: Money, exempt: Money, rate: IvaRate, voucher: VoucherType) -> Self {
        let (net, iva) = if voucher.discriminates_iva() {
            taxed_gross.split_gross(rate)
        } else {
            (taxed_gross, Money::zero())
        };

        Self {
            net,
            iva,
            exempt,
            total: taxed_gross + exempt,
            iva_rate: rate,
        }
    }

    /// `total == net + iva + exempt` and nothing negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.net.is_negative() || self.iva.is_negative() || self.exempt.is_negative() {
            return Err(ValidationError::InvalidFormat {
                field: "amounts".to_string(),
                reason: "amounts cannot be negative".to_string(),
            });
        }
        if self.net + self.iva + self.exempt != self.total {
            return Err(ValidationError::InvalidFormat {
                field: "amounts".to_string(),
                reason: format!(
                    "total {} does not equal net {} + iva {} + exempt {}",
                    self.total, self.net, self.iva, self.exempt
                ),
            });
        }
        if !self.total.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "total".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A sale record in either channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: String,
    pub business_id: String,
    pub cash_session_id: Option<String>,
    pub channel: SalesChannel,
    pub status: InvoiceStatus,

    // Voucher identity (fiscal only)
    pub voucher_type: Option<VoucherType>,
    pub point_of_sale: Option<i64>,
    /// Assigned from AFIP's sequence at authorization time.
    pub voucher_number: Option<i64>,
    pub concept: Concept,

    // Buyer
    pub doc_type: DocType,
    pub doc_number: i64,
    pub customer_name: Option<String>,

    pub payment_method: PaymentMethod,

    // Amounts in centavos
    pub net_cents: i64,
    pub iva_cents: i64,
    pub exempt_cents: i64,
    pub total_cents: i64,
    pub iva_rate_bps: i64,

    // Authorization result
    pub cae: Option<String>,
    pub cae_expires_on: Option<NaiveDate>,
    /// JSON array of [`AfipMessage`] from the last rejection.
    pub afip_errors: Option<String>,

    /// Original invoice when this is a credit note.
    pub associated_invoice_id: Option<String>,

    pub service_from: Option<NaiveDate>,
    pub service_to: Option<NaiveDate>,

    pub issued_at: DateTime<Utc>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// New fiscal invoice in `PendingCae`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_fiscal(
        business_id: &str,
        voucher_type: VoucherType,
        point_of_sale: i64,
        customer: &Customer,
        concept: Concept,
        payment_method: PaymentMethod,
        amounts: FiscalAmounts,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_point_of_sale(point_of_sale)?;
        amounts.validate()?;

        let (doc_type, doc_number) = customer.afip_document();
        validate_doc_number(doc_type, doc_number)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            cash_session_id: None,
            channel: SalesChannel::Fiscal,
            status: InvoiceStatus::PendingCae,
            voucher_type: Some(voucher_type),
            point_of_sale: Some(point_of_sale),
            voucher_number: None,
            concept,
            doc_type,
            doc_number: doc_number as i64,
            customer_name: customer.name().map(str::to_string),
            payment_method,
            net_cents: amounts.net.cents(),
            iva_cents: amounts.iva.cents(),
            exempt_cents: amounts.exempt.cents(),
            total_cents: amounts.total.cents(),
            iva_rate_bps: i64::from(amounts.iva_rate.bps()),
            cae: None,
            cae_expires_on: None,
            afip_errors: None,
            associated_invoice_id: None,
            service_from: None,
            service_to: None,
            issued_at: now,
            authorized_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// New internal-channel sale. No voucher, no CAE, no tax breakdown.
    pub fn new_internal(
        business_id: &str,
        payment_method: PaymentMethod,
        total: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if !total.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "total".to_string(),
            }
            .into());
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            cash_session_id: None,
            channel: SalesChannel::Internal,
            status: InvoiceStatus::Internal,
            voucher_type: None,
            point_of_sale: None,
            voucher_number: None,
            concept: Concept::Products,
            doc_type: DocType::ConsumidorFinal,
            doc_number: 0,
            customer_name: None,
            payment_method,
            net_cents: total.cents(),
            iva_cents: 0,
            exempt_cents: 0,
            total_cents: total.cents(),
            iva_rate_bps: 0,
            cae: None,
            cae_expires_on: None,
            afip_errors: None,
            associated_invoice_id: None,
            service_from: None,
            service_to: None,
            issued_at: now,
            authorized_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn in_session(mut self, cash_session_id: &str) -> Self {
        self.cash_session_id = Some(cash_session_id.to_string());
        self
    }

    pub fn with_service_period(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.service_from = Some(from);
        self.service_to = Some(to);
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    pub fn amounts(&self) -> CoreResult<FiscalAmounts> {
        let bps = u32::try_from(self.iva_rate_bps).map_err(|_| ValidationError::OutOfRange {
            field: "iva_rate_bps".to_string(),
            min: 0,
            max: 2700,
        })?;
        Ok(FiscalAmounts {
            net: Money::from_cents(self.net_cents),
            iva: Money::from_cents(self.iva_cents),
            exempt: Money::from_cents(self.exempt_cents),
            total: Money::from_cents(self.total_cents),
            iva_rate: IvaRate::from_bps(bps)?,
        })
    }

    pub fn customer(&self) -> Customer {
        match self.doc_type {
            DocType::ConsumidorFinal => Customer::Anonymous,
            doc_type => Customer::Identified {
                doc_type,
                doc_number: self.doc_number as u64,
                name: self.customer_name.clone(),
                regime: None,
            },
        }
    }

    pub fn is_fiscal(&self) -> bool {
        self.channel == SalesChannel::Fiscal
    }

    pub fn is_credit_note(&self) -> bool {
        self.voucher_type.map(|v| v.is_credit_note()).unwrap_or(false)
    }

    pub fn is_authorized(&self) -> bool {
        self.status == InvoiceStatus::Authorized
    }

    /// Fiscal voucher identity, or `NotFiscal` for internal sales.
    pub fn voucher(&self) -> CoreResult<(i64, VoucherType)> {
        match (self.point_of_sale, self.voucher_type) {
            (Some(pos), Some(vt)) if self.is_fiscal() => Ok((pos, vt)),
            _ => Err(CoreError::NotFiscal(self.id.clone())),
        }
    }

    /// Errors stored by the last rejection.
    pub fn rejection_errors(&self) -> Vec<AfipMessage> {
        self.afip_errors
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn ensure_mutable(&self) -> CoreResult<()> {
        if !self.is_fiscal() {
            return Err(CoreError::NotFiscal(self.id.clone()));
        }
        if self.status == InvoiceStatus::Authorized {
            return Err(CoreError::InvoiceImmutable {
                invoice_id: self.id.clone(),
                cae: self.cae.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn invalid_status(&self, operation: &str) -> CoreError {
        CoreError::InvalidInvoiceStatus {
            invoice_id: self.id.clone(),
            current_status: self.status.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Records AFIP's approval. Only valid from `PendingCae`.
    pub fn apply_authorization(
        &mut self,
        cae: &str,
        cae_expires_on: NaiveDate,
        voucher_number: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_mutable()?;
        if self.status != InvoiceStatus::PendingCae {
            return Err(self.invalid_status("authorize"));
        }
        validate_cae(cae)?;
        if voucher_number < 1 {
            return Err(ValidationError::MustBePositive {
                field: "voucher_number".to_string(),
            }
            .into());
        }

        self.status = InvoiceStatus::Authorized;
        self.cae = Some(cae.trim().to_string());
        self.cae_expires_on = Some(cae_expires_on);
        self.voucher_number = Some(voucher_number);
        self.afip_errors = None;
        self.authorized_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records AFIP's rejection with its error codes.
    pub fn apply_rejection(&mut self, errors: &[AfipMessage], now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_mutable()?;
        if self.status != InvoiceStatus::PendingCae {
            return Err(self.invalid_status("reject"));
        }

        self.status = InvoiceStatus::Rejected;
        self.afip_errors = Some(serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string()));
        self.updated_at = now;
        Ok(())
    }

    /// Operator-initiated retry of a rejected invoice.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_mutable()?;
        if self.status != InvoiceStatus::Rejected {
            return Err(self.invalid_status("retry"));
        }

        self.status = InvoiceStatus::PendingCae;
        self.updated_at = now;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Credit Notes
    // -------------------------------------------------------------------------

    /// Builds a credit note against an authorized fiscal invoice.
    ///
    /// `already_credited` is the sum of previous credit notes on `original`.
    /// A credit for the whole remaining balance reuses the original's exact
    /// breakdown when nothing was credited before; partial credits prorate
    /// the exempt share and split the rest at the original rate.
    pub fn credit_note_for(
        original: &Invoice,
        amount: Money,
        already_credited: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<Invoice> {
        let (point_of_sale, original_type) = original.voucher()?;

        if original.status != InvoiceStatus::Authorized {
            return Err(original.invalid_status("issue a credit note against"));
        }
        if original_type.is_credit_note() {
            return Err(CoreError::InvalidInvoiceStatus {
                invoice_id: original.id.clone(),
                current_status: "credit_note".to_string(),
                operation: "issue a credit note against".to_string(),
            });
        }
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "credit_amount".to_string(),
            }
            .into());
        }

        let remaining = original.total() - already_credited;
        if amount > remaining {
            return Err(CoreError::CreditExceedsOriginal {
                invoice_id: original.id.clone(),
                requested: amount.to_string(),
                remaining: remaining.to_string(),
            });
        }

        let original_amounts = original.amounts()?;
        let credit_type = original_type.credit_note_type();
        let amounts = if amount == original.total() && already_credited.is_zero() {
            original_amounts
        } else {
            let exempt = original_amounts
                .exempt
                .prorate(amount, original_amounts.total);
            FiscalAmounts::from_gross(amount - exempt, exempt, original_amounts.iva_rate, credit_type)
        };

        let mut note = Invoice::new_fiscal(
            &original.business_id,
            credit_type,
            point_of_sale,
            &original.customer(),
            original.concept,
            original.payment_method,
            amounts,
            now,
        )?;
        note.associated_invoice_id = Some(original.id.clone());
        note.service_from = original.service_from;
        note.service_to = original.service_to;
        Ok(note)
    }
}

// =============================================================================
// Voucher Sequence
// =============================================================================

/// Next number to request: AFIP numbers are contiguous per
/// `(point of sale, voucher type)`.
///
/// ```rust
/// use mostrador_core::invoice::next_voucher_number;
///
/// assert_eq!(next_voucher_number(0), 1);
/// assert_eq!(next_voucher_number(41), 42);
/// ```
#[inline]
pub const fn next_voucher_number(last_authorized: i64) -> i64 {
    last_authorized + 1
}

/// Last number known locally for one `(point of sale, voucher type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSequence {
    pub point_of_sale: u32,
    pub voucher_type: VoucherType,
    pub last_number: i64,
}

impl VoucherSequence {
    pub fn new(point_of_sale: u32, voucher_type: VoucherType, last_number: i64) -> Self {
        Self {
            point_of_sale,
            voucher_type,
            last_number,
        }
    }

    fn non_monotonic(&self, got: i64) -> CoreError {
        CoreError::NonMonotonicSequence {
            point_of_sale: self.point_of_sale,
            voucher_type: self.voucher_type.code(),
            last: self.last_number,
            got,
        }
    }

    /// Reconciles with `FECompUltimoAutorizado` and returns the next number.
    ///
    /// AFIP may be ahead of us (vouchers issued from another system), never
    /// behind.
    pub fn next_from_afip(&self, afip_last: i64) -> CoreResult<i64> {
        if afip_last < self.last_number {
            return Err(self.non_monotonic(afip_last));
        }
        Ok(next_voucher_number(afip_last))
    }

    /// Advances to a newly authorized number, which must be strictly greater.
    pub fn advance_to(&mut self, number: i64) -> CoreResult<()> {
        if number <= self.last_number {
            return Err(self.non_monotonic(number));
        }
        self.last_number = number;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
