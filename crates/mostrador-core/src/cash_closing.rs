//! # Two-Channel Cash Closing
//!
//! Reconciles a cash-register session across the fiscal and internal
//! ledgers.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Fiscal ledger               Internal ledger                           │
//! │   ┌──────────────────────┐    ┌──────────────────────┐                  │
//! │   │ sales by method      │    │ sales by method      │                  │
//! │   │ credit notes (NC)    │    │ (no credit notes)    │                  │
//! │   └──────────┬───────────┘    └──────────┬───────────┘                  │
//! │              └──────────────┬────────────┘                              │
//! │                             ▼                                           │
//! │   expected = opening + cash sales − cash refunds + cash in − cash out  │
//! │   discrepancy = counted − expected      (+ surplus / − shortage)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::invoice::Invoice;
use crate::money::Money;
use crate::types::{PaymentMethod, SalesChannel};

// =============================================================================
// Session and Movements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// One cash-register shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub business_id: String,
    pub status: SessionStatus,
    pub opening_balance_cents: i64,
    pub opened_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub counted_cents: Option<i64>,
    pub expected_cents: Option<i64>,
    pub discrepancy_cents: Option<i64>,
    /// Serialized [`ClosingReport`].
    pub closing_report: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CashSession {
    pub fn open(business_id: &str, opening_balance: Money, opened_by: Option<String>, now: DateTime<Utc>) -> CoreResult<Self> {
        if opening_balance.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "opening_balance".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            status: SessionStatus::Open,
            opening_balance_cents: opening_balance.cents(),
            opened_by,
            opened_at: now,
            counted_cents: None,
            expected_cents: None,
            discrepancy_cents: None,
            closing_report: None,
            closed_at: None,
        })
    }

    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_cents(self.opening_balance_cents)
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Marks the session closed with a computed report.
    pub fn close(&mut self, report: &ClosingReport) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::SessionClosed(self.id.clone()));
        }

        self.status = SessionStatus::Closed;
        self.counted_cents = Some(report.counted_cash.cents());
        self.expected_cents = Some(report.expected_cash.cents());
        self.discrepancy_cents = Some(report.discrepancy.cents());
        self.closing_report = serde_json::to_string(report).ok();
        self.closed_at = Some(report.closed_at);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    CashIn,
    CashOut,
}

/// Manual cash movement (change fund top-up, supplier paid from the drawer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    pub kind: MovementKind,
    pub amount_cents: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    pub fn new(session_id: &str, kind: MovementKind, amount: Money, reason: &str, now: DateTime<Utc>) -> CoreResult<Self> {
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount".to_string(),
            }
            .into());
        }
        if reason.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "reason".to_string(),
            }
            .into());
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind,
            amount_cents: amount.cents(),
            reason: reason.trim().to_string(),
            created_at: now,
        })
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Sale Records
// =============================================================================

/// What the closing needs to know about each sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: String,
    pub channel: SalesChannel,
    pub payment_method: PaymentMethod,
    /// Always positive; credit notes are flagged, not negated.
    pub total: Money,
    pub is_credit_note: bool,
}

impl From<&Invoice> for SaleRecord {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.clone(),
            channel: invoice.channel,
            payment_method: invoice.payment_method,
            total: invoice.total(),
            is_credit_note: invoice.is_credit_note(),
        }
    }
}

// =============================================================================
// Channel Summary
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: SalesChannel,
    pub sales_by_method: BTreeMap<PaymentMethod, Money>,
    pub gross_sales: Money,
    pub sale_count: u32,
    /// Credit notes by the method they were refunded through.
    pub credit_notes_by_method: BTreeMap<PaymentMethod, Money>,
    pub credit_notes_total: Money,
    pub credit_note_count: u32,
    pub net_sales: Money,
}

impl ChannelSummary {
    fn empty(channel: SalesChannel) -> Self {
        Self {
            channel,
            sales_by_method: BTreeMap::new(),
            gross_sales: Money::zero(),
            sale_count: 0,
            credit_notes_by_method: BTreeMap::new(),
            credit_notes_total: Money::zero(),
            credit_note_count: 0,
            net_sales: Money::zero(),
        }
    }

    fn record(&mut self, sale: &SaleRecord) {
        if sale.is_credit_note {
            *self
                .credit_notes_by_method
                .entry(sale.payment_method)
                .or_insert_with(Money::zero) += sale.total;
            self.credit_notes_total += sale.total;
            self.credit_note_count += 1;
        } else {
            *self
                .sales_by_method
                .entry(sale.payment_method)
                .or_insert_with(Money::zero) += sale.total;
            self.gross_sales += sale.total;
            self.sale_count += 1;
        }
        self.net_sales = self.gross_sales - self.credit_notes_total;
    }

    pub fn sales_for(&self, method: PaymentMethod) -> Money {
        self.sales_by_method.get(&method).copied().unwrap_or_default()
    }

    pub fn refunds_for(&self, method: PaymentMethod) -> Money {
        self.credit_notes_by_method.get(&method).copied().unwrap_or_default()
    }
}

// =============================================================================
// Closing Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingReport {
    pub session_id: String,
    pub opening_balance: Money,
    pub fiscal: ChannelSummary,
    pub internal: ChannelSummary,
    pub cash_sales: Money,
    pub cash_refunds: Money,
    pub cash_in: Money,
    pub cash_out: Money,
    pub expected_cash: Money,
    pub counted_cash: Money,
    /// `counted − expected`: positive is a surplus, negative a shortage.
    pub discrepancy: Money,
    pub closed_at: DateTime<Utc>,
}

impl ClosingReport {
    /// Computes the closing for an open session.
    ///
    /// ## Errors
    /// - `SessionClosed` when the session was already closed
    /// - `InvalidSaleRecord` for a credit note in the internal channel or a
    ///   non-positive total
    /// - `Validation` for a negative counted amount
    pub fn compute(
        session: &CashSession,
        sales: &[SaleRecord],
        movements: &[CashMovement],
        counted: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if !session.is_open() {
            return Err(CoreError::SessionClosed(session.id.clone()));
        }
        if counted.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "counted".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let mut fiscal = ChannelSummary::empty(SalesChannel::Fiscal);
        let mut internal = ChannelSummary::empty(SalesChannel::Internal);

        for sale in sales {
            if !sale.total.is_positive() {
                return Err(CoreError::InvalidSaleRecord {
                    id: sale.id.clone(),
                    reason: "total must be positive".to_string(),
                });
            }
            match sale.channel {
                SalesChannel::Fiscal => fiscal.record(sale),
                SalesChannel::Internal if sale.is_credit_note => {
                    return Err(CoreError::InvalidSaleRecord {
                        id: sale.id.clone(),
                        reason: "credit notes only exist in the fiscal channel".to_string(),
                    });
                }
                SalesChannel::Internal => internal.record(sale),
            }
        }

        let (cash_in, cash_out) = movements.iter().fold(
            (Money::zero(), Money::zero()),
            |(cash_in, cash_out), m| match m.kind {
                MovementKind::CashIn => (cash_in + m.amount(), cash_out),
                MovementKind::CashOut => (cash_in, cash_out + m.amount()),
            },
        );

        let cash_sales = fiscal.sales_for(PaymentMethod::Cash) + internal.sales_for(PaymentMethod::Cash);
        let cash_refunds = fiscal.refunds_for(PaymentMethod::Cash);
        let expected_cash = session.opening_balance() + cash_sales - cash_refunds + cash_in - cash_out;

        Ok(Self {
            session_id: session.id.clone(),
            opening_balance: session.opening_balance(),
            fiscal,
            internal,
            cash_sales,
            cash_refunds,
            cash_in,
            cash_out,
            expected_cash,
            counted_cash: counted,
            discrepancy: counted - expected_cash,
            closed_at: now,
        })
    }

    /// Net sales across both channels.
    pub fn combined_net_sales(&self) -> Money {
        self.fiscal.net_sales + self.internal.net_sales
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(id: &str, channel: SalesChannel, method: PaymentMethod, cents: i64) -> SaleRecord {
        SaleRecord {
            id: id.to_string(),
            channel,
            payment_method: method,
            total: Money::from_cents(cents),
            is_credit_note: false,
        }
    }

    fn credit(id: &str, method: PaymentMethod, cents: i64) -> SaleRecord {
        SaleRecord {
            is_credit_note: true,
            ..sale(id, SalesChannel::Fiscal, method, cents)
        }
    }

    fn session(opening: i64) -> CashSession {
        CashSession::open("biz-1", Money::from_cents(opening), None, Utc::now()).unwrap()
    }

    #[test]
    fn test_expected_cash_combines_channels() {
        let session = session(10_000);
        let sales = vec![
            sale("f1", SalesChannel::Fiscal, PaymentMethod::Cash, 5_000),
            sale("f2", SalesChannel::Fiscal, PaymentMethod::DebitCard, 7_000),
            sale("i1", SalesChannel::Internal, PaymentMethod::Cash, 2_000),
            sale("i2", SalesChannel::Internal, PaymentMethod::QrWallet, 1_500),
            credit("nc1", PaymentMethod::Cash, 1_000),
        ];
        let movements = vec![
            CashMovement::new(&session.id, MovementKind::CashIn, Money::from_cents(3_000), "cambio", Utc::now()).unwrap(),
            CashMovement::new(&session.id, MovementKind::CashOut, Money::from_cents(500), "proveedor", Utc::now()).unwrap(),
        ];

        let report =
            ClosingReport::compute(&session, &sales, &movements, Money::from_cents(18_000), Utc::now()).unwrap();

        // 10000 + (5000 + 2000) - 1000 + 3000 - 500
        assert_eq!(report.expected_cash.cents(), 18_500);
        assert_eq!(report.discrepancy.cents(), -500);
        assert_eq!(report.cash_sales.cents(), 7_000);
        assert_eq!(report.cash_refunds.cents(), 1_000);

        assert_eq!(report.fiscal.gross_sales.cents(), 12_000);
        assert_eq!(report.fiscal.sale_count, 2);
        assert_eq!(report.fiscal.credit_note_count, 1);
        assert_eq!(report.fiscal.net_sales.cents(), 11_000);
        assert_eq!(report.internal.sales_for(PaymentMethod::QrWallet).cents(), 1_500);
        assert_eq!(report.combined_net_sales().cents(), 14_500);
    }

    #[test]
    fn test_card_refund_does_not_touch_drawer() {
        let session = session(0);
        let sales = vec![
            sale("f1", SalesChannel::Fiscal, PaymentMethod::Cash, 4_000),
            credit("nc1", PaymentMethod::CreditCard, 1_000),
        ];
        let report = ClosingReport::compute(&session, &sales, &[], Money::from_cents(4_100), Utc::now()).unwrap();
        assert_eq!(report.expected_cash.cents(), 4_000);
        assert_eq!(report.discrepancy.cents(), 100);
    }

    #[test]
    fn test_internal_credit_note_is_invalid() {
        let session = session(0);
        let bad = SaleRecord {
            is_credit_note: true,
            ..sale("i1", SalesChannel::Internal, PaymentMethod::Cash, 100)
        };
        let result = ClosingReport::compute(&session, &[bad], &[], Money::zero(), Utc::now());
        assert!(matches!(result, Err(CoreError::InvalidSaleRecord { .. })));
    }

    #[test]
    fn test_close_persists_figures_once() {
        let mut session = session(1_000);
        let report = ClosingReport::compute(&session, &[], &[], Money::from_cents(1_000), Utc::now()).unwrap();
        assert!(report.discrepancy.is_zero());

        session.close(&report).unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.expected_cents, Some(1_000));
        assert!(session.closing_report.is_some());

        assert!(matches!(session.close(&report), Err(CoreError::SessionClosed(_))));
        assert!(ClosingReport::compute(&session, &[], &[], Money::zero(), Utc::now()).is_err());
    }

    #[test]
    fn test_report_round_trips_through_json() {
        let session = session(500);
        let sales = vec![sale("f1", SalesChannel::Fiscal, PaymentMethod::Cash, 5_000)];
        let report = ClosingReport::compute(&session, &sales, &[], Money::from_cents(5_500), Utc::now()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: ClosingReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_movement_validation() {
        assert!(CashMovement::new("s", MovementKind::CashIn, Money::zero(), "x", Utc::now()).is_err());
        assert!(CashMovement::new("s", MovementKind::CashOut, Money::from_cents(1), "  ", Utc::now()).is_err());
    }
}
