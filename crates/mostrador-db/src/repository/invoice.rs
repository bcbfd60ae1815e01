//! # Invoice Repository
//!
//! Persistence for fiscal and internal invoices.
//!
//! ## Write-Once Guard
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store_authorization()                                                 │
//! │    UPDATE invoices SET cae = ?, status = 'authorized', ...             │
//! │    WHERE id = ? AND status = 'pending_cae'                             │
//! │                                                                         │
//! │  0 rows → Conflict (someone else authorized it, or it was rejected)    │
//! │                                                                         │
//! │  A trigger additionally aborts ANY update on an authorized row.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## CAE Attempts
//! The number sent with each `FECAESolicitar` is written to `cae_attempts`
//! before the request leaves and deleted in the same transaction that
//! stores AFIP's answer. A row that survives means the answer was lost.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use mostrador_core::{AfipMessage, Invoice, InvoiceStatus, Money, VoucherType};

const INVOICE_COLUMNS: &str = r#"
    id, business_id, cash_session_id, channel, status,
    voucher_type, point_of_sale, voucher_number, concept,
    doc_type, doc_number, customer_name, payment_method,
    net_cents, iva_cents, exempt_cents, total_cents, iva_rate_bps,
    cae, cae_expires_on, afip_errors, associated_invoice_id,
    service_from, service_to,
    issued_at, authorized_at, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn insert(&self, invoice: &Invoice) -> DbResult<()> {
        insert_row(&self.pool, invoice).await
    }

    /// Inserts a credit note unless the notes issued against its original
    /// would then exceed `credit_limit`.
    ///
    /// The sum and the insert share one transaction, so two notes created
    /// at the same time cannot both pass the check.
    pub async fn insert_credit_note(&self, note: &Invoice, credit_limit: Money) -> DbResult<()> {
        let original_id = note
            .associated_invoice_id
            .as_deref()
            .ok_or_else(|| DbError::conflict("Invoice", &note.id, "credit note without an original"))?;

        let mut tx = self.pool.begin().await?;

        let credited: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_cents), 0) FROM invoices
            WHERE associated_invoice_id = ?1 AND status != ?2
            "#,
        )
        .bind(original_id)
        .bind(InvoiceStatus::Rejected)
        .fetch_one(&mut *tx)
        .await?;

        if credited + note.total_cents > credit_limit.cents() {
            warn!(
                invoice_id = %note.id,
                original_id = %original_id,
                credited_cents = credited,
                note_cents = note.total_cents,
                "Credit note would exceed the original total"
            );
            return Err(DbError::conflict(
                "Invoice",
                original_id,
                format!(
                    "{} already credited, {} more exceeds {}",
                    Money::from_cents(credited),
                    note.total(),
                    credit_limit
                ),
            ));
        }

        insert_row(&mut *tx, note).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    pub async fn require(&self, id: &str) -> DbResult<Invoice> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))
    }

    /// Fiscal invoices waiting for a CAE, oldest first.
    pub async fn list_pending_cae(&self, business_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE business_id = ?1 AND status = ?2 ORDER BY issued_at ASC, created_at ASC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(business_id)
            .bind(InvoiceStatus::PendingCae)
            .fetch_all(&self.pool)
            .await?;
        Ok(invoices)
    }

    pub async fn list_by_status(&self, business_id: &str, status: InvoiceStatus) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE business_id = ?1 AND status = ?2 ORDER BY issued_at ASC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(business_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(invoices)
    }

    /// Every invoice attached to a cash session, both channels.
    pub async fn list_by_session(&self, session_id: &str) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE cash_session_id = ?1 ORDER BY issued_at ASC",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(invoices)
    }

    /// Persists an authorization. Only a `pending_cae` row can take it.
    pub async fn store_authorization(
        &self,
        id: &str,
        cae: &str,
        cae_expires_on: NaiveDate,
        voucher_number: i64,
        authorized_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                status = ?2, cae = ?3, cae_expires_on = ?4, voucher_number = ?5,
                afip_errors = NULL, authorized_at = ?6, updated_at = ?6
            WHERE id = ?1 AND status = ?7
            "#,
        )
        .bind(id)
        .bind(InvoiceStatus::Authorized)
        .bind(cae)
        .bind(cae_expires_on)
        .bind(voucher_number)
        .bind(authorized_at)
        .bind(InvoiceStatus::PendingCae)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(invoice_id = %id, "Authorization not stored: invoice is not pending");
            return Err(DbError::conflict("Invoice", id, "not pending CAE"));
        }

        delete_attempt(&mut *tx, id).await?;
        tx.commit().await?;

        info!(invoice_id = %id, cae = %cae, voucher_number = voucher_number, "Invoice authorized");
        Ok(())
    }

    /// Persists an AFIP rejection with its error list.
    pub async fn store_rejection(&self, id: &str, errors: &[AfipMessage], at: DateTime<Utc>) -> DbResult<()> {
        let errors_json = serde_json::to_string(errors)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = ?2, afip_errors = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(id)
        .bind(InvoiceStatus::Rejected)
        .bind(errors_json)
        .bind(at)
        .bind(InvoiceStatus::PendingCae)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Invoice", id, "not pending CAE"));
        }

        delete_attempt(&mut *tx, id).await?;
        tx.commit().await?;

        warn!(invoice_id = %id, error_count = errors.len(), "Invoice rejected by AFIP");
        Ok(())
    }

    /// Moves a rejected invoice back to `pending_cae` for a manual retry.
    pub async fn reset_for_retry(&self, id: &str, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status = ?4
            "#,
        )
        .bind(id)
        .bind(InvoiceStatus::PendingCae)
        .bind(at)
        .bind(InvoiceStatus::Rejected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Invoice", id, "not rejected"));
        }
        Ok(())
    }

    /// Sum of credit notes issued against an original, excluding rejected ones.
    pub async fn credited_total(&self, original_id: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_cents), 0) FROM invoices
            WHERE associated_invoice_id = ?1 AND status != ?2
            "#,
        )
        .bind(original_id)
        .bind(InvoiceStatus::Rejected)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents))
    }

    // =========================================================================
    // CAE Attempts
    // =========================================================================

    /// Records the number about to be sent for `invoice_id`, replacing any
    /// earlier attempt.
    pub async fn record_cae_attempt(
        &self,
        invoice_id: &str,
        point_of_sale: u32,
        voucher_type: VoucherType,
        voucher_number: i64,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cae_attempts (invoice_id, point_of_sale, voucher_type, voucher_number, requested_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (invoice_id) DO UPDATE SET
                point_of_sale = excluded.point_of_sale,
                voucher_type = excluded.voucher_type,
                voucher_number = excluded.voucher_number,
                requested_at = excluded.requested_at
            "#,
        )
        .bind(invoice_id)
        .bind(point_of_sale as i64)
        .bind(voucher_type)
        .bind(voucher_number)
        .bind(at)
        .execute(&self.pool)
        .await?;

        debug!(invoice_id = %invoice_id, voucher_number, "CAE attempt recorded");
        Ok(())
    }

    /// Number of an unanswered CAE request for `invoice_id`, if any.
    pub async fn cae_attempt(&self, invoice_id: &str) -> DbResult<Option<i64>> {
        let number = sqlx::query_scalar("SELECT voucher_number FROM cae_attempts WHERE invoice_id = ?1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(number)
    }

    /// Forgets an attempt AFIP has no record of.
    pub async fn clear_cae_attempt(&self, invoice_id: &str) -> DbResult<()> {
        delete_attempt(&self.pool, invoice_id).await
    }
}

async fn delete_attempt<'e, E>(executor: E, invoice_id: &str) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM cae_attempts WHERE invoice_id = ?1")
        .bind(invoice_id)
        .execute(executor)
        .await?;
    Ok(())
}

async fn insert_row<'e, E>(executor: E, invoice: &Invoice) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(
        invoice_id = %invoice.id,
        business_id = %invoice.business_id,
        status = %invoice.status,
        total_cents = invoice.total_cents,
        "Inserting invoice"
    );

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, business_id, cash_session_id, channel, status,
            voucher_type, point_of_sale, voucher_number, concept,
            doc_type, doc_number, customer_name, payment_method,
            net_cents, iva_cents, exempt_cents, total_cents, iva_rate_bps,
            cae, cae_expires_on, afip_errors, associated_invoice_id,
            service_from, service_to,
            issued_at, authorized_at, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22,
            ?23, ?24,
            ?25, ?26, ?27, ?28
        )
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.business_id)
    .bind(&invoice.cash_session_id)
    .bind(invoice.channel)
    .bind(invoice.status)
    .bind(invoice.voucher_type)
    .bind(invoice.point_of_sale)
    .bind(invoice.voucher_number)
    .bind(invoice.concept)
    .bind(invoice.doc_type)
    .bind(invoice.doc_number)
    .bind(&invoice.customer_name)
    .bind(invoice.payment_method)
    .bind(invoice.net_cents)
    .bind(invoice.iva_cents)
    .bind(invoice.exempt_cents)
    .bind(invoice.total_cents)
    .bind(invoice.iva_rate_bps)
    .bind(&invoice.cae)
    .bind(invoice.cae_expires_on)
    .bind(&invoice.afip_errors)
    .bind(&invoice.associated_invoice_id)
    .bind(invoice.service_from)
    .bind(invoice.service_to)
    .bind(invoice.issued_at)
    .bind(invoice.authorized_at)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
