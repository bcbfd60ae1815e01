//! # Cash Session Repository
//!
//! Cash-register sessions, manual movements and persisted closing reports.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. open()          → one open session per business (unique index)     │
//! │  2. add_movement()  → cash in / cash out while open                    │
//! │     invoices.cash_session_id links sales to the session                │
//! │  3. close()         → counted, expected, discrepancy + report JSON     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use mostrador_core::cash_closing::{CashMovement, CashSession, ClosingReport, SessionStatus};

const SESSION_COLUMNS: &str = r#"
    id, business_id, status, opening_balance_cents, opened_by, opened_at,
    counted_cents, expected_cents, discrepancy_cents, closing_report, closed_at
"#;

#[derive(Debug, Clone)]
pub struct CashSessionRepository {
    pool: SqlitePool,
}

impl CashSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashSessionRepository { pool }
    }

    /// Inserts a newly opened session.
    ///
    /// A second open session for the same business is a `UniqueViolation`.
    pub async fn open(&self, session: &CashSession) -> DbResult<()> {
        debug!(
            session_id = %session.id,
            business_id = %session.business_id,
            opening_balance_cents = session.opening_balance_cents,
            "Opening cash session"
        );

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (id, business_id, status, opening_balance_cents, opened_by, opened_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&session.id)
        .bind(&session.business_id)
        .bind(session.status)
        .bind(session.opening_balance_cents)
        .bind(&session.opened_by)
        .bind(session.opened_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("open cash session", session.business_id.clone())
            }
            other => other,
        })?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashSession>> {
        let sql = format!("SELECT {} FROM cash_sessions WHERE id = ?1", SESSION_COLUMNS);
        let session = sqlx::query_as::<_, CashSession>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    /// The business's open session, if any.
    pub async fn get_open(&self, business_id: &str) -> DbResult<Option<CashSession>> {
        let sql = format!(
            "SELECT {} FROM cash_sessions WHERE business_id = ?1 AND status = ?2",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, CashSession>(&sql)
            .bind(business_id)
            .bind(SessionStatus::Open)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    /// Records a manual movement. The session must be open.
    pub async fn add_movement(&self, movement: &CashMovement) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cash_movements (id, session_id, kind, amount_cents, reason, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6
            WHERE EXISTS (SELECT 1 FROM cash_sessions WHERE id = ?2 AND status = ?7)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.session_id)
        .bind(movement.kind)
        .bind(movement.amount_cents)
        .bind(&movement.reason)
        .bind(movement.created_at)
        .bind(SessionStatus::Open)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("CashSession", &movement.session_id, "not open"));
        }
        Ok(())
    }

    pub async fn list_movements(&self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let movements = sqlx::query_as::<_, CashMovement>(
            r#"
            SELECT id, session_id, kind, amount_cents, reason, created_at
            FROM cash_movements WHERE session_id = ?1 ORDER BY created_at ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }

    /// Closes an open session with its computed report.
    pub async fn close(&self, session_id: &str, report: &ClosingReport) -> DbResult<()> {
        let report_json = serde_json::to_string(report)?;

        let result = sqlx::query(
            r#"
            UPDATE cash_sessions SET
                status = ?2, counted_cents = ?3, expected_cents = ?4, discrepancy_cents = ?5,
                closing_report = ?6, closed_at = ?7
            WHERE id = ?1 AND status = ?8
            "#,
        )
        .bind(session_id)
        .bind(SessionStatus::Closed)
        .bind(report.counted_cash.cents())
        .bind(report.expected_cash.cents())
        .bind(report.discrepancy.cents())
        .bind(report_json)
        .bind(report.closed_at)
        .bind(SessionStatus::Open)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("CashSession", session_id, "not open"));
        }

        info!(
            session_id = %session_id,
            expected = %report.expected_cash,
            counted = %report.counted_cash,
            discrepancy = %report.discrepancy,
            "Cash session closed"
        );
        Ok(())
    }

    /// Persisted report of a closed session.
    pub async fn closing_report(&self, session_id: &str) -> DbResult<Option<ClosingReport>> {
        let session = self
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| DbError::not_found("CashSession", session_id))?;

        match session.closing_report {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
