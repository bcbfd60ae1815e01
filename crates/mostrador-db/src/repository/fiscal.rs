//! # Fiscal Configuration Repository
//!
//! One row per business: issuer identity, credential metadata, activation
//! status, the cached WSAA ticket, plus the per-type voucher sequences.
//!
//! ## Credential Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cert_path, cert_subject, cert_serial,     ← update_certificate()      │
//! │  cert_thumbprint, cert_not_before/after                                │
//! │                                                                         │
//! │  key_path, key_sha256                      ← update_private_key()      │
//! │  (the PEM itself stays on disk)                                        │
//! │                                                                         │
//! │  status, validation_issues                 ← set_status()              │
//! │                                                                         │
//! │  wsaa_token, wsaa_sign, wsaa_expires_at    ← cache_ticket()            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use mostrador_core::certificate::CertIssue;
use mostrador_core::{Cuit, Environment, FiscalConfigStatus, FiscalConfiguration, FiscalRegime, IvaRate, VoucherType};

const CONFIG_COLUMNS: &str = r#"
    id, business_id, cuit, business_name, fiscal_regime, environment,
    point_of_sale, default_iva_rate_bps, status,
    cert_path, cert_subject, cert_serial, cert_thumbprint, cert_not_before, cert_not_after,
    key_path, key_sha256, validation_issues,
    wsaa_token, wsaa_sign, wsaa_expires_at,
    created_at, updated_at
"#;

// =============================================================================
// Input Types
// =============================================================================

/// Fields an operator sets when registering a business with AFIP.
#[derive(Debug, Clone)]
pub struct NewFiscalConfiguration {
    pub business_id: String,
    pub cuit: Cuit,
    pub business_name: String,
    pub fiscal_regime: FiscalRegime,
    pub environment: Environment,
    pub point_of_sale: u32,
    pub default_iva_rate: IvaRate,
}

/// Parsed certificate metadata.
#[derive(Debug, Clone)]
pub struct CertificateMetadata {
    pub path: String,
    pub subject: String,
    pub serial: String,
    pub thumbprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A WSAA access ticket as cached on the configuration row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTicket {
    pub token: String,
    pub sign: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct FiscalConfigRepository {
    pool: SqlitePool,
}

impl FiscalConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FiscalConfigRepository { pool }
    }

    /// Gets the configuration of a business, if registered.
    pub async fn get_by_business(&self, business_id: &str) -> DbResult<Option<FiscalConfiguration>> {
        let sql = format!(
            "SELECT {} FROM fiscal_configurations WHERE business_id = ?1",
            CONFIG_COLUMNS
        );
        let config = sqlx::query_as::<_, FiscalConfiguration>(&sql)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(config)
    }

    /// Like [`get_by_business`](Self::get_by_business) but missing is an error.
    pub async fn require(&self, business_id: &str) -> DbResult<FiscalConfiguration> {
        self.get_by_business(business_id)
            .await?
            .ok_or_else(|| DbError::not_found("FiscalConfiguration", business_id))
    }

    /// Creates or updates the issuer identity.
    ///
    /// Changing the CUIT or the environment invalidates the credentials
    /// check and the cached ticket: status goes back to
    /// `pending_credentials` and the ticket is cleared.
    pub async fn upsert(&self, new: &NewFiscalConfiguration) -> DbResult<FiscalConfiguration> {
        let now = Utc::now();
        debug!(business_id = %new.business_id, cuit = %new.cuit, "Upserting fiscal configuration");

        sqlx::query(
            r#"
            INSERT INTO fiscal_configurations (
                id, business_id, cuit, business_name, fiscal_regime, environment,
                point_of_sale, default_iva_rate_bps, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending_credentials', ?9, ?9)
            ON CONFLICT (business_id) DO UPDATE SET
                status = CASE
                    WHEN fiscal_configurations.cuit != excluded.cuit
                      OR fiscal_configurations.environment != excluded.environment
                    THEN 'pending_credentials'
                    ELSE fiscal_configurations.status
                END,
                wsaa_token = CASE
                    WHEN fiscal_configurations.cuit != excluded.cuit
                      OR fiscal_configurations.environment != excluded.environment
                    THEN NULL ELSE fiscal_configurations.wsaa_token
                END,
                wsaa_sign = CASE
                    WHEN fiscal_configurations.cuit != excluded.cuit
                      OR fiscal_configurations.environment != excluded.environment
                    THEN NULL ELSE fiscal_configurations.wsaa_sign
                END,
                wsaa_expires_at = CASE
                    WHEN fiscal_configurations.cuit != excluded.cuit
                      OR fiscal_configurations.environment != excluded.environment
                    THEN NULL ELSE fiscal_configurations.wsaa_expires_at
                END,
                cuit = excluded.cuit,
                business_name = excluded.business_name,
                fiscal_regime = excluded.fiscal_regime,
                environment = excluded.environment,
                point_of_sale = excluded.point_of_sale,
                default_iva_rate_bps = excluded.default_iva_rate_bps,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new.business_id)
        .bind(new.cuit.as_str())
        .bind(new.business_name.trim())
        .bind(new.fiscal_regime)
        .bind(new.environment)
        .bind(i64::from(new.point_of_sale))
        .bind(i64::from(new.default_iva_rate.bps()))
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.require(&new.business_id).await
    }

    /// Stores certificate metadata. Does not change status.
    pub async fn update_certificate(&self, business_id: &str, cert: &CertificateMetadata) -> DbResult<()> {
        debug!(
            business_id = %business_id,
            serial = %cert.serial,
            not_after = %cert.not_after,
            "Storing certificate metadata"
        );

        let result = sqlx::query(
            r#"
            UPDATE fiscal_configurations SET
                cert_path = ?2, cert_subject = ?3, cert_serial = ?4, cert_thumbprint = ?5,
                cert_not_before = ?6, cert_not_after = ?7,
                wsaa_token = NULL, wsaa_sign = NULL, wsaa_expires_at = NULL,
                updated_at = ?8
            WHERE business_id = ?1
            "#,
        )
        .bind(business_id)
        .bind(&cert.path)
        .bind(&cert.subject)
        .bind(&cert.serial)
        .bind(&cert.thumbprint)
        .bind(cert.not_before)
        .bind(cert.not_after)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FiscalConfiguration", business_id));
        }
        Ok(())
    }

    /// Stores where the key lives and its SHA-256. Never the key itself.
    pub async fn update_private_key(&self, business_id: &str, key_path: &str, key_sha256: &str) -> DbResult<()> {
        debug!(business_id = %business_id, "Storing private key reference");

        let result = sqlx::query(
            r#"
            UPDATE fiscal_configurations SET
                key_path = ?2, key_sha256 = ?3,
                wsaa_token = NULL, wsaa_sign = NULL, wsaa_expires_at = NULL,
                updated_at = ?4
            WHERE business_id = ?1
            "#,
        )
        .bind(business_id)
        .bind(key_path)
        .bind(key_sha256)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FiscalConfiguration", business_id));
        }
        Ok(())
    }

    /// Records the outcome of a credential validation.
    pub async fn set_status(
        &self,
        business_id: &str,
        status: FiscalConfigStatus,
        issues: &[CertIssue],
    ) -> DbResult<()> {
        let issues_json = serde_json::to_string(issues)?;

        info!(
            business_id = %business_id,
            status = %status,
            issue_count = issues.len(),
            "Updating fiscal configuration status"
        );

        let result = sqlx::query(
            r#"
            UPDATE fiscal_configurations
            SET status = ?2, validation_issues = ?3, updated_at = ?4
            WHERE business_id = ?1
            "#,
        )
        .bind(business_id)
        .bind(status)
        .bind(issues_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FiscalConfiguration", business_id));
        }
        Ok(())
    }

    /// Issues stored by the last validation.
    pub async fn validation_issues(&self, business_id: &str) -> DbResult<Vec<CertIssue>> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT validation_issues FROM fiscal_configurations WHERE business_id = ?1")
                .bind(business_id)
                .fetch_optional(&self.pool)
                .await?;

        match raw.flatten() {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    // -------------------------------------------------------------------------
    // WSAA ticket cache
    // -------------------------------------------------------------------------

    pub async fn cache_ticket(&self, business_id: &str, ticket: &StoredTicket) -> DbResult<()> {
        debug!(
            business_id = %business_id,
            expires_at = %ticket.expires_at,
            token_len = ticket.token.len(),
            "Caching WSAA ticket"
        );

        let result = sqlx::query(
            r#"
            UPDATE fiscal_configurations
            SET wsaa_token = ?2, wsaa_sign = ?3, wsaa_expires_at = ?4, updated_at = ?5
            WHERE business_id = ?1
            "#,
        )
        .bind(business_id)
        .bind(&ticket.token)
        .bind(&ticket.sign)
        .bind(ticket.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FiscalConfiguration", business_id));
        }
        Ok(())
    }

    pub async fn cached_ticket(&self, business_id: &str) -> DbResult<Option<StoredTicket>> {
        let config = self.get_by_business(business_id).await?;

        Ok(config.and_then(|c| match (c.wsaa_token, c.wsaa_sign, c.wsaa_expires_at) {
            (Some(token), Some(sign), Some(expires_at)) => Some(StoredTicket {
                token,
                sign,
                expires_at,
            }),
            _ => None,
        }))
    }

    pub async fn clear_ticket(&self, business_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE fiscal_configurations
            SET wsaa_token = NULL, wsaa_sign = NULL, wsaa_expires_at = NULL, updated_at = ?2
            WHERE business_id = ?1
            "#,
        )
        .bind(business_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Voucher sequences
    // -------------------------------------------------------------------------

    /// Last number recorded locally, if any voucher of this type was issued.
    pub async fn last_voucher_number(
        &self,
        business_id: &str,
        point_of_sale: u32,
        voucher_type: VoucherType,
    ) -> DbResult<Option<i64>> {
        let last: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT last_number FROM voucher_sequences
            WHERE business_id = ?1 AND point_of_sale = ?2 AND voucher_type = ?3
            "#,
        )
        .bind(business_id)
        .bind(i64::from(point_of_sale))
        .bind(voucher_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(last)
    }

    /// Records a newly authorized number.
    ///
    /// The stored number only ever grows; a number not greater than the
    /// stored one is a `Conflict`.
    pub async fn record_voucher_number(
        &self,
        business_id: &str,
        point_of_sale: u32,
        voucher_type: VoucherType,
        number: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO voucher_sequences (business_id, point_of_sale, voucher_type, last_number, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (business_id, point_of_sale, voucher_type) DO UPDATE SET
                last_number = excluded.last_number,
                updated_at = excluded.updated_at
            WHERE excluded.last_number > voucher_sequences.last_number
            "#,
        )
        .bind(business_id)
        .bind(i64::from(point_of_sale))
        .bind(voucher_type)
        .bind(number)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                business_id = %business_id,
                point_of_sale = point_of_sale,
                voucher_type = voucher_type.code(),
                voucher_number = number,
                "Rejected non-monotonic voucher number"
            );
            return Err(DbError::conflict(
                "VoucherSequence",
                format!("{}/{}/{}", business_id, point_of_sale, voucher_type.code()),
                format!("number {} is not greater than the recorded one", number),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use mostrador_core::certificate::CertIssueCode;

    async fn setup() -> FiscalConfigRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.fiscal_configs()
    }

    fn registration() -> NewFiscalConfiguration {
        NewFiscalConfiguration {
            business_id: "biz-1".to_string(),
            cuit: Cuit::parse("20123456786").unwrap(),
            business_name: "Almacén Don Pepe".to_string(),
            fiscal_regime: FiscalRegime::ResponsableInscripto,
            environment: Environment::Testing,
            point_of_sale: 3,
            default_iva_rate: IvaRate::GENERAL,
        }
    }

    fn ticket(hours: i64) -> StoredTicket {
        StoredTicket {
            token: "PD94bWwgdmVyc2lvbj0iMS4wIj8+".to_string(),
            sign: "c2lnbg==".to_string(),
            expires_at: Utc::now() + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = setup().await;
        let config = repo.upsert(&registration()).await.unwrap();

        assert_eq!(config.cuit, "20123456786");
        assert_eq!(config.point_of_sale, 3);
        assert_eq!(config.status, FiscalConfigStatus::PendingCredentials);
        assert_eq!(config.default_iva_rate().unwrap(), IvaRate::GENERAL);

        assert!(repo.get_by_business("nope").await.unwrap().is_none());
        assert!(matches!(repo.require("nope").await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cuit_change_resets_status_and_ticket() {
        let repo = setup().await;
        repo.upsert(&registration()).await.unwrap();
        repo.set_status("biz-1", FiscalConfigStatus::Active, &[]).await.unwrap();
        repo.cache_ticket("biz-1", &ticket(12)).await.unwrap();

        // Same identity keeps both
        let same = repo.upsert(&registration()).await.unwrap();
        assert_eq!(same.status, FiscalConfigStatus::Active);
        assert!(repo.cached_ticket("biz-1").await.unwrap().is_some());

        let mut changed = registration();
        changed.cuit = Cuit::parse("30712345671").unwrap();
        let updated = repo.upsert(&changed).await.unwrap();
        assert_eq!(updated.status, FiscalConfigStatus::PendingCredentials);
        assert!(repo.cached_ticket("biz-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credential_metadata_and_status() {
        let repo = setup().await;
        repo.upsert(&registration()).await.unwrap();

        let now = Utc::now();
        repo.update_certificate(
            "biz-1",
            &CertificateMetadata {
                path: "/creds/biz-1/cert.pem".to_string(),
                subject: "CN=caja, serialNumber=CUIT 20123456786".to_string(),
                serial: "0a1b".to_string(),
                thumbprint: "ab".repeat(32),
                not_before: now - Duration::days(1),
                not_after: now + Duration::days(700),
            },
        )
        .await
        .unwrap();
        repo.update_private_key("biz-1", "/creds/biz-1/key.pem", &"cd".repeat(32))
            .await
            .unwrap();

        let issues = vec![CertIssue::new(CertIssueCode::CuitNotFound, "no CUIT")];
        repo.set_status("biz-1", FiscalConfigStatus::Active, &issues).await.unwrap();

        let config = repo.require("biz-1").await.unwrap();
        assert!(config.has_certificate());
        assert!(config.has_private_key());
        assert!(config.is_active());
        assert_eq!(config.cert_serial.as_deref(), Some("0a1b"));
        assert_eq!(repo.validation_issues("biz-1").await.unwrap(), issues);

        assert!(repo.update_private_key("nope", "/x", "y").await.is_err());
    }

    #[tokio::test]
    async fn test_ticket_cache_roundtrip() {
        let repo = setup().await;
        repo.upsert(&registration()).await.unwrap();
        assert!(repo.cached_ticket("biz-1").await.unwrap().is_none());

        let stored = ticket(12);
        repo.cache_ticket("biz-1", &stored).await.unwrap();
        let cached = repo.cached_ticket("biz-1").await.unwrap().unwrap();
        assert_eq!(cached.token, stored.token);
        assert_eq!(cached.sign, stored.sign);
        assert_eq!(cached.expires_at.timestamp(), stored.expires_at.timestamp());

        repo.clear_ticket("biz-1").await.unwrap();
        assert!(repo.cached_ticket("biz-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_voucher_sequence_is_monotonic() {
        let repo = setup().await;

        assert_eq!(
            repo.last_voucher_number("biz-1", 3, VoucherType::FacturaB).await.unwrap(),
            None
        );

        repo.record_voucher_number("biz-1", 3, VoucherType::FacturaB, 1).await.unwrap();
        repo.record_voucher_number("biz-1", 3, VoucherType::FacturaB, 2).await.unwrap();
        // Another type has its own sequence
        repo.record_voucher_number("biz-1", 3, VoucherType::NotaCreditoB, 1).await.unwrap();

        let repeat = repo.record_voucher_number("biz-1", 3, VoucherType::FacturaB, 2).await;
        assert!(matches!(repeat, Err(DbError::Conflict { .. })));
        let backwards = repo.record_voucher_number("biz-1", 3, VoucherType::FacturaB, 1).await;
        assert!(matches!(backwards, Err(DbError::Conflict { .. })));

        assert_eq!(
            repo.last_voucher_number("biz-1", 3, VoucherType::FacturaB).await.unwrap(),
            Some(2)
        );
    }
}
