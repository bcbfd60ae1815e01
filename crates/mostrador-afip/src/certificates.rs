//! # Certificate Service
//!
//! Upload, storage and activation of a business's AFIP credentials.
//!
//! ## Storage Layout
//! ```text
//! <credentials_dir>/
//! └── <business_id>/
//!     ├── certificate.pem     (0644)
//!     └── private_key.pem     (0600, owner only)
//! ```
//!
//! The database keeps certificate metadata and the key's path and SHA-256.
//! Key material never enters the database or the logs.
//!
//! ## Status Transitions
//! ```text
//! ┌──────────────────────┐  cert + key, no critical issue  ┌────────┐
//! │ pending_credentials  │ ───────────────────────────────►│ active │
//! └──────────┬───────────┘                                 └───┬────┘
//!            │ critical issue            re-upload / revalidate │
//!            ▼                                                  ▼
//!       ┌─────────┐ ◄──────────────── critical issue ──────────┘
//!       │ invalid │
//!       └─────────┘
//! ```

use chrono::Utc;
use mostrador_core::certificate::{CertIssue, CertIssueCode, ValidationReport};
use mostrador_core::{FiscalConfigStatus, FiscalConfiguration, ValidationError};
use mostrador_db::{CertificateMetadata, Database, DbError, FiscalConfigRepository};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cms::SigningCredentials;
use crate::config::AfipConfig;
use crate::credentials::{inspect_certificate, inspect_key, sha256_hex, validate_pair};
use crate::error::{AfipError, AfipResult};

const CERTIFICATE_FILE: &str = "certificate.pem";
const PRIVATE_KEY_FILE: &str = "private_key.pem";

/// Status and issues after a validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub status: FiscalConfigStatus,
    pub report: ValidationReport,
}

/// Fiscal configuration for `business_id`, mapping a missing row to
/// [`AfipError::ConfigNotFound`].
pub(crate) async fn require_config(
    repo: &FiscalConfigRepository,
    business_id: &str,
) -> AfipResult<FiscalConfiguration> {
    match repo.require(business_id).await {
        Ok(config) => Ok(config),
        Err(DbError::NotFound { .. }) => Err(AfipError::ConfigNotFound(business_id.to_string())),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone)]
pub struct CertificateService {
    configs: FiscalConfigRepository,
    credentials_dir: PathBuf,
    passphrase: Option<String>,
}

impl CertificateService {
    pub fn new(db: &Database, config: &AfipConfig) -> Self {
        CertificateService {
            configs: db.fiscal_configs(),
            credentials_dir: config.storage.credentials_dir.clone(),
            passphrase: config.storage.key_passphrase.clone(),
        }
    }

    fn business_dir(&self, business_id: &str) -> AfipResult<PathBuf> {
        let safe = !business_id.is_empty()
            && business_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(ValidationError::InvalidFormat {
                field: "business_id".to_string(),
                reason: "only letters, digits, '-' and '_' are allowed".to_string(),
            }
            .into());
        }
        Ok(self.credentials_dir.join(business_id))
    }

    // =========================================================================
    // Uploads
    // =========================================================================

    /// Stores a certificate and revalidates the pair.
    ///
    /// A PEM that cannot be parsed is refused before anything is written.
    pub async fn upload_certificate(&self, business_id: &str, pem: &str) -> AfipResult<ValidationOutcome> {
        require_config(&self.configs, business_id).await?;
        let info = inspect_certificate(pem).map_err(|issue| AfipError::Credentials(vec![issue]))?;

        let dir = self.business_dir(business_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(CERTIFICATE_FILE);
        tokio::fs::write(&path, pem).await?;

        info!(
            business_id = %business_id,
            subject = %info.subject,
            serial = %info.serial,
            not_after = %info.not_after,
            "Certificate stored"
        );

        self.configs
            .update_certificate(
                business_id,
                &CertificateMetadata {
                    path: path.to_string_lossy().into_owned(),
                    subject: info.subject,
                    serial: info.serial,
                    thumbprint: info.thumbprint,
                    not_before: info.not_before,
                    not_after: info.not_after,
                },
            )
            .await?;

        self.validate(business_id).await
    }

    /// Stores a private key (owner-only permissions) and revalidates.
    pub async fn upload_private_key(&self, business_id: &str, pem: &str) -> AfipResult<ValidationOutcome> {
        require_config(&self.configs, business_id).await?;
        let key = inspect_key(pem).map_err(|issue| AfipError::Credentials(vec![issue]))?;

        let dir = self.business_dir(business_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(PRIVATE_KEY_FILE);
        write_private(&path, pem.as_bytes()).await?;

        info!(
            business_id = %business_id,
            format = key.format.label(),
            encrypted = key.encrypted,
            "Private key stored"
        );

        self.configs
            .update_private_key(business_id, &path.to_string_lossy(), &key.sha256)
            .await?;

        self.validate(business_id).await
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Revalidates the stored pair and records the resulting status.
    pub async fn validate(&self, business_id: &str) -> AfipResult<ValidationOutcome> {
        let config = require_config(&self.configs, business_id).await?;

        let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
            debug!(business_id = %business_id, "Credentials incomplete");
            self.configs
                .set_status(business_id, FiscalConfigStatus::PendingCredentials, &[])
                .await?;
            return Ok(ValidationOutcome {
                status: FiscalConfigStatus::PendingCredentials,
                report: ValidationReport::new(),
            });
        };

        let cert_pem = tokio::fs::read_to_string(cert_path).await?;
        let key_pem = tokio::fs::read_to_string(key_path).await?;

        let mut report = validate_pair(
            &cert_pem,
            &key_pem,
            self.passphrase.as_deref(),
            &config.issuer_cuit()?,
            Utc::now(),
        );
        if let Some(issue) = stored_hash_issue(&config, &key_pem) {
            report.push(issue);
        }

        let status = report.resulting_status();
        self.configs.set_status(business_id, status, &report.issues).await?;

        if report.blocks_activation() {
            warn!(
                business_id = %business_id,
                issues = ?report.codes(),
                "Credentials invalid"
            );
        } else {
            info!(
                business_id = %business_id,
                warnings = ?report.codes(),
                "Credentials active"
            );
        }

        Ok(ValidationOutcome { status, report })
    }

    // =========================================================================
    // Signing
    // =========================================================================

    /// Loads the pair for CMS signing. The configuration must be active and
    /// the key file must still match the hash recorded at upload.
    pub async fn signing_credentials(&self, business_id: &str) -> AfipResult<SigningCredentials> {
        let config = require_config(&self.configs, business_id).await?;
        if !config.is_active() {
            return Err(AfipError::ConfigInactive {
                business_id: business_id.to_string(),
                status: config.status.to_string(),
            });
        }

        let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
            return Err(AfipError::ConfigInactive {
                business_id: business_id.to_string(),
                status: FiscalConfigStatus::PendingCredentials.to_string(),
            });
        };

        let cert_pem = tokio::fs::read(cert_path).await?;
        let key_pem = tokio::fs::read_to_string(key_path).await?;

        if let Some(issue) = stored_hash_issue(&config, &key_pem) {
            return Err(AfipError::Credentials(vec![issue]));
        }

        let encrypted = inspect_key(&key_pem)
            .map_err(|issue| AfipError::Credentials(vec![issue]))?
            .encrypted;
        let passphrase = if encrypted { self.passphrase.as_deref() } else { None };

        SigningCredentials::from_pem(&cert_pem, key_pem.as_bytes(), passphrase)
    }
}

fn stored_hash_issue(config: &FiscalConfiguration, key_pem: &str) -> Option<CertIssue> {
    match &config.key_sha256 {
        Some(expected) if *expected == sha256_hex(key_pem.as_bytes()) => None,
        _ => Some(CertIssue::new(
            CertIssueCode::KeyParseError,
            "private key file does not match the hash recorded at upload",
        )),
    }
}

#[cfg(unix)]
async fn write_private(path: &Path, contents: &[u8]) -> AfipResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.flush().await?;
    // mode() only applies on creation
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private(path: &Path, contents: &[u8]) -> AfipResult<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::{generate_credentials, CredentialOptions, GeneratedCredentials};
    use mostrador_core::{Environment, FiscalRegime, IvaRate};
    use mostrador_db::{DbConfig, NewFiscalConfiguration};

    pub struct Fixture {
        pub db: Database,
        pub config: AfipConfig,
        pub service: CertificateService,
        pub credentials: GeneratedCredentials,
        pub _dir: tempfile::TempDir,
    }

    pub async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.fiscal_configs()
            .upsert(&NewFiscalConfiguration {
                business_id: "biz-1".into(),
                cuit: "20-12345678-6".parse().unwrap(),
                business_name: "Almacen Don Pepe".into(),
                fiscal_regime: FiscalRegime::ResponsableInscripto,
                environment: Environment::Testing,
                point_of_sale: 3,
                default_iva_rate: IvaRate::GENERAL,
            })
            .await
            .unwrap();

        let config = AfipConfig::with_storage(":memory:", dir.path().join("credentials"));
        let service = CertificateService::new(&db, &config);
        Fixture {
            db,
            config,
            service,
            credentials: generate_credentials(&CredentialOptions::default()),
            _dir: dir,
        }
    }

    /// Fixture with both credentials uploaded and active.
    pub async fn active_fixture() -> Fixture {
        let fx = fixture().await;
        fx.service
            .upload_certificate("biz-1", &fx.credentials.cert_pem)
            .await
            .unwrap();
        let outcome = fx
            .service
            .upload_private_key("biz-1", &fx.credentials.key_pem)
            .await
            .unwrap();
        assert_eq!(outcome.status, FiscalConfigStatus::Active);
        fx
    }
}
