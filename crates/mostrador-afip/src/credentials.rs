//! # Credential Inspection
//!
//! Parses uploaded certificates and keys and validates a certificate/key
//! pair against the business's fiscal configuration.
//!
//! ## Validation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Credential Validation                               │
//! │                                                                         │
//! │  certificate PEM ──► markers ──► x509 parse ──┐                         │
//! │                     INVALID_    CERT_PARSE_   │                         │
//! │                     CERT_FORMAT ERROR         ├──► key matches cert?    │
//! │                                               │    KEY_MISMATCH         │
//! │  private key PEM ──► 5 formats ──► decrypt? ──┘                         │
//! │                     INVALID_     KEY_ENCRYPTED    validity window       │
//! │                     KEY_FORMAT   KEY_PARSE_ERROR  CERT_EXPIRED / ...    │
//! │                                                                         │
//! │                                                   subject CUIT          │
//! │                                                   CUIT_MISMATCH / ...   │
//! │                                                                         │
//! │  ValidationReport ──► critical? ──► invalid : active                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use mostrador_core::certificate::{
    check_certificate_pem, check_cuit, check_key_pem, check_validity, CertIssue, CertIssueCode, KeyFormat,
    ValidationReport,
};
use mostrador_core::Cuit;
use sha2::{Digest, Sha256};
use x509_parser::pem::parse_x509_pem;

use crate::cms::SigningCredentials;

// =============================================================================
// Certificate
// =============================================================================

/// Metadata read from an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// RFC 4514 style subject, e.g. `CN=pos1, serialNumber=CUIT 20123456786`.
    pub subject: String,
    /// Individual subject attribute values.
    pub subject_fields: Vec<String>,
    /// Hex serial number.
    pub serial: String,
    /// SHA-256 of the DER encoding, lowercase hex.
    pub thumbprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

fn parse_error(message: impl Into<String>) -> CertIssue {
    CertIssue::new(CertIssueCode::CertParseError, message)
}

/// Checks markers and parses the certificate.
pub fn inspect_certificate(pem: &str) -> Result<CertificateInfo, CertIssue> {
    check_certificate_pem(pem)?;

    let (_, parsed_pem) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| parse_error(format!("invalid PEM encoding: {}", e)))?;
    let cert = parsed_pem
        .parse_x509()
        .map_err(|e| parse_error(format!("invalid X.509 certificate: {}", e)))?;

    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| parse_error("notBefore out of range"))?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| parse_error("notAfter out of range"))?;

    let subject_fields = cert
        .subject()
        .iter_attributes()
        .filter_map(|attr| attr.as_str().ok())
        .map(str::to_string)
        .collect();

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        subject_fields,
        serial: cert.raw_serial_as_string(),
        thumbprint: sha256_hex(&parsed_pem.contents),
        not_before,
        not_after,
    })
}

// =============================================================================
// Private Key
// =============================================================================

/// What is known about an uploaded key without decrypting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub format: KeyFormat,
    pub encrypted: bool,
    /// SHA-256 of the PEM text, lowercase hex.
    pub sha256: String,
}

pub fn inspect_key(pem: &str) -> Result<KeyInfo, CertIssue> {
    let detected = check_key_pem(pem)?;
    Ok(KeyInfo {
        format: detected.format,
        encrypted: detected.encrypted,
        sha256: sha256_hex(pem.as_bytes()),
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// =============================================================================
// Pair Validation
// =============================================================================

/// Validates a certificate/key pair for `configured_cuit` at `now`.
///
/// An encrypted key is only a warning when a passphrase is available to
/// open it; without one the pair cannot be checked or used.
pub fn validate_pair(
    cert_pem: &str,
    key_pem: &str,
    passphrase: Option<&str>,
    configured_cuit: &Cuit,
    now: DateTime<Utc>,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    let cert = inspect_certificate(cert_pem).map_err(|issue| report.push(issue)).ok();
    let key = inspect_key(key_pem).map_err(|issue| report.push(issue)).ok();

    if let Some(key) = &key {
        if key.encrypted {
            report.push(CertIssue::new(
                CertIssueCode::KeyEncrypted,
                format!("{} key is passphrase protected", key.format.label()),
            ));
            if passphrase.is_none() {
                report.push(CertIssue::new(
                    CertIssueCode::KeyParseError,
                    "encrypted key and no passphrase configured",
                ));
            }
        }
    }

    let Some(cert) = cert else {
        return report;
    };

    if let Some(issue) = check_validity(cert.not_before, cert.not_after, now) {
        report.push(issue);
    }

    let fields: Vec<&str> = cert
        .subject_fields
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(cert.subject.as_str()))
        .collect();
    if let Some(issue) = check_cuit(&fields, configured_cuit) {
        report.push(issue);
    }

    let key_usable = key
        .as_ref()
        .map(|k| !k.encrypted || passphrase.is_some())
        .unwrap_or(false);
    if key_usable {
        let key_passphrase = if key.as_ref().map(|k| k.encrypted).unwrap_or(false) {
            passphrase
        } else {
            None
        };
        match SigningCredentials::from_pem(cert_pem.as_bytes(), key_pem.as_bytes(), key_passphrase) {
            Ok(creds) => match creds.key_matches() {
                Ok(true) => {}
                Ok(false) => report.push(CertIssue::new(
                    CertIssueCode::KeyMismatch,
                    "private key does not belong to the certificate",
                )),
                Err(e) => report.push(CertIssue::new(CertIssueCode::KeyParseError, e.to_string())),
            },
            Err(e) => report.push(CertIssue::new(
                CertIssueCode::KeyParseError,
                format!("could not load private key: {}", e),
            )),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{generate_credentials, CredentialOptions};
    use mostrador_core::FiscalConfigStatus;

    fn cuit() -> Cuit {
        "20-12345678-6".parse().unwrap()
    }

    #[test]
    fn test_inspect_certificate() {
        let generated = generate_credentials(&CredentialOptions::default());
        let info = inspect_certificate(&generated.cert_pem).unwrap();

        assert!(info.subject.contains("mostrador-test"));
        assert!(info.subject_fields.iter().any(|f| f == "CUIT 20123456786"));
        assert_eq!(info.thumbprint.len(), 64);
        assert!(info.not_before < info.not_after);
        assert!(!info.serial.is_empty());
    }

    #[test]
    fn test_inspect_certificate_rejects_garbage() {
        let issue = inspect_certificate("hola").unwrap_err();
        assert_eq!(issue.code, CertIssueCode::InvalidCertFormat);

        let issue =
            inspect_certificate("-----BEGIN CERTIFICATE-----\nbm9wZQ==\n-----END CERTIFICATE-----\n").unwrap_err();
        assert_eq!(issue.code, CertIssueCode::CertParseError);
    }

    #[test]
    fn test_inspect_key_hashes_pem() {
        let generated = generate_credentials(&CredentialOptions::default());
        let info = inspect_key(&generated.key_pem).unwrap();
        assert_eq!(info.format, KeyFormat::Pkcs8);
        assert!(!info.encrypted);
        assert_eq!(info.sha256, sha256_hex(generated.key_pem.as_bytes()));
    }

    #[test]
    fn test_valid_pair_activates() {
        let generated = generate_credentials(&CredentialOptions::default());
        let report = validate_pair(&generated.cert_pem, &generated.key_pem, None, &cuit(), Utc::now());

        assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
        assert_eq!(report.resulting_status(), FiscalConfigStatus::Active);
    }

    #[test]
    fn test_mismatched_key_blocks_activation() {
        let a = generate_credentials(&CredentialOptions::default());
        let b = generate_credentials(&CredentialOptions::default());
        let report = validate_pair(&a.cert_pem, &b.key_pem, None, &cuit(), Utc::now());

        assert!(report.has(CertIssueCode::KeyMismatch));
        assert_eq!(report.resulting_status(), FiscalConfigStatus::Invalid);
    }

    #[test]
    fn test_expired_and_not_yet_valid() {
        let expired = generate_credentials(&CredentialOptions {
            not_before_days: -400,
            not_after_days: -1,
            ..CredentialOptions::default()
        });
        let report = validate_pair(&expired.cert_pem, &expired.key_pem, None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::CertExpired));
        assert!(report.blocks_activation());

        let future = generate_credentials(&CredentialOptions {
            not_before_days: 2,
            not_after_days: 400,
            ..CredentialOptions::default()
        });
        let report = validate_pair(&future.cert_pem, &future.key_pem, None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::CertNotYetValid));
    }

    #[test]
    fn test_expiring_soon_is_a_warning() {
        let generated = generate_credentials(&CredentialOptions {
            not_after_days: 10,
            ..CredentialOptions::default()
        });
        let report = validate_pair(&generated.cert_pem, &generated.key_pem, None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::CertExpiringSoon));
        assert_eq!(report.resulting_status(), FiscalConfigStatus::Active);
    }

    #[test]
    fn test_cuit_checks() {
        let other = generate_credentials(&CredentialOptions {
            cuit: Some("30712345671".into()),
            ..CredentialOptions::default()
        });
        let report = validate_pair(&other.cert_pem, &other.key_pem, None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::CuitMismatch));
        assert!(report.blocks_activation());

        let anonymous = generate_credentials(&CredentialOptions {
            cuit: None,
            ..CredentialOptions::default()
        });
        let report = validate_pair(&anonymous.cert_pem, &anonymous.key_pem, None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::CuitNotFound));
        assert!(!report.blocks_activation());
    }

    #[test]
    fn test_encrypted_key_requires_passphrase() {
        let generated = generate_credentials(&CredentialOptions {
            passphrase: Some("clave".into()),
            ..CredentialOptions::default()
        });

        let without = validate_pair(&generated.cert_pem, &generated.key_pem, None, &cuit(), Utc::now());
        assert!(without.has(CertIssueCode::KeyEncrypted));
        assert!(without.has(CertIssueCode::KeyParseError));
        assert!(without.blocks_activation());

        let with = validate_pair(&generated.cert_pem, &generated.key_pem, Some("clave"), &cuit(), Utc::now());
        assert_eq!(with.codes(), vec![CertIssueCode::KeyEncrypted]);
        assert!(!with.blocks_activation());

        let wrong = validate_pair(&generated.cert_pem, &generated.key_pem, Some("otra"), &cuit(), Utc::now());
        assert!(wrong.has(CertIssueCode::KeyParseError));
    }

    #[test]
    fn test_bad_key_format_still_checks_certificate() {
        let generated = generate_credentials(&CredentialOptions {
            not_after_days: -1,
            not_before_days: -30,
            ..CredentialOptions::default()
        });
        let report = validate_pair(&generated.cert_pem, "not a key", None, &cuit(), Utc::now());
        assert!(report.has(CertIssueCode::InvalidKeyFormat));
        assert!(report.has(CertIssueCode::CertExpired));
        assert!(!report.has(CertIssueCode::KeyMismatch));
    }
}
