//! # AFIP Error Types
//!
//! Error types for everything that talks to AFIP or handles credentials.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       AFIP Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     AFIP Answers        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Config         │  │  Http           │  │  SoapFault              │ │
//! │  │  ConfigNotFound │  │  HttpStatus     │  │  AlreadyAuthenticated   │ │
//! │  │  ConfigInactive │  │  InvalidResponse│  │  Wsfe (code: message)   │ │
//! │  │                 │  │                 │  │  UnrecordedAuthorization│ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Storage      │  │   Credentials   │  │      Domain             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Db             │  │  Credentials    │  │  Core                   │ │
//! │  │  Io             │  │  Crypto         │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use mostrador_core::certificate::CertIssue;
use mostrador_core::{AfipMessage, CoreError};
use mostrador_db::DbError;
use thiserror::Error;

/// Result type alias for AFIP operations.
pub type AfipResult<T> = Result<T, AfipError>;

#[derive(Debug, Error)]
pub enum AfipError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid or unreadable configuration file.
    #[error("Invalid AFIP configuration: {0}")]
    Config(String),

    /// No fiscal configuration stored for the business.
    #[error("No fiscal configuration for business {0}")]
    ConfigNotFound(String),

    /// Fiscal configuration exists but is not `active`.
    ///
    /// ## When This Occurs
    /// - Certificate or key not uploaded yet
    /// - Last validation found critical issues
    #[error("Fiscal configuration for business {business_id} is {status}")]
    ConfigInactive { business_id: String, status: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Connection, TLS or timeout failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without a SOAP fault body.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Response body could not be interpreted.
    #[error("Invalid AFIP response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // AFIP Answers
    // =========================================================================
    /// SOAP fault returned by WSAA or WSFEv1.
    #[error("SOAP fault {code}: {message}")]
    SoapFault { code: String, message: String },

    /// WSAA still holds a valid ticket for this certificate and service.
    ///
    /// ## When This Occurs
    /// The ticket obtained earlier was lost (e.g. database restored). AFIP
    /// will not issue a new one until the old one expires.
    #[error("WSAA reports an active ticket for this certificate; wait for it to expire")]
    AlreadyAuthenticated,

    /// Errors block of a WSFEv1 response.
    #[error("WSFEv1 errors: {}", format_messages(.0))]
    Wsfe(Vec<AfipMessage>),

    /// AFIP granted a CAE that could not be stored locally.
    ///
    /// ## When This Occurs
    /// The approved answer arrived but the invoice could not take it (local
    /// numbering clash, database failure). The CAE attempt stays recorded,
    /// so the next `authorize` recovers the CAE from AFIP instead of
    /// requesting a new number.
    #[error(
        "AFIP authorized invoice {invoice_id} as #{voucher_number} (CAE {cae}, expires {cae_expires_on}) \
         but it was not recorded: {reason}"
    )]
    UnrecordedAuthorization {
        invoice_id: String,
        cae: String,
        cae_expires_on: chrono::NaiveDate,
        voucher_number: i64,
        reason: String,
    },

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Certificate or key failed validation.
    #[error("Credential validation failed: {}", format_issues(.0))]
    Credentials(Vec<CertIssue>),

    /// OpenSSL failure while loading keys or signing.
    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    // =========================================================================
    // Storage / Domain Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_messages(messages: &[AfipMessage]) -> String {
    messages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_issues(issues: &[CertIssue]) -> String {
    issues
        .iter()
        .map(|i| i.code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<toml::de::Error> for AfipError {
    fn from(err: toml::de::Error) -> Self {
        AfipError::Config(err.to_string())
    }
}

impl From<url::ParseError> for AfipError {
    fn from(err: url::ParseError) -> Self {
        AfipError::Config(format!("invalid URL: {}", err))
    }
}

impl From<mostrador_core::ValidationError> for AfipError {
    fn from(err: mostrador_core::ValidationError) -> Self {
        AfipError::Core(CoreError::Validation(err))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl AfipError {
    /// Returns true if the failure is transient and the request may be repeated.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - HTTP 5xx without a SOAP fault
    ///
    /// SOAP faults, WSFE errors and credential problems are answers, not
    /// transport failures, and are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AfipError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            AfipError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for failures that happened before AFIP produced an answer.
    ///
    /// An invoice whose request ends with one of these stays `pending_cae`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AfipError::Http(_) | AfipError::HttpStatus { .. } | AfipError::InvalidResponse(_)
        )
    }
}
