//! # Error Types
//!
//! Domain-specific error types for mostrador-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mostrador-core errors (this file)                                     │
//! │  ├── CoreError        - Fiscal rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mostrador-db errors                                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  mostrador-afip errors                                                 │
//! │  └── AfipError        - WSAA / WSFEv1 / credential failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → AfipError → Operator    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Fiscal business-rule errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The invoice already carries a CAE; its fiscal fields are write-once.
    ///
    /// ## When This Occurs
    /// - Authorizing an invoice twice
    /// - Rejecting or resetting an authorized invoice
    ///
    /// Corrections go through a credit note, never through a mutation.
    #[error("Invoice {invoice_id} is authorized (CAE {cae}); fiscal data is immutable")]
    InvoiceImmutable { invoice_id: String, cae: String },

    /// The invoice is not in a state that allows the requested transition.
    #[error("Invoice {invoice_id} is {current_status}, cannot {operation}")]
    InvalidInvoiceStatus {
        invoice_id: String,
        current_status: String,
        operation: String,
    },

    /// Internal-channel sales never reach AFIP.
    #[error("Invoice {0} belongs to the internal channel and has no fiscal data")]
    NotFiscal(String),

    /// Credit note would exceed what is left to credit on the original.
    #[error("Credit of {requested} exceeds remaining creditable {remaining} on invoice {invoice_id}")]
    CreditExceedsOriginal {
        invoice_id: String,
        requested: String,
        remaining: String,
    },

    /// AFIP returned a number that does not follow the local sequence.
    #[error("Voucher sequence for POS {point_of_sale} type {voucher_type} is not monotonic: last {last}, got {got}")]
    NonMonotonicSequence {
        point_of_sale: u32,
        voucher_type: u16,
        last: i64,
        got: i64,
    },

    /// Cash session is already closed.
    #[error("Cash session {0} is already closed")]
    SessionClosed(String),

    /// A sale record that cannot be reconciled.
    #[error("Invalid sale record {id}: {reason}")]
    InvalidSaleRecord { id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// CUIT failed structure or check-digit validation.
    #[error("Invalid CUIT '{value}': {reason}")]
    InvalidCuit { value: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
