//! # Validation Module
//!
//! Input validation for fiscal data before it reaches the database or AFIP.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Operator input (CLI / callers)                               │
//! │  └── THIS MODULE: shape and range checks                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Domain transitions (invoice.rs, cash_closing.rs)             │
//! │  └── State-machine and write-once rules                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite constraints                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: AFIP itself (FECAESolicitar errors / observations)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{DocType, IvaRate};
use crate::{MAX_BUSINESS_NAME_LEN, MAX_POINT_OF_SALE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Fiscal Identifiers
// =============================================================================

/// Validates an AFIP point of sale (`PtoVta`).
///
/// ```rust
/// use mostrador_core::validation::validate_point_of_sale;
///
/// assert!(validate_point_of_sale(1).is_ok());
/// assert!(validate_point_of_sale(0).is_err());
/// assert!(validate_point_of_sale(100_000).is_err());
/// ```
pub fn validate_point_of_sale(point_of_sale: i64) -> ValidationResult<u32> {
    if !(1..=MAX_POINT_OF_SALE).contains(&point_of_sale) {
        return Err(ValidationError::OutOfRange {
            field: "point_of_sale".to_string(),
            min: 1,
            max: MAX_POINT_OF_SALE,
        });
    }
    Ok(point_of_sale as u32)
}

/// Validates a CAE: exactly 14 digits.
pub fn validate_cae(cae: &str) -> ValidationResult<()> {
    let cae = cae.trim();

    if cae.is_empty() {
        return Err(ValidationError::Required {
            field: "cae".to_string(),
        });
    }

    if cae.len() != 14 || !cae.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "cae".to_string(),
            reason: "must be exactly 14 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a buyer document number for its `DocTipo`.
///
/// ## Rules
/// - Consumidor final: must be 0
/// - DNI: 7 or 8 digits
/// - CUIT / CUIL: a valid 11-digit CUIT
pub fn validate_doc_number(doc_type: DocType, doc_number: u64) -> ValidationResult<()> {
    match doc_type {
        DocType::ConsumidorFinal => {
            if doc_number != 0 {
                return Err(ValidationError::InvalidFormat {
                    field: "doc_number".to_string(),
                    reason: "anonymous end consumer must use document number 0".to_string(),
                });
            }
        }
        DocType::Dni => {
            if !(1_000_000..=99_999_999).contains(&doc_number) {
                return Err(ValidationError::InvalidFormat {
                    field: "doc_number".to_string(),
                    reason: "DNI must have 7 or 8 digits".to_string(),
                });
            }
        }
        DocType::Cuit | DocType::Cuil => {
            crate::cuit::Cuit::parse(&format!("{:011}", doc_number))?;
        }
    }
    Ok(())
}

// =============================================================================
// Amounts and Rates
// =============================================================================

/// Validates that an amount is strictly positive.
pub fn validate_positive_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an IVA rate in basis points against the AFIP table.
pub fn validate_iva_rate_bps(bps: i64) -> ValidationResult<IvaRate> {
    let bps = u32::try_from(bps).map_err(|_| ValidationError::OutOfRange {
        field: "iva_rate".to_string(),
        min: 0,
        max: 2700,
    })?;
    IvaRate::from_bps(bps)
}

// =============================================================================
// Free Text and Identifiers
// =============================================================================

/// Validates a business (razón social) name.
pub fn validate_business_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "business_name".to_string(),
        });
    }

    if name.chars().count() > MAX_BUSINESS_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "business_name".to_string(),
            max: MAX_BUSINESS_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a UUID string.
///
/// ```rust
/// use mostrador_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
