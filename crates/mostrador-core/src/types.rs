//! # Fiscal Types
//!
//! AFIP code tables and the per-business fiscal configuration.
//!
//! ## Code Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         WSFEv1 Code Tables                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  VoucherType    │   │    DocType      │   │    IvaRate      │       │
//! │  │  (CbteTipo)     │   │   (DocTipo)     │   │   (AlicIva.Id)  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  A  1 / 2 / 3   │   │  80 CUIT        │   │  0%    → 3      │       │
//! │  │  B  6 / 7 / 8   │   │  86 CUIL        │   │  10.5% → 4      │       │
//! │  │  C 11 / 12 / 13 │   │  96 DNI         │   │  21%   → 5      │       │
//! │  │  FC / ND / NC   │   │  99 Cons. Final │   │  27%   → 6      │       │
//! │  └─────────────────┘   └─────────────────┘   │  5%    → 8      │       │
//! │                                              │  2.5%  → 9      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cuit::Cuit;
use crate::error::ValidationError;

// =============================================================================
// Environment
// =============================================================================

/// Which AFIP deployment a business talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Homologation servers (`wsaahomo`, `wswhomo`).
    Testing,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Testing
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Testing => write!(f, "testing"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testing" | "homologacion" | "homo" => Ok(Environment::Testing),
            "production" | "produccion" | "prod" => Ok(Environment::Production),
            _ => Err(ValidationError::NotAllowed {
                field: "environment".to_string(),
                allowed: vec!["testing".to_string(), "production".to_string()],
            }),
        }
    }
}

// =============================================================================
// IVA Rate
// =============================================================================

/// IVA rate in basis points (2100 = 21%).
///
/// Only the six aliquots AFIP publishes can be constructed through
/// [`IvaRate::from_bps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct IvaRate(u32);

impl IvaRate {
    pub const ZERO: IvaRate = IvaRate(0);
    pub const SUPER_REDUCED: IvaRate = IvaRate(250);
    pub const MINIMUM: IvaRate = IvaRate(500);
    pub const REDUCED: IvaRate = IvaRate(1050);
    pub const GENERAL: IvaRate = IvaRate(2100);
    pub const INCREASED: IvaRate = IvaRate(2700);

    /// Every rate AFIP accepts, lowest first.
    pub const ALL: [IvaRate; 6] = [
        IvaRate::ZERO,
        IvaRate::SUPER_REDUCED,
        IvaRate::MINIMUM,
        IvaRate::REDUCED,
        IvaRate::GENERAL,
        IvaRate::INCREASED,
    ];

    /// Validates a rate in basis points against the AFIP table.
    pub fn from_bps(bps: u32) -> Result<Self, ValidationError> {
        IvaRate::ALL
            .iter()
            .copied()
            .find(|rate| rate.0 == bps)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "iva_rate".to_string(),
                allowed: IvaRate::ALL.iter().map(|r| r.to_string()).collect(),
            })
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `AlicIva.Id` for this rate.
    pub const fn afip_id(&self) -> u16 {
        match self.0 {
            250 => 9,
            500 => 8,
            1050 => 4,
            2100 => 5,
            2700 => 6,
            _ => 3,
        }
    }
}

impl Default for IvaRate {
    fn default() -> Self {
        IvaRate::GENERAL
    }
}

impl fmt::Display for IvaRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            write!(f, "{}%", whole)
        } else if frac % 10 == 0 {
            write!(f, "{}.{}%", whole, frac / 10)
        } else {
            write!(f, "{}.{:02}%", whole, frac)
        }
    }
}

impl TryFrom<u32> for IvaRate {
    type Error = ValidationError;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        IvaRate::from_bps(bps)
    }
}

impl From<IvaRate> for u32 {
    fn from(rate: IvaRate) -> Self {
        rate.0
    }
}

// =============================================================================
// Voucher Type (CbteTipo)
// =============================================================================

/// Electronic voucher types issued by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    FacturaA = 1,
    NotaDebitoA = 2,
    NotaCreditoA = 3,
    FacturaB = 6,
    NotaDebitoB = 7,
    NotaCreditoB = 8,
    FacturaC = 11,
    NotaDebitoC = 12,
    NotaCreditoC = 13,
}

impl VoucherType {
    pub const ALL: [VoucherType; 9] = [
        VoucherType::FacturaA,
        VoucherType::NotaDebitoA,
        VoucherType::NotaCreditoA,
        VoucherType::FacturaB,
        VoucherType::NotaDebitoB,
        VoucherType::NotaCreditoB,
        VoucherType::FacturaC,
        VoucherType::NotaDebitoC,
        VoucherType::NotaCreditoC,
    ];

    /// `CbteTipo` code.
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as i32 as u16
    }

    pub fn from_code(code: u16) -> Result<Self, ValidationError> {
        VoucherType::ALL
            .iter()
            .copied()
            .find(|v| v.code() == code)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "voucher_type".to_string(),
                allowed: VoucherType::ALL.iter().map(|v| v.code().to_string()).collect(),
            })
    }

    /// Letter printed on the voucher: `A`, `B` or `C`.
    pub const fn letter(&self) -> char {
        match self {
            VoucherType::FacturaA | VoucherType::NotaDebitoA | VoucherType::NotaCreditoA => 'A',
            VoucherType::FacturaB | VoucherType::NotaDebitoB | VoucherType::NotaCreditoB => 'B',
            _ => 'C',
        }
    }

    pub const fn is_credit_note(&self) -> bool {
        matches!(
            self,
            VoucherType::NotaCreditoA | VoucherType::NotaCreditoB | VoucherType::NotaCreditoC
        )
    }

    /// Credit note of the same letter.
    pub const fn credit_note_type(&self) -> VoucherType {
        match self.letter() {
            'A' => VoucherType::NotaCreditoA,
            'B' => VoucherType::NotaCreditoB,
            _ => VoucherType::NotaCreditoC,
        }
    }

    /// C vouchers carry no IVA breakdown.
    pub const fn discriminates_iva(&self) -> bool {
        !matches!(self.letter(), 'C')
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            VoucherType::FacturaA | VoucherType::FacturaB | VoucherType::FacturaC => "Factura",
            VoucherType::NotaDebitoA | VoucherType::NotaDebitoB | VoucherType::NotaDebitoC => {
                "Nota de Débito"
            }
            _ => "Nota de Crédito",
        };
        write!(f, "{} {}", kind, self.letter())
    }
}

// =============================================================================
// Document Type (DocTipo)
// =============================================================================

/// Buyer identification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Cuit = 80,
    Cuil = 86,
    Dni = 96,
    /// Anonymous end consumer, always paired with `DocNro 0`.
    ConsumidorFinal = 99,
}

impl DocType {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as i32 as u16
    }

    pub fn from_code(code: u16) -> Result<Self, ValidationError> {
        match code {
            80 => Ok(DocType::Cuit),
            86 => Ok(DocType::Cuil),
            96 => Ok(DocType::Dni),
            99 => Ok(DocType::ConsumidorFinal),
            _ => Err(ValidationError::NotAllowed {
                field: "doc_type".to_string(),
                allowed: vec!["80".into(), "86".into(), "96".into(), "99".into()],
            }),
        }
    }
}

// =============================================================================
// Concept
// =============================================================================

/// What the voucher bills for. Services require service dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[repr(i32)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Products = 1,
    Services = 2,
    ProductsAndServices = 3,
}

impl Concept {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as i32 as u16
    }

    pub const fn requires_service_dates(&self) -> bool {
        !matches!(self, Concept::Products)
    }
}

impl Default for Concept {
    fn default() -> Self {
        Concept::Products
    }
}

// =============================================================================
// Fiscal Regime
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FiscalRegime {
    ResponsableInscripto,
    Monotributo,
    Exento,
}

impl FiscalRegime {
    /// Invoice letter an issuer of this regime uses for a given buyer.
    ///
    /// ```text
    ///   issuer RI + buyer RI      → A
    ///   issuer RI + anyone else   → B
    ///   issuer Monotributo/Exento → C
    /// ```
    pub fn invoice_type_for(&self, customer: &Customer) -> VoucherType {
        match self {
            FiscalRegime::ResponsableInscripto => match customer.regime() {
                Some(FiscalRegime::ResponsableInscripto) => VoucherType::FacturaA,
                _ => VoucherType::FacturaB,
            },
            FiscalRegime::Monotributo | FiscalRegime::Exento => VoucherType::FacturaC,
        }
    }
}

// =============================================================================
// Sales Channel / Payment Method
// =============================================================================

/// Which ledger a sale belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SalesChannel {
    /// Reported to AFIP, carries a CAE.
    Fiscal,
    /// Never reported.
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    DebitCard,
    CreditCard,
    BankTransfer,
    QrWallet,
    Other,
}

impl PaymentMethod {
    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Buyer identification as sent in `DocTipo` / `DocNro`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Customer {
    /// Walk-in end consumer.
    Anonymous,
    Identified {
        doc_type: DocType,
        doc_number: u64,
        name: Option<String>,
        regime: Option<FiscalRegime>,
    },
}

impl Customer {
    /// Identified customer by CUIT.
    pub fn with_cuit(cuit: &Cuit, name: Option<String>, regime: Option<FiscalRegime>) -> Self {
        Customer::Identified {
            doc_type: DocType::Cuit,
            doc_number: cuit.as_u64(),
            name,
            regime,
        }
    }

    /// `(DocTipo, DocNro)` pair for WSFEv1.
    ///
    /// Anonymous buyers are always `99 / 0`; sending the issuer's own CUIT
    /// gets the voucher rejected.
    pub fn afip_document(&self) -> (DocType, u64) {
        match self {
            Customer::Anonymous => (DocType::ConsumidorFinal, 0),
            Customer::Identified {
                doc_type,
                doc_number,
                ..
            } => (*doc_type, *doc_number),
        }
    }

    pub fn regime(&self) -> Option<FiscalRegime> {
        match self {
            Customer::Anonymous => None,
            Customer::Identified { regime, .. } => *regime,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Customer::Anonymous => None,
            Customer::Identified { name, .. } => name.as_deref(),
        }
    }
}

// =============================================================================
// Fiscal Configuration
// =============================================================================

/// Activation state of a business's AFIP credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FiscalConfigStatus {
    /// Certificate, key or both still missing.
    PendingCredentials,
    /// Credentials validated with no critical issue.
    Active,
    /// At least one critical certificate issue.
    Invalid,
}

impl Default for FiscalConfigStatus {
    fn default() -> Self {
        FiscalConfigStatus::PendingCredentials
    }
}

impl fmt::Display for FiscalConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiscalConfigStatus::PendingCredentials => write!(f, "pending_credentials"),
            FiscalConfigStatus::Active => write!(f, "active"),
            FiscalConfigStatus::Invalid => write!(f, "invalid"),
        }
    }
}

/// One per business. Holds credential metadata, never raw key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FiscalConfiguration {
    pub id: String,
    pub business_id: String,
    /// Issuer CUIT, 11 digits.
    pub cuit: String,
    pub business_name: String,
    pub fiscal_regime: FiscalRegime,
    pub environment: Environment,
    pub point_of_sale: i64,
    /// Default IVA rate in basis points.
    pub default_iva_rate_bps: i64,
    pub status: FiscalConfigStatus,

    // Certificate metadata
    pub cert_path: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_serial: Option<String>,
    /// SHA-256 of the certificate DER, lowercase hex.
    pub cert_thumbprint: Option<String>,
    pub cert_not_before: Option<DateTime<Utc>>,
    pub cert_not_after: Option<DateTime<Utc>>,

    // Private key: path plus hash only
    pub key_path: Option<String>,
    /// SHA-256 of the key PEM, lowercase hex.
    pub key_sha256: Option<String>,

    /// JSON array of the last validation's issues.
    pub validation_issues: Option<String>,

    // Cached WSAA ticket
    pub wsaa_token: Option<String>,
    pub wsaa_sign: Option<String>,
    pub wsaa_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FiscalConfiguration {
    /// Parsed issuer CUIT.
    pub fn issuer_cuit(&self) -> Result<Cuit, ValidationError> {
        Cuit::parse(&self.cuit)
    }

    pub fn default_iva_rate(&self) -> Result<IvaRate, ValidationError> {
        let bps = u32::try_from(self.default_iva_rate_bps).map_err(|_| ValidationError::OutOfRange {
            field: "default_iva_rate_bps".to_string(),
            min: 0,
            max: i64::from(u32::MAX),
        })?;
        IvaRate::from_bps(bps)
    }

    pub fn point_of_sale(&self) -> u32 {
        self.point_of_sale as u32
    }

    pub fn has_certificate(&self) -> bool {
        self.cert_path.is_some()
    }

    pub fn has_private_key(&self) -> bool {
        self.key_path.is_some() && self.key_sha256.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == FiscalConfigStatus::Active
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
