//! # mostrador-core: Pure Fiscal Logic for Mostrador
//!
//! Everything about AFIP invoicing and cash closing that can be decided
//! without touching the network, the disk or the database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Mostrador Fiscal Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/fiscal-cli (operator)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │       mostrador-afip: WSAA, WSFEv1, credentials, authorizer     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ mostrador-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────────┐ ┌──────┐ │   │
//! │  │   │  money  │ │  cuit   │ │ invoice  │ │certificate │ │ cash │ │   │
//! │  │   │  IVA    │ │ mod-11  │ │ CAE flow │ │ PEM, codes │ │close │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └────────────┘ └──────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               mostrador-db (SQLite repositories)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer centavos, IVA split and AFIP amount formatting
//! - [`cuit`] - CUIT parsing and check digit
//! - [`types`] - AFIP code tables and the fiscal configuration row
//! - [`invoice`] - CAE state machine, credit notes, voucher sequence
//! - [`certificate`] - PEM detection and certificate issue codes
//! - [`cash_closing`] - Two-channel session reconciliation
//! - [`validation`] - Input checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use mostrador_core::cuit::Cuit;
//! use mostrador_core::invoice::next_voucher_number;
//! use mostrador_core::money::Money;
//! use mostrador_core::types::IvaRate;
//!
//! let issuer = Cuit::parse("20-12345678-6").unwrap();
//! assert_eq!(issuer.to_string(), "20-12345678-6");
//!
//! let (net, iva) = Money::from_cents(12_100).split_gross(IvaRate::GENERAL);
//! assert_eq!((net.cents(), iva.cents()), (10_000, 2_100));
//!
//! assert_eq!(next_voucher_number(41), 42);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash_closing;
pub mod certificate;
pub mod cuit;
pub mod error;
pub mod invoice;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cuit::Cuit;
pub use error::{CoreError, CoreResult, ValidationError};
pub use invoice::{AfipMessage, FiscalAmounts, Invoice, InvoiceStatus, VoucherSequence};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Highest point-of-sale number AFIP assigns.
pub const MAX_POINT_OF_SALE: i64 = 99_999;

/// Longest razón social accepted.
pub const MAX_BUSINESS_NAME_LEN: usize = 200;
