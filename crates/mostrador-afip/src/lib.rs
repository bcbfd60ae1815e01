//! # mostrador-afip: AFIP/ARCA Web Services for Mostrador
//!
//! Electronic invoicing against AFIP: WSAA login, WSFEv1 CAE requests and
//! the certificate lifecycle behind them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          mostrador-afip                                 │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                   InvoiceAuthorizer (authorizer.rs)               │ │
//! │  │   pending_cae ──► ticket ──► last number ──► FECAESolicitar       │ │
//! │  └──────────┬──────────────────────────────┬─────────────────────────┘ │
//! │             │                              │                           │
//! │  ┌──────────▼──────────┐        ┌──────────▼──────────┐               │
//! │  │ TokenManager        │        │ WsfeClient          │               │
//! │  │ memory + DB cache   │        │ FEDummy             │               │
//! │  │ alreadyAuthenticated│        │ FECompUltimoAut...  │               │
//! │  └──────────┬──────────┘        │ FECAESolicitar      │               │
//! │             │                   └──────────┬──────────┘               │
//! │  ┌──────────▼──────────┐                   │                           │
//! │  │ WsaaClient          │                   │                           │
//! │  │ LoginTicketRequest  │                   │                           │
//! │  │ CMS (openssl)       │                   │                           │
//! │  └──────────┬──────────┘                   │                           │
//! │             │                              │                           │
//! │  ┌──────────▼──────────────────────────────▼──────────┐               │
//! │  │ SoapTransport: reqwest + bounded exponential backoff│               │
//! │  └─────────────────────────────────────────────────────┘               │
//! │                                                                         │
//! │  CertificateService: upload, validate, activate (x509-parser, openssl) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Protocol
//! - [`soap`] - Envelope, faults, XML helpers, HTTP transport with retries
//! - [`ticket`] - `loginTicketRequest` document
//! - [`cms`] - PKCS#7 signing of the ticket request
//! - [`wsaa`] - `loginCms` client and response parsing
//! - [`wsfe`] - WSFEv1 client: health, last number, CAE
//!
//! ### Credentials
//! - [`credentials`] - Certificate/key inspection and pair validation
//! - [`certificates`] - Storage and status lifecycle per business
//! - [`token`] - Access ticket cache
//!
//! ### Orchestration
//! - [`authorizer`] - CAE flow for pending invoices and credit notes
//! - [`services`] - Wiring around one database and transport
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - AFIP error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mostrador_afip::{AfipConfig, AfipServices};
//!
//! let services = AfipServices::connect(AfipConfig::load(None)?).await?;
//! services.certificates.validate("almacen-centro").await?;
//!
//! let report = services.authorizer.authorize_pending("almacen-centro").await?;
//! println!("{} authorized, {} rejected", report.authorized(), report.rejected());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod authorizer;
pub mod certificates;
pub mod cms;
pub mod config;
pub mod credentials;
pub mod error;
pub mod services;
pub mod soap;
pub mod ticket;
pub mod token;
pub mod wsaa;
pub mod wsfe;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use authorizer::{AuthorizationOutcome, InvoiceAuthorizer, PendingRunReport};
pub use certificates::{CertificateService, ValidationOutcome};
pub use config::AfipConfig;
pub use error::{AfipError, AfipResult};
pub use services::AfipServices;
pub use soap::{HttpTransport, SoapTransport};
pub use token::{AccessTicket, TokenManager};
pub use wsaa::WsaaClient;
pub use wsfe::{ServerStatus, WsfeAuth, WsfeClient};
