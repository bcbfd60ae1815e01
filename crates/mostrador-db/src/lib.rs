//! # mostrador-db: Database Layer for Mostrador Fiscal
//!
//! SQLite persistence for the fiscal core, using sqlx with runtime queries
//! and the row types from `mostrador-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  mostrador-afip (authorizer, token manager, certificate service)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  mostrador-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ FiscalConfigRepo   │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ InvoiceRepo        │  │ 001_init   │  │   │
//! │  │   │               │    │ CashSessionRepo    │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mostrador_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("fiscal.db")).await?;
//! let pending = db.invoices().list_pending_cae("biz-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::cash::CashSessionRepository;
pub use repository::fiscal::{CertificateMetadata, FiscalConfigRepository, NewFiscalConfiguration, StoredTicket};
pub use repository::invoice::InvoiceRepository;
