//! # Repository Module
//!
//! One repository per aggregate, each holding a clone of the pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.fiscal_configs()  → FiscalConfigRepository                         │
//! │                          config, credentials, WSAA ticket, sequences    │
//! │  db.invoices()        → InvoiceRepository                              │
//! │                          insert, pending list, guarded CAE updates      │
//! │  db.cash_sessions()   → CashSessionRepository                          │
//! │                          open, movements, close with report             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cash;
pub mod fiscal;
pub mod invoice;
