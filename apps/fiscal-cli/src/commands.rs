//! Command implementations. Each one returns what `main` prints.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use mostrador_afip::{
    AccessTicket, AfipServices, AuthorizationOutcome, PendingRunReport, ServerStatus, ValidationOutcome, WsfeAuth,
};
use mostrador_core::cash_closing::{ClosingReport, SaleRecord};
use mostrador_core::{Money, VoucherType};
use mostrador_db::Database;
use std::path::Path;
use tracing::info;

pub async fn check_credentials(services: &AfipServices, business_id: &str) -> Result<ValidationOutcome> {
    Ok(services.certificates.validate(business_id).await?)
}

pub async fn upload_certificate(services: &AfipServices, business_id: &str, path: &Path) -> Result<ValidationOutcome> {
    let pem = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(services.certificates.upload_certificate(business_id, &pem).await?)
}

pub async fn upload_private_key(services: &AfipServices, business_id: &str, path: &Path) -> Result<ValidationOutcome> {
    let pem = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(services.certificates.upload_private_key(business_id, &pem).await?)
}

pub async fn login(services: &AfipServices, business_id: &str) -> Result<AccessTicket> {
    Ok(services.tokens.ticket(business_id).await?)
}

/// Last number according to AFIP and according to the local sequence.
pub async fn last_voucher(
    services: &AfipServices,
    business_id: &str,
    point_of_sale: u32,
    voucher_type: VoucherType,
) -> Result<(i64, Option<i64>)> {
    let fiscal = services.db.fiscal_configs().require(business_id).await?;
    let ticket = services.tokens.ticket(business_id).await?;
    let auth = WsfeAuth::new(&ticket, fiscal.issuer_cuit()?);

    let remote = services.wsfe.last_authorized(&auth, point_of_sale, voucher_type).await?;
    let local = services
        .db
        .fiscal_configs()
        .last_voucher_number(business_id, point_of_sale, voucher_type)
        .await?;
    Ok((remote, local))
}

pub async fn authorize(services: &AfipServices, invoice_id: &str, retry: bool) -> Result<AuthorizationOutcome> {
    let outcome = if retry {
        services.authorizer.retry(invoice_id).await?
    } else {
        services.authorizer.authorize(invoice_id).await?
    };
    Ok(outcome)
}

pub async fn authorize_pending(services: &AfipServices, business_id: &str) -> Result<PendingRunReport> {
    Ok(services.authorizer.authorize_pending(business_id).await?)
}

pub async fn server_status(services: &AfipServices) -> Result<ServerStatus> {
    Ok(services.wsfe.server_status().await?)
}

/// Closes the open cash session of a business against the counted drawer.
pub async fn close_session(db: &Database, business_id: &str, counted: Money) -> Result<ClosingReport> {
    let sessions = db.cash_sessions();
    let mut session = sessions
        .get_open(business_id)
        .await?
        .ok_or_else(|| anyhow!("no open cash session for business {}", business_id))?;

    let sales: Vec<SaleRecord> = db
        .invoices()
        .list_by_session(&session.id)
        .await?
        .iter()
        .map(SaleRecord::from)
        .collect();
    let movements = sessions.list_movements(&session.id).await?;

    let report = ClosingReport::compute(&session, &sales, &movements, counted, Utc::now())?;
    session.close(&report)?;
    sessions.close(&session.id, &report).await?;

    info!(
        business_id = %business_id,
        session_id = %session.id,
        sales = sales.len(),
        discrepancy = %report.discrepancy,
        "Session closed"
    );
    Ok(report)
}
