//! # Mostrador Fiscal CLI
//!
//! Operator commands for AFIP credentials, CAE authorization and cash
//! closing.
//!
//! ## Usage
//! ```text
//! mostrador-fiscal [--config <path>] [--business <id>] <command>
//!
//!   check-credentials            Revalidate certificate and key
//!   upload-cert <path>           Store a certificate PEM and revalidate
//!   upload-key <path>            Store a private key PEM and revalidate
//!   login                        Obtain (or reuse) a WSAA ticket
//!   last-voucher <pos> <type>    Last authorized number, AFIP and local
//!   authorize <invoice> [--retry]
//!   authorize-pending            Manual run over every pending invoice
//!   server-status                FEDummy
//!   close-session <counted>      Close the open cash session
//! ```
//!
//! `--business` falls back to `MOSTRADOR_BUSINESS_ID`. Arguments are defined
//! in [`cli`].
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=mostrador_afip=trace` - Trace the AFIP crate only
//! - Default: INFO level

mod cli;
mod commands;

use anyhow::{bail, Result};
use clap::Parser;
use cli::{Cli, Command};
use mostrador_afip::{AfipConfig, AfipServices, AuthorizationOutcome};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Entry Point
// =============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let business = cli.require_business()?;

    let config = AfipConfig::load(cli.config)?;
    let services = AfipServices::connect(config).await?;

    match cli.command {
        Command::CheckCredentials => {
            print_validation(&commands::check_credentials(&services, &business).await?);
        }
        Command::UploadCert { path } => {
            print_validation(&commands::upload_certificate(&services, &business, &path).await?);
        }
        Command::UploadKey { path } => {
            print_validation(&commands::upload_private_key(&services, &business, &path).await?);
        }
        Command::Login => {
            let ticket = commands::login(&services, &business).await?;
            println!("ticket valid until {}", ticket.expires_at);
        }
        Command::LastVoucher {
            point_of_sale,
            voucher_type,
        } => {
            let (remote, local) = commands::last_voucher(&services, &business, point_of_sale, voucher_type).await?;
            println!("{} {:05}: AFIP {}", voucher_type, point_of_sale, remote);
            match local {
                Some(local) if local < remote => println!("local sequence {} (AFIP is ahead)", local),
                Some(local) if local > remote => println!("local sequence {} (ahead of AFIP, check the point of sale)", local),
                Some(local) => println!("local sequence {}", local),
                None => println!("no local sequence yet"),
            }
        }
        Command::Authorize { invoice_id, retry } => {
            print_outcome(&commands::authorize(&services, &invoice_id, retry).await?);
        }
        Command::AuthorizePending => {
            let report = commands::authorize_pending(&services, &business).await?;
            for outcome in &report.outcomes {
                print_outcome(outcome);
            }
            for failure in &report.failures {
                println!("{}: skipped ({})", failure.invoice_id, failure.error);
            }
            println!(
                "{} authorized, {} rejected, {} skipped",
                report.authorized(),
                report.rejected(),
                report.failures.len()
            );
            if let Some(e) = report.stopped_by {
                bail!("stopped with {} invoice(s) left pending: {}", report.remaining, e);
            }
        }
        Command::ServerStatus => {
            let status = commands::server_status(&services).await?;
            println!(
                "app {} / db {} / auth {}",
                status.app_server, status.db_server, status.auth_server
            );
            if !status.is_ok() {
                bail!("WSFEv1 reports degraded service");
            }
        }
        Command::CloseSession { counted } => {
            let report = commands::close_session(&services.db, &business, counted).await?;
            println!("fiscal sales   {}", report.fiscal.net_sales);
            println!("internal sales {}", report.internal.net_sales);
            println!("expected cash  {}", report.expected_cash);
            println!("counted cash   {}", report.counted_cash);
            println!("discrepancy    {}", report.discrepancy);
        }
    }

    services.db.close().await;
    Ok(())
}

fn print_validation(outcome: &mostrador_afip::ValidationOutcome) {
    println!("status: {}", outcome.status);
    for issue in &outcome.report.issues {
        let severity = if issue.is_critical() { "critical" } else { "warning" };
        println!("  [{}] {}: {}", severity, issue.code, issue.message);
    }
}

fn print_outcome(outcome: &AuthorizationOutcome) {
    match outcome {
        AuthorizationOutcome::Authorized {
            invoice_id,
            cae,
            cae_expires_on,
            voucher_number,
        } => println!(
            "{}: authorized #{} CAE {} (expires {})",
            invoice_id, voucher_number, cae, cae_expires_on
        ),
        AuthorizationOutcome::Rejected { invoice_id, errors } => {
            println!("{}: rejected", invoice_id);
            for error in errors {
                println!("  {}", error);
            }
        }
    }
}
