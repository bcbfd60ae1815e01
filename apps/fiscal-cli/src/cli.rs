//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use mostrador_core::{Money, VoucherType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mostrador-fiscal")]
#[command(version)]
#[command(about = "AFIP credentials, CAE authorization and cash closing", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the built-in search path)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Business the command acts on
    #[arg(long, global = true, env = "MOSTRADOR_BUSINESS_ID")]
    pub business: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Revalidate the stored certificate and key
    CheckCredentials,

    /// Store a certificate PEM and revalidate
    UploadCert { path: PathBuf },

    /// Store a private key PEM and revalidate
    UploadKey { path: PathBuf },

    /// Obtain (or reuse) a WSAA ticket
    Login,

    /// Last authorized number, according to AFIP and locally
    LastVoucher {
        point_of_sale: u32,

        /// AFIP voucher type code (1, 6, 11, ...)
        #[arg(value_parser = parse_voucher_type)]
        voucher_type: VoucherType,
    },

    /// Request a CAE for one invoice
    Authorize {
        invoice_id: String,

        /// Send a rejected invoice again
        #[arg(long)]
        retry: bool,
    },

    /// Manual run over every pending invoice
    AuthorizePending,

    /// Ask FEDummy for the WSFEv1 server status
    ServerStatus,

    /// Close the open cash session
    CloseSession {
        /// Counted cash, e.g. 1234.50
        #[arg(value_parser = parse_money)]
        counted: Money,
    },
}

impl Command {
    fn needs_business(&self) -> bool {
        !matches!(self, Command::ServerStatus | Command::Authorize { .. })
    }
}

impl Cli {
    /// The business id, or an empty one for commands that act without it.
    pub fn require_business(&self) -> anyhow::Result<String> {
        match (&self.business, self.command.needs_business()) {
            (Some(id), _) => Ok(id.clone()),
            (None, false) => Ok(String::new()),
            (None, true) => anyhow::bail!("--business <id> (or MOSTRADOR_BUSINESS_ID) is required"),
        }
    }
}

fn parse_voucher_type(raw: &str) -> Result<VoucherType, String> {
    let code: u16 = raw
        .parse()
        .map_err(|_| format!("`{}` is not an AFIP voucher type code", raw))?;
    VoucherType::from_code(code).map_err(|e| e.to_string())
}

fn parse_money(raw: &str) -> Result<Money, String> {
    Money::from_decimal_str(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("mostrador-fiscal").chain(line.split_whitespace()))
    }

    #[test]
    fn test_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        let cli = parse("--business biz-1 last-voucher 3 6").unwrap();
        assert_eq!(cli.business.as_deref(), Some("biz-1"));
        assert_eq!(
            cli.command,
            Command::LastVoucher {
                point_of_sale: 3,
                voucher_type: VoucherType::FacturaB
            }
        );

        let cli = parse("authorize abc --retry --config /tmp/afip.toml").unwrap();
        assert_eq!(
            cli.command,
            Command::Authorize {
                invoice_id: "abc".into(),
                retry: true
            }
        );
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/afip.toml")));

        let cli = parse("close-session 1234.50").unwrap();
        assert_eq!(
            cli.command,
            Command::CloseSession {
                counted: Money::from_cents(123_450)
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("last-voucher 3 4").is_err());
        assert!(parse("last-voucher 3").is_err());
        assert!(parse("upload-cert").is_err());
        assert!(parse("close-session twelve").is_err());
        assert!(parse("frobnicate").is_err());
        assert!(parse("login --verbose").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_business_requirement() {
        let cli = parse("--business biz-1 login").unwrap();
        assert_eq!(cli.require_business().unwrap(), "biz-1");

        let status = Cli {
            config: None,
            business: None,
            command: Command::ServerStatus,
        };
        assert_eq!(status.require_business().unwrap(), "");

        let login = Cli {
            config: None,
            business: None,
            command: Command::Login,
        };
        assert!(login.require_business().is_err());
    }
}
