//! Wiring of the AFIP services around one database and one transport.

use mostrador_db::{Database, DbConfig};
use std::sync::Arc;
use tracing::info;

use crate::authorizer::InvoiceAuthorizer;
use crate::certificates::CertificateService;
use crate::config::AfipConfig;
use crate::error::AfipResult;
use crate::soap::{HttpTransport, SoapTransport};
use crate::token::TokenManager;
use crate::wsaa::WsaaClient;
use crate::wsfe::WsfeClient;

pub struct AfipServices {
    pub config: AfipConfig,
    pub db: Database,
    pub certificates: CertificateService,
    pub tokens: Arc<TokenManager>,
    pub wsfe: WsfeClient,
    pub authorizer: InvoiceAuthorizer,
}

impl AfipServices {
    /// Opens the configured database and talks to AFIP over HTTPS.
    pub async fn connect(config: AfipConfig) -> AfipResult<Self> {
        config.validate()?;

        if let Some(parent) = config.storage.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let db = Database::new(DbConfig::new(&config.storage.database_path)).await?;
        let transport: Arc<dyn SoapTransport> = Arc::new(HttpTransport::new(&config)?);

        info!(
            environment = %config.afip.environment,
            wsaa = %config.wsaa_url(),
            wsfe = %config.wsfe_url(),
            "AFIP services ready"
        );
        Ok(Self::with_transport(db, config, transport))
    }

    pub fn with_transport(db: Database, config: AfipConfig, transport: Arc<dyn SoapTransport>) -> Self {
        let certificates = CertificateService::new(&db, &config);
        let tokens = Arc::new(TokenManager::new(
            WsaaClient::new(transport.clone(), config.wsaa_url()),
            certificates.clone(),
            &db,
            config.clone(),
        ));
        let wsfe = WsfeClient::new(transport, config.wsfe_url());
        let authorizer = InvoiceAuthorizer::new(&db, tokens.clone(), wsfe.clone(), config.clone());

        AfipServices {
            config,
            db,
            certificates,
            tokens,
            wsfe,
            authorizer,
        }
    }
}
