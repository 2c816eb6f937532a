//! HTTPS server for the admission webhook

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::error::Error;
use crate::webhook::{webhook_router, WebhookState};
use crate::DEFAULT_WEBHOOK_PORT;

/// Directory the serving certificate is mounted into by default
pub const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";

/// Certificate file name inside the cert directory
pub const TLS_CERT_FILE: &str = "tls.crt";

/// Private key file name inside the cert directory
pub const TLS_KEY_FILE: &str = "tls.key";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// TLS certificate PEM
    pub cert_pem: String,
    /// TLS private key PEM
    pub key_pem: String,
}

impl ServerConfig {
    /// Build a config by reading `tls.crt` and `tls.key` from `cert_dir`
    pub async fn from_cert_dir(addr: SocketAddr, cert_dir: &Path) -> Result<Self, Error> {
        let (cert_pem, key_pem) = load_tls_material(cert_dir).await?;
        Ok(Self {
            addr,
            cert_pem,
            key_pem,
        })
    }
}

/// Default listen address, all interfaces on the webhook port
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_WEBHOOK_PORT))
}

/// Read the serving certificate and key PEMs from a directory
pub async fn load_tls_material(cert_dir: &Path) -> Result<(String, String), Error> {
    let cert = read_pem(cert_dir.join(TLS_CERT_FILE)).await?;
    let key = read_pem(cert_dir.join(TLS_KEY_FILE)).await?;
    Ok((cert, key))
}

async fn read_pem(path: PathBuf) -> Result<String, Error> {
    let pem = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
    if pem.trim().is_empty() {
        return Err(Error::config(format!("{} is empty", path.display())));
    }
    Ok(pem)
}

/// Start the webhook server
pub async fn start_server(config: ServerConfig, state: Arc<WebhookState>) -> Result<(), Error> {
    let app = webhook_router(state);

    let tls_config =
        RustlsConfig::from_pem(config.cert_pem.into_bytes(), config.key_pem.into_bytes())
            .await
            .map_err(|e| Error::config(format!("TLS config error: {}", e)))?;

    info!(addr = %config.addr, "Starting node operation webhook server");

    axum_server::bind_rustls(config.addr, tls_config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    Ok(())
}
