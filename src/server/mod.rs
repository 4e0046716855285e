pub mod proxy;

use crate::cli::Args;
use crate::config::ProxyConfig;
use log::{ info, warn };
use std::error::Error;
use std::net::SocketAddr;

/// Development proxy: forwards the API prefix to the chat backend and
/// optionally serves the built client.
pub struct Server {
    addr: String,
    config: ProxyConfig,
    args: Args,
}

impl Server {
    pub fn new(args: Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = ProxyConfig::from_args(&args)?;
        Ok(Self {
            addr: args.proxy_addr.clone(),
            config,
            args,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        info!(
            "Proxying {}/* -> {} (prefix stripped)",
            self.config.prefix,
            self.config.target
        );
        let app = proxy::router(
            self.config,
            self.args.proxy_rate_limit,
            self.args.static_dir.as_deref()
        )?;

        if self.args.enable_tls {
            match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    info!(
                        "TLS enabled. Loading certificate from '{}' and key from '{}'",
                        cert_path,
                        key_path
                    );
                    let tls_config = axum_server::tls_rustls::RustlsConfig
                        ::from_pem_file(cert_path, key_path).await?;
                    info!("Starting HTTPS proxy on: https://{}", addr);
                    axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
                    return Ok(());
                }
                _ => {
                    return Err(
                        "Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into()
                    );
                }
            }
        }

        if self.args.tls_cert_path.is_some() || self.args.tls_key_path.is_some() {
            warn!("TLS paths given without --enable-tls; serving plain HTTP.");
        }

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            format!("Failed to bind proxy to {}: {}. Try a different port.", addr, e)
        })?;
        info!("Starting HTTP proxy on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
