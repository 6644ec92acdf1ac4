use acme_standalone::tls_sni::load_cert_dir;
use acme_standalone::{Config, DualStackServers, Http01Server, Shared, TlsSniServer};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("acme-standalone".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;

    let mut tls_sni_servers = match (&config.tls_sni_bind_addr, &config.cert_dir) {
        (Some(addr), Some(cert_dir)) => {
            let selector = load_cert_dir(cert_dir)?;
            tracing::info!("serving TLS-SNI certificates for {:?}", selector.names());
            let handshake_timeout = config.handshake_timeout;
            Some(DualStackServers::bind(*addr, config.fallback, |listener| {
                TlsSniServer::new(listener, selector.clone())
                    .with_handshake_timeout(handshake_timeout)
            })?)
        }
        _ => None,
    };

    let mut http01_servers = match &config.http01_bind_addr {
        Some(addr) => {
            let resources = config.resource_table()?;
            tracing::info!("serving {} HTTP-01 resource(s)", resources.len());
            let request_timeout = config.http01_timeout;
            Some(DualStackServers::bind(*addr, config.fallback, |listener| {
                Http01Server::new(listener, resources.clone()).with_request_timeout(request_timeout)
            })?)
        }
        None => None,
    };

    if let Some(servers) = tls_sni_servers.as_mut() {
        servers.serve_forever();
    }
    if let Some(servers) = http01_servers.as_mut() {
        servers.serve_forever();
    }

    signal::ctrl_c().await?;
    tracing::info!("quitting from signal");

    let tls_sni_res = match tls_sni_servers {
        Some(servers) => servers.shutdown_and_close().await,
        None => Ok(()),
    };
    let http01_res = match http01_servers {
        Some(servers) => servers.shutdown_and_close().await,
        None => Ok(()),
    };
    tls_sni_res?;
    http01_res?;

    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acme_standalone=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<Shared> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            tracing::debug!("loaded config from {config_file}");
            let config = Config::try_from_file(&config_file)?;
            Ok(Arc::new(config))
        }
    }
}
