//! TLS connector for `ssl = true` connections

use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tessera_core::{ConnectionParams, DaoError, Result};

/// Build the connector from `params.cert`.
///
/// `cert` is a PEM CA certificate, inline or as a file path. With a CA the
/// server certificate is verified against it; without one the channel is
/// encrypted but unauthenticated, like libpq's `sslmode=require`.
pub(crate) fn tls_connector(params: &ConnectionParams, via_tunnel: bool) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();

    match params.cert.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(cert) => {
            let pem = load_pem(cert)?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|e| DaoError::Configuration(format!("Invalid CA certificate: {}", e)))?;
            builder.add_root_certificate(certificate);
        }
        None => {
            builder.danger_accept_invalid_certs(true);
        }
    }

    // Through a tunnel the peer is reached as 127.0.0.1, never the name on
    // its certificate
    builder.danger_accept_invalid_hostnames(via_tunnel);

    let connector = builder
        .build()
        .map_err(|e| DaoError::Configuration(format!("Failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

fn load_pem(cert: &str) -> Result<Vec<u8>> {
    if cert.starts_with("-----BEGIN") {
        return Ok(cert.as_bytes().to_vec());
    }
    std::fs::read(cert).map_err(|e| {
        DaoError::Configuration(format!("Failed to read CA certificate from {}: {}", cert, e))
    })
}
