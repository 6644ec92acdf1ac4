//! Minimal TLS client that reports which certificate a server presents for an SNI name.
//!
//! The probe performs no chain or name validation: its purpose is to observe a responder from
//! the outside, not to authenticate it.

use crate::error::Error;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Accepts any server certificate, while still checking handshake signatures against it.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// A TLS connector that completes handshakes with any server certificate. [`probe_sni`] uses
/// it; callers that already hold a connected stream can run the same handshake themselves.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the client configuration can't be built.
pub fn insecure_connector() -> Result<TlsConnector, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Connect to `host:port`, run a TLS handshake advertising `name` as the SNI server name, and
/// return the end-entity certificate the server presented.
///
/// # Errors
///
/// Returns [`Error::InvalidServerName`] if `name` can't be sent as SNI,
/// [`Error::ProbeTimeout`] if connecting and handshaking take longer than `timeout`, and
/// [`Error::ProbeConnection`] if the connection or handshake fails, or the server presents no
/// certificate.
pub async fn probe_sni(
    name: &str,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<CertificateDer<'static>, Error> {
    let server_name = ServerName::try_from(name.to_string())?;
    let connector = insecure_connector()?;
    let connection_err = |source| Error::ProbeConnection {
        host: host.to_string(),
        port,
        source,
    };

    let handshake = async {
        let stream = TcpStream::connect((host, port)).await?;
        let tls = connector.connect(server_name, stream).await?;
        tls.get_ref()
            .1
            .peer_certificates()
            .and_then(|chain| chain.first())
            .map(|cert| cert.clone().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no peer certificate"))
    };

    match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(cert)) => {
            tracing::debug!("{host}:{port} presented a certificate for \"{name}\"");
            Ok(cert)
        }
        Ok(Err(err)) => Err(connection_err(err)),
        Err(_) => Err(Error::ProbeTimeout {
            host: host.to_string(),
            port,
            timeout,
        }),
    }
}
