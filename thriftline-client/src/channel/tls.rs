//! Client-side TLS over arbitrary byte streams.

use std::io::{Read, Write};

use native_tls::{Certificate, HandshakeError, TlsConnector, TlsStream};
use thrift::TransportErrorKind;

use super::TlsParams;

/// Runs the TLS handshake over a freshly connected stream.
///
/// `verify_hostname` is false for unix-domain peers, which carry no
/// hostname; certificate validation itself still follows `params`.
pub(crate) fn handshake<S>(
    params: &TlsParams,
    domain: &str,
    verify_hostname: bool,
    stream: S,
) -> thrift::Result<TlsStream<S>>
where
    S: Read + Write,
{
    let connector = connector(params, verify_hostname)?;
    connector.connect(domain, stream).map_err(|e| match e {
        HandshakeError::Failure(err) => tls_error(err),
        HandshakeError::WouldBlock(_) => thrift::new_transport_error(
            TransportErrorKind::Unknown,
            "tls handshake would block on a blocking stream",
        ),
    })
}

fn connector(params: &TlsParams, verify_hostname: bool) -> thrift::Result<TlsConnector> {
    let mut builder = TlsConnector::builder();
    if !params.validate {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    if !verify_hostname {
        builder.use_sni(false);
        builder.danger_accept_invalid_hostnames(true);
    }
    if let Some(path) = &params.ca_certs {
        let pem = std::fs::read(path)?;
        let cert = Certificate::from_pem(&pem).map_err(tls_error)?;
        builder.add_root_certificate(cert);
        tracing::debug!(path = %path.display(), "loaded tls root certificate");
    }
    builder.build().map_err(tls_error)
}

fn tls_error(e: native_tls::Error) -> thrift::Error {
    thrift::new_transport_error(TransportErrorKind::Unknown, e.to_string())
}
