//! Thrift-over-HTTP channel state.
//!
//! Writes accumulate locally; `flush()` POSTs the accumulated request body
//! and makes the response body available for subsequent reads. One flush is
//! one RPC round trip, which is how the thrift HTTP transport works on
//! every client implementation.

use std::io::{self, Cursor, Read, Write};

use bytes::Bytes;
use reqwest::blocking::Client;
use thrift::TransportErrorKind;

use super::TlsParams;

pub(crate) struct HttpState {
    client: Client,
    url: String,
    wbuf: Vec<u8>,
    rbuf: Cursor<Bytes>,
}

impl HttpState {
    pub(crate) fn connect(url: &str, tls: &TlsParams) -> thrift::Result<Self> {
        let mut builder = Client::builder();
        if !tls.validate {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &tls.ca_certs {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(request_error)?;
            builder = builder.add_root_certificate(cert);
            tracing::debug!(path = %path.display(), "loaded http root certificate");
        }
        let client = builder.build().map_err(request_error)?;
        tracing::debug!(url, "http channel ready");
        Ok(HttpState {
            client,
            url: url.to_string(),
            wbuf: Vec::new(),
            rbuf: Cursor::new(Bytes::new()),
        })
    }

    fn round_trip(&mut self) -> io::Result<()> {
        let body = std::mem::take(&mut self.wbuf);
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-thrift")
            .body(body)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let bytes = response
            .bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.rbuf = Cursor::new(bytes);
        Ok(())
    }
}

impl Read for HttpState {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.rbuf.read(buf)
    }
}

impl Write for HttpState {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wbuf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        self.round_trip()
    }
}

fn request_error(e: reqwest::Error) -> thrift::Error {
    thrift::new_transport_error(TransportErrorKind::Unknown, e.to_string())
}
