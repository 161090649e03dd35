//! Unified client channel.
//!
//! The `thrift` crate supplies protocols and transport wrappers but only a
//! plain TCP channel; this module provides the one concrete byte channel
//! the rest of the crate builds on, covering tcp, tcp+tls, unix domain
//! sockets (plain and tls) and thrift-over-HTTP behind a single type.
//!
//! A [`Channel`] is a cheap-to-clone handle over shared connection state.
//! The protocol stack reads and writes through clones of the handle while
//! the facade hands out another clone for manual `open()`/`close()`
//! control, so all of them always see the same connection.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thrift::TransportErrorKind;
use thriftline_core::resolve::DEFAULT_TCP_PORT;
use thriftline_core::{ConfigError, SslOptions, TransportKind, TransportSpec};

mod http;
#[cfg(feature = "tls")]
mod tls;

use http::HttpState;

/// Shared handle to one client connection.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Mutex<ChannelInner>>,
}

struct ChannelInner {
    target: Target,
    conn: Conn,
}

/// TLS settings carried into the secure connectors.
#[derive(Debug, Clone)]
pub(crate) struct TlsParams {
    pub(crate) validate: bool,
    pub(crate) ca_certs: Option<PathBuf>,
}

impl TlsParams {
    fn from_options(ssl: &SslOptions) -> Self {
        TlsParams {
            validate: ssl.validate,
            ca_certs: ssl.ca_certs.clone(),
        }
    }
}

/// Where and how to connect, frozen at facade construction.
#[derive(Debug)]
enum Target {
    Tcp {
        host: String,
        port: u16,
        tls: Option<TlsParams>,
    },
    #[cfg(unix)]
    Unix {
        path: PathBuf,
        tls: Option<TlsParams>,
    },
    Http {
        url: String,
        tls: TlsParams,
    },
}

enum Conn {
    Closed,
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<native_tls::TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(all(unix, feature = "tls"))]
    UnixTls(Box<native_tls::TlsStream<UnixStream>>),
    Http(HttpState),
}

impl Channel {
    /// Builds a closed channel from a resolved transport spec.
    ///
    /// Fails fast on combinations this build cannot serve (secure sockets
    /// without the `tls` feature, unix sockets on non-unix platforms).
    pub fn from_resolved(spec: &TransportSpec, ssl: &SslOptions) -> Result<Channel, ConfigError> {
        let target = match spec.kind {
            TransportKind::Tcp => {
                let host = spec
                    .host
                    .clone()
                    .ok_or_else(|| ConfigError::MissingHost(describe(spec)))?;
                let port = spec.port.unwrap_or(DEFAULT_TCP_PORT);
                Target::Tcp {
                    host,
                    port,
                    tls: secure_params(spec, ssl)?,
                }
            }
            TransportKind::Unix => unix_target(spec, ssl)?,
            TransportKind::Http => {
                let url = spec.url.clone().ok_or_else(|| ConfigError::MalformedUrl {
                    url: describe(spec),
                    reason: "missing url".to_string(),
                })?;
                Target::Http {
                    url,
                    tls: TlsParams::from_options(ssl),
                }
            }
        };
        Ok(Channel {
            shared: Arc::new(Mutex::new(ChannelInner {
                target,
                conn: Conn::Closed,
            })),
        })
    }

    /// Opens the connection. Opening an already-open channel is a
    /// transport error, matching the underlying library's socket channel.
    pub fn open(&self) -> thrift::Result<()> {
        let mut inner = self.shared.lock().unwrap();
        if !matches!(inner.conn, Conn::Closed) {
            return Err(thrift::new_transport_error(
                TransportErrorKind::AlreadyOpen,
                "channel is already open",
            ));
        }
        inner.conn = inner.target.connect()?;
        Ok(())
    }

    /// Closes the connection. Closing a closed channel is a transport
    /// error; failures shutting the socket down propagate unchanged.
    pub fn close(&self) -> thrift::Result<()> {
        let mut inner = self.shared.lock().unwrap();
        match std::mem::replace(&mut inner.conn, Conn::Closed) {
            Conn::Closed => Err(thrift::new_transport_error(
                TransportErrorKind::NotOpen,
                "channel is not open",
            )),
            Conn::Tcp(stream) => {
                stream.shutdown(Shutdown::Both)?;
                Ok(())
            }
            #[cfg(feature = "tls")]
            Conn::Tls(mut stream) => {
                stream.shutdown()?;
                Ok(())
            }
            #[cfg(unix)]
            Conn::Unix(stream) => {
                stream.shutdown(Shutdown::Both)?;
                Ok(())
            }
            #[cfg(all(unix, feature = "tls"))]
            Conn::UnixTls(mut stream) => {
                stream.shutdown()?;
                Ok(())
            }
            Conn::Http(_) => Ok(()),
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.shared.lock().unwrap().conn, Conn::Closed)
    }
}

#[cfg(unix)]
fn unix_target(spec: &TransportSpec, ssl: &SslOptions) -> Result<Target, ConfigError> {
    let path = spec.path.clone().ok_or_else(|| ConfigError::MalformedUrl {
        url: describe(spec),
        reason: "missing socket path".to_string(),
    })?;
    Ok(Target::Unix {
        path,
        tls: secure_params(spec, ssl)?,
    })
}

#[cfg(not(unix))]
fn unix_target(_spec: &TransportSpec, _ssl: &SslOptions) -> Result<Target, ConfigError> {
    Err(ConfigError::UnixUnsupported)
}

#[cfg(feature = "tls")]
fn secure_params(spec: &TransportSpec, ssl: &SslOptions) -> Result<Option<TlsParams>, ConfigError> {
    if !spec.secure {
        return Ok(None);
    }
    Ok(Some(TlsParams::from_options(ssl)))
}

#[cfg(not(feature = "tls"))]
fn secure_params(spec: &TransportSpec, ssl: &SslOptions) -> Result<Option<TlsParams>, ConfigError> {
    let _ = ssl;
    if !spec.secure {
        return Ok(None);
    }
    Err(ConfigError::TlsUnavailable(describe(spec)))
}

fn describe(spec: &TransportSpec) -> String {
    match spec.kind {
        TransportKind::Tcp => format!(
            "{}://{}:{}",
            if spec.secure { "tcps" } else { "tcp" },
            spec.host.as_deref().unwrap_or(""),
            spec.port.unwrap_or(DEFAULT_TCP_PORT),
        ),
        TransportKind::Unix => format!(
            "{}:{}",
            if spec.secure { "unixs" } else { "unix" },
            spec.path
                .as_deref()
                .unwrap_or_else(|| std::path::Path::new(""))
                .display(),
        ),
        TransportKind::Http => spec.url.clone().unwrap_or_default(),
    }
}

impl Target {
    fn connect(&self) -> thrift::Result<Conn> {
        match self {
            Target::Tcp { host, port, tls } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                match tls {
                    None => {
                        tracing::debug!(host = %host, port = %port, "tcp channel connected");
                        Ok(Conn::Tcp(stream))
                    }
                    #[cfg(feature = "tls")]
                    Some(params) => {
                        let stream = tls::handshake(params, host, true, stream)?;
                        tracing::debug!(host = %host, port = %port, "tls channel connected");
                        Ok(Conn::Tls(Box::new(stream)))
                    }
                    #[cfg(not(feature = "tls"))]
                    Some(_) => Err(thrift::new_transport_error(
                        TransportErrorKind::Unknown,
                        "tls support is not compiled in",
                    )),
                }
            }
            #[cfg(unix)]
            Target::Unix { path, tls } => {
                let stream = UnixStream::connect(path)?;
                match tls {
                    None => {
                        tracing::debug!(path = %path.display(), "unix channel connected");
                        Ok(Conn::Unix(stream))
                    }
                    #[cfg(feature = "tls")]
                    Some(params) => {
                        // no hostname to verify on a filesystem peer
                        let stream = tls::handshake(params, "localhost", false, stream)?;
                        tracing::debug!(path = %path.display(), "unix tls channel connected");
                        Ok(Conn::UnixTls(Box::new(stream)))
                    }
                    #[cfg(not(feature = "tls"))]
                    Some(_) => Err(thrift::new_transport_error(
                        TransportErrorKind::Unknown,
                        "tls support is not compiled in",
                    )),
                }
            }
            Target::Http { url, tls } => Ok(Conn::Http(HttpState::connect(url, tls)?)),
        }
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "thrift channel is not open")
}

impl Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.shared.lock().unwrap().conn {
            Conn::Closed => Err(not_open()),
            Conn::Tcp(inner) => inner.read(buf),
            #[cfg(feature = "tls")]
            Conn::Tls(inner) => inner.read(buf),
            #[cfg(unix)]
            Conn::Unix(inner) => inner.read(buf),
            #[cfg(all(unix, feature = "tls"))]
            Conn::UnixTls(inner) => inner.read(buf),
            Conn::Http(inner) => inner.read(buf),
        }
    }
}

impl Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.shared.lock().unwrap().conn {
            Conn::Closed => Err(not_open()),
            Conn::Tcp(inner) => inner.write(buf),
            #[cfg(feature = "tls")]
            Conn::Tls(inner) => inner.write(buf),
            #[cfg(unix)]
            Conn::Unix(inner) => inner.write(buf),
            #[cfg(all(unix, feature = "tls"))]
            Conn::UnixTls(inner) => inner.write(buf),
            Conn::Http(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.shared.lock().unwrap().conn {
            Conn::Closed => Err(not_open()),
            Conn::Tcp(inner) => inner.flush(),
            #[cfg(feature = "tls")]
            Conn::Tls(inner) => inner.flush(),
            #[cfg(unix)]
            Conn::Unix(inner) => inner.flush(),
            #[cfg(all(unix, feature = "tls"))]
            Conn::UnixTls(inner) => inner.flush(),
            Conn::Http(inner) => inner.flush(),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock().unwrap();
        f.debug_struct("Channel")
            .field("target", &inner.target)
            .field("open", &!matches!(inner.conn, Conn::Closed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use thriftline_core::{resolve, ClientConfig};

    use super::Channel;

    fn channel_for(url: &str) -> Channel {
        let resolved = resolve(url, &ClientConfig::default()).unwrap();
        Channel::from_resolved(&resolved.transport, &resolved.ssl).unwrap()
    }

    fn spawn_echo_listener() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => return,
                };
                std::thread::spawn(move || {
                    let mut buf = [0u8; 64];
                    loop {
                        match stream.read(&mut buf) {
                            Ok(0) | Err(_) => return,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    #[test]
    fn test_tcp_open_close_cycle() {
        let addr = spawn_echo_listener();
        let channel = channel_for(&format!("tcp://{addr}"));
        assert!(!channel.is_open());

        channel.open().unwrap();
        assert!(channel.is_open());
        assert!(channel.open().is_err(), "double open must fail");

        let mut rw = channel.clone();
        rw.write_all(b"hello").unwrap();
        rw.flush().unwrap();
        let mut buf = [0u8; 5];
        rw.read_exact(&mut buf).unwrap();
        assert_eq!(b"hello", &buf);

        channel.close().unwrap();
        assert!(!channel.is_open());
        assert!(channel.close().is_err(), "double close must fail");
    }

    #[test]
    fn test_io_on_closed_channel() {
        let channel = channel_for("tcp://localhost:9090");
        let mut rw = channel.clone();
        let err = rw.write(b"x").unwrap_err();
        assert_eq!(std::io::ErrorKind::NotConnected, err.kind());
        let err = rw.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(std::io::ErrorKind::NotConnected, err.kind());
    }

    #[test]
    fn test_connect_refused_surfaces_as_error() {
        // bind then drop to get a port nothing listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let channel = channel_for(&format!("tcp://{addr}"));
        assert!(channel.open().is_err());
        assert!(!channel.is_open());
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_roundtrip() {
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.sock");
        let listener = UnixListener::bind(&path).unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            if stream.read_exact(&mut buf).is_ok() {
                let _ = stream.write_all(&buf);
            }
        });

        let channel = channel_for(&format!("unix:{}", path.display()));
        channel.open().unwrap();
        let mut rw = channel.clone();
        rw.write_all(b"ping").unwrap();
        rw.flush().unwrap();
        let mut buf = [0u8; 4];
        rw.read_exact(&mut buf).unwrap();
        assert_eq!(b"ping", &buf);
        channel.close().unwrap();
    }
}
