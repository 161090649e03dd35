use thiserror::Error;

/// Configuration errors.
///
/// Every variant is raised while resolving configuration or constructing a
/// facade, so a bad setup stops the application from starting instead of
/// failing on the first request.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed transport url `{url}`: {reason}")]
    MalformedUrl { url: String, reason: String },
    #[error("unsupported scheme `{scheme}` in transport url `{url}`")]
    UnsupportedScheme { scheme: String, url: String },
    #[error("transport url `{0}` must include a host")]
    MissingHost(String),
    #[error("unix socket url `{0}` must start with either `unix:/` or `unix:///`")]
    AmbiguousUnixPath(String),
    #[error("unknown protocol name `{0}`, expected one of BINARY, COMPACT, JSON")]
    UnknownProtocol(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("the {0} protocol is not provided by the underlying thrift library")]
    ProtocolUnavailable(&'static str),
    #[error("transport url `{0}` requires tls support, which is not compiled in")]
    TlsUnavailable(String),
    #[error("unix domain sockets are not supported on this platform")]
    UnixUnsupported,
}
