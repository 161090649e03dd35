//! Configuration resolver.
//!
//! Turns the URL-shaped `transport` setting plus the option flags of a
//! [`ClientConfig`] into a concrete [`Resolved`] plan: which channel to
//! build, whether it is secured, which wire protocol to speak and how
//! connections are managed. Resolution is pure and fails fast; nothing
//! here touches the network.

use std::path::PathBuf;

use http::Uri;
use serde::{Deserialize, Serialize};

use crate::{config::ClientConfig, error::ConfigError};

/// Port used for `tcp://` urls that do not carry one.
pub const DEFAULT_TCP_PORT: u16 = 9090;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Tcp,
    Http,
    Unix,
}

/// The transport half of a resolved configuration.
///
/// Exactly one of `host`+`port`, `path` or `url` is populated, determined
/// by `kind`: tcp targets carry host and port, unix targets a filesystem
/// path, http targets the full url passed through to the HTTP channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportSpec {
    pub kind: TransportKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub secure: bool,
}

impl TransportSpec {
    fn tcp(host: String, port: u16, secure: bool) -> Self {
        TransportSpec {
            kind: TransportKind::Tcp,
            host: Some(host),
            port: Some(port),
            path: None,
            url: None,
            secure,
        }
    }

    fn unix(path: PathBuf, secure: bool) -> Self {
        TransportSpec {
            kind: TransportKind::Unix,
            host: None,
            port: None,
            path: Some(path),
            url: None,
            secure,
        }
    }

    fn http(url: String, secure: bool) -> Self {
        TransportSpec {
            kind: TransportKind::Http,
            host: None,
            port: None,
            path: None,
            url: Some(url),
            secure,
        }
    }
}

/// TLS-related options, only meaningful when the transport is secure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SslOptions {
    pub validate: bool,
    pub ca_certs: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Binary,
    Compact,
    Json,
}

impl ProtocolKind {
    /// Case-insensitive protocol name lookup.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        if name.eq_ignore_ascii_case("binary") {
            Ok(ProtocolKind::Binary)
        } else if name.eq_ignore_ascii_case("compact") {
            Ok(ProtocolKind::Compact)
        } else if name.eq_ignore_ascii_case("json") {
            Ok(ProtocolKind::Json)
        } else {
            Err(ConfigError::UnknownProtocol(name.to_string()))
        }
    }
}

/// How connections are managed around units of work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionPolicy {
    pub always_connect: bool,
    pub buffered: bool,
    pub compressed: bool,
    pub framed: bool,
}

/// The full output of [`resolve`]: everything a facade needs to build its
/// channel, transport stack and protocols.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolved {
    pub transport: TransportSpec,
    pub ssl: SslOptions,
    pub protocol: ProtocolKind,
    pub policy: ConnectionPolicy,
}

impl Resolved {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        resolve(&config.transport, config)
    }
}

/// Resolves a transport url and option set into a [`Resolved`] plan.
pub fn resolve(transport_url: &str, options: &ClientConfig) -> Result<Resolved, ConfigError> {
    let (scheme, rest) = transport_url
        .split_once(':')
        .ok_or_else(|| ConfigError::MalformedUrl {
            url: transport_url.to_string(),
            reason: "missing scheme".to_string(),
        })?;

    // url schemes are case-insensitive
    let transport = match scheme.to_ascii_lowercase().as_str() {
        "tcp" => resolve_tcp(transport_url, false)?,
        "tcps" => resolve_tcp(transport_url, true)?,
        "http" => resolve_http(transport_url, false)?,
        "https" => resolve_http(transport_url, true)?,
        "unix" => TransportSpec::unix(unix_path(transport_url, rest)?, false),
        "unixs" => TransportSpec::unix(unix_path(transport_url, rest)?, true),
        other => {
            return Err(ConfigError::UnsupportedScheme {
                scheme: other.to_string(),
                url: transport_url.to_string(),
            })
        }
    };

    Ok(Resolved {
        transport,
        ssl: SslOptions {
            validate: options.ssl_validate,
            ca_certs: options.ssl_ca_certs.clone(),
        },
        protocol: ProtocolKind::from_name(&options.protocol)?,
        policy: ConnectionPolicy {
            always_connect: options.always_connect,
            buffered: options.buffered,
            compressed: options.zlib,
            framed: options.framed,
        },
    })
}

fn parse_uri(url: &str) -> Result<Uri, ConfigError> {
    url.parse::<Uri>().map_err(|e| ConfigError::MalformedUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn resolve_tcp(url: &str, secure: bool) -> Result<TransportSpec, ConfigError> {
    let uri = parse_uri(url)?;
    let host = uri
        .host()
        .ok_or_else(|| ConfigError::MissingHost(url.to_string()))?;
    let port = uri.port_u16().unwrap_or(DEFAULT_TCP_PORT);
    Ok(TransportSpec::tcp(host.to_string(), port, secure))
}

fn resolve_http(url: &str, secure: bool) -> Result<TransportSpec, ConfigError> {
    // the full url is handed to the HTTP channel as-is; parsing only
    // validates it up front
    let uri = parse_uri(url)?;
    if uri.host().is_none() {
        return Err(ConfigError::MissingHost(url.to_string()));
    }
    Ok(TransportSpec::http(url.to_string(), secure))
}

/// Normalizes the unix-scheme path forms.
///
/// Following URI-authority rules, `unix:///p` and `unix:/p` both denote the
/// absolute path `/p`, while a slash-less form such as `unix:./p` is a
/// relative path. A form with exactly two slashes would parse as a URL
/// host, which has no meaning for a filesystem socket, and is rejected.
fn unix_path(url: &str, rest: &str) -> Result<PathBuf, ConfigError> {
    if let Some(tail) = rest.strip_prefix("///") {
        return Ok(PathBuf::from(format!("/{tail}")));
    }
    if rest.starts_with("//") {
        return Err(ConfigError::AmbiguousUnixPath(url.to_string()));
    }
    if rest.is_empty() {
        return Err(ConfigError::MalformedUrl {
            url: url.to_string(),
            reason: "empty socket path".to_string(),
        });
    }
    Ok(PathBuf::from(rest))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{resolve, ProtocolKind, TransportKind, DEFAULT_TCP_PORT};
    use crate::{config::ClientConfig, error::ConfigError};

    fn resolve_url(url: &str) -> Result<super::Resolved, ConfigError> {
        resolve(url, &ClientConfig::default())
    }

    #[test]
    fn test_scheme_table() {
        let cases = [
            ("tcp://h", TransportKind::Tcp, false),
            ("tcps://h", TransportKind::Tcp, true),
            ("http://h", TransportKind::Http, false),
            ("https://h", TransportKind::Http, true),
            ("unix:/tmp/s", TransportKind::Unix, false),
            ("unixs:/tmp/s", TransportKind::Unix, true),
        ];
        for (url, kind, secure) in cases {
            let resolved = resolve_url(url).unwrap();
            assert_eq!(kind, resolved.transport.kind, "{url}");
            assert_eq!(secure, resolved.transport.secure, "{url}");
        }
    }

    #[test]
    fn test_unsupported_schemes() {
        for url in ["udp://h:1", "ftp://h/x", "tlb://h", "socket:/tmp/s"] {
            match resolve_url(url) {
                Err(ConfigError::UnsupportedScheme { .. }) => {}
                other => panic!("{url}: expected UnsupportedScheme, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_tcp_port_defaulting() {
        let resolved = resolve_url("tcp://localhost").unwrap();
        assert_eq!(Some("localhost".to_string()), resolved.transport.host);
        assert_eq!(Some(DEFAULT_TCP_PORT), resolved.transport.port);

        let resolved = resolve_url("tcp://localhost:1234/").unwrap();
        assert_eq!(Some(1234), resolved.transport.port);
    }

    #[test]
    fn test_tcp_missing_host() {
        assert!(resolve_url("tcp://").is_err());
    }

    #[test]
    fn test_http_url_passthrough() {
        let resolved = resolve_url("https://myservice.local/rpc").unwrap();
        assert_eq!(
            Some("https://myservice.local/rpc".to_string()),
            resolved.transport.url
        );
        assert!(resolved.transport.host.is_none());
        assert!(resolved.transport.secure);
    }

    #[test]
    fn test_unix_path_forms() {
        let triple = resolve_url("unix:///tmp/mysocket").unwrap();
        let single = resolve_url("unix:/tmp/mysocket").unwrap();
        assert_eq!(triple.transport, single.transport);
        assert_eq!(
            Some(PathBuf::from("/tmp/mysocket")),
            triple.transport.path
        );

        let relative = resolve_url("unix:./mysocket").unwrap();
        assert_eq!(Some(PathBuf::from("./mysocket")), relative.transport.path);
        assert_ne!(relative.transport, triple.transport);
    }

    #[test]
    fn test_unix_host_form_rejected() {
        match resolve_url("unix://tmp/mysocket") {
            Err(ConfigError::AmbiguousUnixPath(_)) => {}
            other => panic!("expected AmbiguousUnixPath, got {other:?}"),
        }
    }

    #[test]
    fn test_protocol_names() {
        for name in ["json", "JSON", "Json"] {
            let mut config = ClientConfig::default();
            config.protocol = name.to_string();
            let resolved = resolve("tcp://h", &config).unwrap();
            assert_eq!(ProtocolKind::Json, resolved.protocol);
        }

        let mut config = ClientConfig::default();
        config.protocol = "avro".to_string();
        match resolve("tcp://h", &config) {
            Err(ConfigError::UnknownProtocol(name)) => assert_eq!("avro", name),
            other => panic!("expected UnknownProtocol, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_flags_carry_through() {
        let mut config = ClientConfig::default();
        config.always_connect = false;
        config.buffered = true;
        config.zlib = true;
        config.framed = true;
        let resolved = resolve("tcp://h", &config).unwrap();
        assert!(!resolved.policy.always_connect);
        assert!(resolved.policy.buffered);
        assert!(resolved.policy.compressed);
        assert!(resolved.policy.framed);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut config = ClientConfig::default();
        config.transport = "tcps://rpc.example.com".to_string();
        config.ssl_ca_certs = Some(PathBuf::from("./cacert.pem"));
        config.protocol = "compact".to_string();

        let first = resolve(&config.transport, &config).unwrap();
        let second = resolve(&config.transport, &config).unwrap();
        assert_eq!(first, second);
    }
}
