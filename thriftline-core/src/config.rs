use std::path::{Path, PathBuf};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_TRANSPORT: &str = "tcp://localhost:9090";
pub const DEFAULT_PROTOCOL: &str = "binary";

macro_rules! define_const {
    ($name: ident, $val: expr, $type: ty) => {
        const fn $name() -> $type {
            $val
        }
    };
}

define_const!(default_ssl_validate, true, bool);
define_const!(default_always_connect, true, bool);

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

/// Settings consumed by the client layer, read once at startup.
///
/// Field names double as the TOML/JSON keys; the `THRIFTCLIENT_*`
/// environment variables in [`ClientConfig::overlay_env`] map onto the same
/// fields and take precedence over file values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Transport endpoint as a URL, e.g. `tcp://127.0.0.1:9090`,
    /// `https://rpc.example.com/api`, `unix:///run/svc.sock`.
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Wire protocol name: `binary`, `compact` or `json` (case-insensitive).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Validate the peer certificate on secure transports.
    #[serde(default = "default_ssl_validate")]
    pub ssl_validate: bool,
    /// Trust anchor PEM file used on secure transports.
    #[serde(default)]
    pub ssl_ca_certs: Option<PathBuf>,
    /// Open/close the transport transparently around every call. When
    /// false, connections are managed by the caller.
    #[serde(default = "default_always_connect")]
    pub always_connect: bool,
    /// Wrap the transport with buffering.
    #[serde(default)]
    pub buffered: bool,
    /// Wrap the transport with zlib compression.
    #[serde(default)]
    pub zlib: bool,
    /// Wrap the transport with length-prefixed framing.
    #[serde(default)]
    pub framed: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            transport: default_transport(),
            protocol: default_protocol(),
            ssl_validate: default_ssl_validate(),
            ssl_ca_certs: None,
            always_connect: default_always_connect(),
            buffered: false,
            zlib: false,
            framed: false,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => bail!("Config: error reading {:?}: {e}", path.as_ref()),
        };
        let config = Self::from_slice(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "client config loaded");
        Ok(config)
    }

    pub fn from_slice(content: &[u8]) -> anyhow::Result<Self> {
        // read first non-space u8
        let is_json = match content
            .iter()
            .find(|&&b| b != b' ' && b != b'\r' && b != b'\n' && b != b'\t')
        {
            Some(first) => *first == b'{',
            None => false,
        };
        match is_json {
            true => serde_json::from_slice::<Self>(content).map_err(Into::into),
            false => toml::from_str::<Self>(&String::from_utf8_lossy(content)).map_err(Into::into),
        }
    }

    /// Overlays the `THRIFTCLIENT_*` process environment onto this config.
    pub fn overlay_env(&mut self) -> Result<(), ConfigError> {
        self.overlay_with(|key| std::env::var(key).ok())
    }

    /// Overlays settings from an arbitrary key lookup.
    ///
    /// Extracted from [`ClientConfig::overlay_env`] so the overlay is
    /// testable without touching process-wide environment state.
    pub fn overlay_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("THRIFTCLIENT_TRANSPORT") {
            self.transport = value;
        }
        if let Some(value) = lookup("THRIFTCLIENT_PROTOCOL") {
            self.protocol = value;
        }
        if let Some(value) = lookup("THRIFTCLIENT_SSL_CA_CERTS") {
            self.ssl_ca_certs = Some(PathBuf::from(value));
        }
        overlay_bool(&lookup, "THRIFTCLIENT_SSL_VALIDATE", &mut self.ssl_validate)?;
        overlay_bool(
            &lookup,
            "THRIFTCLIENT_ALWAYS_CONNECT",
            &mut self.always_connect,
        )?;
        overlay_bool(&lookup, "THRIFTCLIENT_BUFFERED", &mut self.buffered)?;
        overlay_bool(&lookup, "THRIFTCLIENT_ZLIB", &mut self.zlib)?;
        overlay_bool(&lookup, "THRIFTCLIENT_FRAMED", &mut self.framed)?;
        Ok(())
    }
}

fn overlay_bool<F>(lookup: &F, key: &'static str, slot: &mut bool) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *slot = parse_bool(key, &value)?;
    }
    Ok(())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::ClientConfig;
    use crate::error::ConfigError;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!("tcp://localhost:9090", config.transport);
        assert_eq!("binary", config.protocol);
        assert!(config.ssl_validate);
        assert!(config.ssl_ca_certs.is_none());
        assert!(config.always_connect);
        assert!(!config.buffered);
        assert!(!config.zlib);
        assert!(!config.framed);
    }

    #[test]
    fn test_toml_deserialize() {
        const TEST_CONFIG: &str = "
            transport = 'tcps://rpc.example.com:5533'
            protocol = 'compact'
            ssl_ca_certs = './cacert.pem'
            always_connect = false
            buffered = true
        ";

        let config = ClientConfig::from_slice(TEST_CONFIG.as_bytes()).unwrap();
        assert_eq!("tcps://rpc.example.com:5533", config.transport);
        assert_eq!("compact", config.protocol);
        assert!(config.ssl_validate);
        assert!(!config.always_connect);
        assert!(config.buffered);
        assert!(!config.zlib);
    }

    #[test]
    fn test_json_deserialize() {
        const TEST_CONFIG: &str = "
            {
                \"transport\": \"unix:///tmp/svc.sock\",
                \"zlib\": true
            }
        ";

        let config = ClientConfig::from_slice(TEST_CONFIG.as_bytes()).unwrap();
        assert_eq!("unix:///tmp/svc.sock", config.transport);
        assert!(config.zlib);
        assert_eq!("binary", config.protocol);
    }

    #[test]
    fn test_env_overlay() {
        let mut env = HashMap::new();
        env.insert("THRIFTCLIENT_TRANSPORT", "tcp://10.0.0.1:1234");
        env.insert("THRIFTCLIENT_PROTOCOL", "COMPACT");
        env.insert("THRIFTCLIENT_SSL_VALIDATE", "off");
        env.insert("THRIFTCLIENT_FRAMED", "Yes");

        let mut config = ClientConfig::default();
        config
            .overlay_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!("tcp://10.0.0.1:1234", config.transport);
        assert_eq!("COMPACT", config.protocol);
        assert!(!config.ssl_validate);
        assert!(config.framed);
        // untouched keys keep their defaults
        assert!(config.always_connect);
    }

    #[test]
    fn test_env_overlay_bad_bool() {
        let mut config = ClientConfig::default();
        let err = config
            .overlay_with(|key| (key == "THRIFTCLIENT_ZLIB").then(|| "maybe".to_string()))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!("THRIFTCLIENT_ZLIB", key);
                assert_eq!("maybe", value);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
