//! Transport stacking and protocol construction.
//!
//! Wrapping order over the base channel follows the classic thrift client
//! layering: buffering closest to the socket, then zlib compression, then
//! length-prefixed framing, each applied only when its policy flag is set.
//! The concrete wrapper combination is erased behind boxed transport
//! objects so one facade type serves every configuration.

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TCompactInputProtocol, TCompactOutputProtocol,
    TInputProtocol, TOutputProtocol,
};
use thrift::transport::{
    TBufferedReadTransport, TBufferedWriteTransport, TFramedReadTransport, TFramedWriteTransport,
    TReadTransport, TWriteTransport,
};
use thriftline_core::{ConfigError, ConnectionPolicy, ProtocolKind};

use crate::channel::Channel;

/// Input protocol type handed to generated-client constructors.
pub type ClientInputProtocol = Box<dyn TInputProtocol + Send>;
/// Output protocol type handed to generated-client constructors.
pub type ClientOutputProtocol = Box<dyn TOutputProtocol + Send>;

pub(crate) fn read_transport(
    channel: Channel,
    policy: &ConnectionPolicy,
) -> Box<dyn TReadTransport + Send> {
    let mut read: Box<dyn TReadTransport + Send> = Box::new(channel);
    if policy.buffered {
        read = Box::new(TBufferedReadTransport::new(read));
    }
    if policy.compressed {
        read = Box::new(ZlibDecoder::new(read));
    }
    if policy.framed {
        read = Box::new(TFramedReadTransport::new(read));
    }
    read
}

pub(crate) fn write_transport(
    channel: Channel,
    policy: &ConnectionPolicy,
) -> Box<dyn TWriteTransport + Send> {
    let mut write: Box<dyn TWriteTransport + Send> = Box::new(channel);
    if policy.buffered {
        write = Box::new(TBufferedWriteTransport::new(write));
    }
    if policy.compressed {
        write = Box::new(ZlibEncoder::new(write, Compression::default()));
    }
    if policy.framed {
        write = Box::new(TFramedWriteTransport::new(write));
    }
    write
}

/// Builds the protocol pair for `kind` over the wrapped transports.
pub(crate) fn protocols(
    kind: ProtocolKind,
    read: Box<dyn TReadTransport + Send>,
    write: Box<dyn TWriteTransport + Send>,
) -> Result<(ClientInputProtocol, ClientOutputProtocol), ConfigError> {
    match kind {
        ProtocolKind::Binary => Ok((
            Box::new(TBinaryInputProtocol::new(read, true)),
            Box::new(TBinaryOutputProtocol::new(write, true)),
        )),
        ProtocolKind::Compact => Ok((
            Box::new(TCompactInputProtocol::new(read)),
            Box::new(TCompactOutputProtocol::new(write)),
        )),
        // the underlying library ships no JSON protocol; surface that at
        // construction time instead of at the first call
        ProtocolKind::Json => Err(ConfigError::ProtocolUnavailable("JSON")),
    }
}
