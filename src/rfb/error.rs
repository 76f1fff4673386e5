//! Errors a session can die from.

use thiserror::Error;

/// Everything that can end an RFB session, server- or client-side.
///
/// Protocol violations and I/O errors close the offending session only;
/// the acceptor logs them and carries on.
#[derive(Debug, Error)]
pub enum RfbError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("couldn't parse ProtocolVersion {0:?}")]
    MalformedVersion(Vec<u8>),

    #[error("only RFB 3.3 and 3.8 are supported, but peer requested {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("security type 1 (none) is required, but peer chose {0}")]
    UnsupportedSecurityType(u32),

    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("only raw encoding is supported, but rectangle uses {0}")]
    UnsupportedEncoding(i32),

    #[error("SetColourMapEntries is not supported")]
    ColourMapUnsupported,

    #[error("server name must be shorter than {limit} bytes, but it's {got} bytes")]
    NameTooLong { got: u32, limit: u32 },

    #[error("can only read cut text up to {limit} bytes, but it came with {got}")]
    CutTextTooLong { got: u32, limit: u32 },

    #[error("received unrecognized message {0}")]
    UnknownMessage(u8),

    #[error("painter is gone")]
    PainterClosed,

    #[error("nested gui exited before reporting its size")]
    NestedGuiClosed,
}
