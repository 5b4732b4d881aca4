//! Error taxonomy shared by both endpoints.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::HEADER_LEN;

#[derive(Debug, Error)]
pub enum DrtpError {
    /// Datagram too short to hold a header
    #[error("malformed header: need {} bytes, got {len}", HEADER_LEN)]
    MalformedHeader { len: usize },

    /// Peer answered the handshake with something other than the expected flags
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Input could not be opened or read
    #[error("source '{origin}' unavailable: {source}")]
    SourceUnavailable {
        origin: String,
        #[source]
        source: io::Error,
    },

    /// Destination could not be created
    #[error("sink '{}' unavailable: {source}", path.display())]
    SinkUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// More chunks than 16-bit sequence numbers
    #[error("source needs {chunks} chunks, at most {} are addressable", u16::MAX)]
    SourceTooLarge { chunks: u64 },

    #[error("no response within {timeout:?} while waiting for {waiting_for}")]
    TimeoutExceeded {
        waiting_for: &'static str,
        timeout: Duration,
    },

    /// FIN not acknowledged
    #[error("teardown failed: {0}")]
    TeardownFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DrtpError {
    /// Failures that end one connection attempt but leave the endpoint usable.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            DrtpError::MalformedHeader { .. }
                | DrtpError::HandshakeFailed(_)
                | DrtpError::TimeoutExceeded { .. }
                | DrtpError::TeardownFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DrtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_failures_are_not_connection_scoped() {
        let err = DrtpError::SinkUnavailable {
            path: PathBuf::from("/nonexistent/out.bin"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(!err.is_connection_scoped());
        assert!(err.to_string().contains("/nonexistent/out.bin"));
    }

    #[test]
    fn timeouts_are_connection_scoped() {
        let err = DrtpError::TimeoutExceeded {
            waiting_for: "SYN-ACK",
            timeout: Duration::from_millis(500),
        };
        assert!(err.is_connection_scoped());
        assert_eq!(
            err.to_string(),
            "no response within 500ms while waiting for SYN-ACK"
        );
    }
}
