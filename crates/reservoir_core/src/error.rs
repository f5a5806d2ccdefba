//! # Pool Error Types
//!
//! All recoverable errors raised by the region and chunk pools.
//!
//! Handle misuse is always reported through [`PoolError`]. Internal invariant
//! corruption is not: the pools panic on those instead.

use thiserror::Error;

/// Errors that can occur while using a pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Region pool handle is unassigned, pending removal, or stale.
    #[error("invalid slot handle: index {index}, generation {generation}")]
    InvalidHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// Chunk pool id is out of range or not currently live.
    #[error("unknown chunk pool id: {0}")]
    UnknownId(u32),

    /// Chunk pool request larger than a single chunk.
    #[error("request of {requested} bytes exceeds chunk capacity of {capacity} bytes")]
    OversizedRequest {
        /// Requested size in bytes.
        requested: usize,
        /// Capacity of one chunk in bytes.
        capacity: usize,
    },

    /// Zero-byte regions cannot be assigned.
    #[error("cannot allocate an empty region")]
    EmptyRequest,

    /// Typed access to a region of the wrong size.
    #[error("region holds {actual} bytes, value needs {expected}")]
    SizeMismatch {
        /// Size of the value type in bytes.
        expected: usize,
        /// Size of the region in bytes.
        actual: usize,
    },

    /// A structural invariant of the pool does not hold.
    #[error("pool invariant violated: {0}")]
    InvariantViolation(String),

    /// The backing buffer could not be grown.
    #[error("buffer allocation of {requested} bytes failed")]
    AllocationFailed {
        /// Total buffer size that was requested.
        requested: u64,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure while saving or loading a pool image.
    #[error("i/o error: {0}")]
    Io(String),

    /// A saved pool image failed validation.
    #[error("corrupt pool image: {0}")]
    CorruptImage(String),
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PoolError::OversizedRequest {
            requested: 64,
            capacity: 32,
        };
        assert_eq!(
            err.to_string(),
            "request of 64 bytes exceeds chunk capacity of 32 bytes"
        );
        assert_eq!(PoolError::UnknownId(7).to_string(), "unknown chunk pool id: 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: PoolError = io.into();
        assert!(matches!(err, PoolError::Io(msg) if msg.contains("short read")));
    }
}
