//! Core types shared by the PHY kernels
//!
//! Every kernel in this crate works on fixed-size batches of [`LANES`]
//! independent lanes, one lane per subcarrier (or per independent matrix
//! problem for the Cholesky inverse). Batches are plain arrays owned by the
//! caller; kernels never allocate per call.
//!
//! ```text
//!   lane:    0    1    2    3   ...   15
//!          +----+----+----+----+-----+----+
//!   batch  | sc | sc | sc | sc | ... | sc |   16 subcarriers of one OFDM symbol
//!          +----+----+----+----+-----+----+
//!            ^ only the first nSc lanes (4, 8, 12 or 16) carry valid data
//! ```

use num_complex::Complex;

/// Number of lanes in one processing batch.
pub const LANES: usize = 16;

/// Subcarriers in one physical resource block.
pub const SUBCARRIERS_PER_PRB: usize = 12;

/// One value per lane.
pub type Lanes<T> = [T; LANES];

/// Fixed-point complex sample (I/Q as Q2.13).
pub type ComplexI16 = Complex<i16>;

/// Result type for PHY kernel operations
pub type PhyResult<T> = Result<T, PhyError>;

/// Errors reported at the kernel boundary.
///
/// The per-lane math itself is infallible; everything here is detected when
/// a request is built or before the first byte of output is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhyError {
    /// Unsupported modulation order, subcarrier count, layer count, DMRS
    /// setup, fixed-point format or LLR range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    /// Only reported when pivot checking is enabled on the Cholesky inverse.
    #[error("Matrix not positive definite: lane {lane}, column {column}")]
    NotPositiveDefinite { lane: usize, column: usize },
}

impl PhyError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PhyError::InvalidConfiguration(msg.into())
    }

    /// True for errors caused by an unsupported request configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, PhyError::InvalidConfiguration(_))
    }
}

/// Check that `buf` can hold `len` bytes starting at `offset`.
pub(crate) fn ensure_capacity(buf_len: usize, offset: usize, len: usize) -> PhyResult<()> {
    let expected = offset.saturating_add(len);
    if buf_len < expected {
        tracing::debug!(expected, actual = buf_len, "output buffer too short");
        return Err(PhyError::BufferTooShort {
            expected,
            actual: buf_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhyError::invalid("modulation order 3");
        assert_eq!(err.to_string(), "Invalid configuration: modulation order 3");
        assert!(err.is_configuration_error());

        let err = PhyError::BufferTooShort {
            expected: 64,
            actual: 32,
        };
        assert_eq!(err.to_string(), "Buffer too short: expected 64, got 32");
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_ensure_capacity() {
        assert!(ensure_capacity(64, 0, 64).is_ok());
        assert!(ensure_capacity(64, 32, 32).is_ok());
        assert_eq!(
            ensure_capacity(64, 33, 32),
            Err(PhyError::BufferTooShort {
                expected: 65,
                actual: 64
            })
        );
        // Offset near usize::MAX must not wrap
        assert!(ensure_capacity(64, usize::MAX, 1).is_err());
    }
}
