//! Error taxonomy for the auto-feature engine.
//!
//! Every fallible operation on a `Library`, `Manager` or `Controller` returns
//! [`AflResult`]. The variants of [`AflError`] map one-to-one onto the non-success
//! values of [`StatusCode`], so a numeric code can always be recovered from an
//! error (and an error rebuilt from a code plus a message).
//!
//! ## Error Categories
//!
//! - **Structural**: `AccessDenied`, `NotInitialized` - the object graph or the
//!   library lifecycle forbids the call.
//! - **Argument**: `InvalidParameter`, `BufferTooSmall`, `InvalidImageFormat` -
//!   the caller supplied something the engine cannot use.
//! - **Capability**: `NotSupported` - the controller type has no such feature.
//! - **Runtime**: `Busy`, `Error` - an overlapping call or an internal fault,
//!   including any use of a controller handle that has been destroyed.
//!
//! None of these are retried internally.

use std::fmt;
use thiserror::Error;

// =============================================================================
// Status Codes
// =============================================================================

/// Numeric status codes reported by every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    /// The operation completed.
    Success = 0,
    /// Unexpected internal fault.
    Error = 1,
    /// The library has been shut down (or was never initialized).
    NotInitialized = 2,
    /// Bad argument, out-of-range value or duplicate.
    InvalidParameter = 3,
    /// Structural violation of ownership rules.
    AccessDenied = 4,
    /// An overlapping call was rejected.
    Busy = 5,
    /// A caller-provided buffer is shorter than the data to be returned.
    BufferTooSmall = 6,
    /// The image handed to processing cannot be evaluated.
    InvalidImageFormat = 7,
    /// The feature is not available for this controller type.
    NotSupported = 8,
}

impl StatusCode {
    /// Translate a raw numeric code. Unknown values yield `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let code = match raw {
            0 => StatusCode::Success,
            1 => StatusCode::Error,
            2 => StatusCode::NotInitialized,
            3 => StatusCode::InvalidParameter,
            4 => StatusCode::AccessDenied,
            5 => StatusCode::Busy,
            6 => StatusCode::BufferTooSmall,
            7 => StatusCode::InvalidImageFormat,
            8 => StatusCode::NotSupported,
            _ => return None,
        };
        Some(code)
    }

    /// Raw numeric value.
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Symbolic name of the code.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::Error => "ERROR",
            StatusCode::NotInitialized => "NOT_INITIALIZED",
            StatusCode::InvalidParameter => "INVALID_PARAMETER",
            StatusCode::AccessDenied => "ACCESS_DENIED",
            StatusCode::Busy => "BUSY",
            StatusCode::BufferTooSmall => "BUFFER_TOO_SMALL",
            StatusCode::InvalidImageFormat => "INVALID_IMAGE_FORMAT",
            StatusCode::NotSupported => "NOT_SUPPORTED",
        }
    }

    /// Symbolic name for a raw code, `"UNKNOWN_STATUS"` when it is not one of ours.
    pub fn name_of_raw(raw: u32) -> &'static str {
        Self::from_raw(raw).map_or("UNKNOWN_STATUS", Self::name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Convenience alias for results using the engine error type.
pub type AflResult<T> = std::result::Result<T, AflError>;

/// Primary error type of the auto-feature engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AflError {
    /// Unexpected internal fault.
    ///
    /// Also reported for any call through a controller handle whose
    /// controller has been destroyed, and for lookups of a controller type
    /// the manager does not hold.
    #[error("Error: {0}")]
    Error(String),

    /// The owning library has been shut down.
    #[error("Library is not initialized")]
    NotInitialized,

    /// Bad argument.
    ///
    /// Covers values outside the closed `[min, max]` interval reported by the
    /// matching range query, malformed rectangles, weighted ROIs smaller than
    /// the minimum size, and adding a second controller of an existing type.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Structural violation, e.g. destroying a controller still owned by a
    /// manager or adding it to a second manager.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// An overlapping call was rejected instead of queued.
    ///
    /// **Error Type**: Transient - the caller should drop the frame and try
    /// again with the next one.
    #[error("Busy: {0}")]
    Busy(String),

    /// A caller-provided buffer is too short for the requested list.
    ///
    /// `required` tells the caller how large the buffer has to be.
    #[error("Buffer too small: {required} entries required, {provided} provided")]
    BufferTooSmall {
        /// Number of entries the result needs.
        required: usize,
        /// Number of entries the caller supplied.
        provided: usize,
    },

    /// The processed image cannot be evaluated by a controller.
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),

    /// The feature is not available for this controller type.
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl AflError {
    /// Status code corresponding to this error.
    pub fn code(&self) -> StatusCode {
        match self {
            AflError::Error(_) => StatusCode::Error,
            AflError::NotInitialized => StatusCode::NotInitialized,
            AflError::InvalidParameter(_) => StatusCode::InvalidParameter,
            AflError::AccessDenied(_) => StatusCode::AccessDenied,
            AflError::Busy(_) => StatusCode::Busy,
            AflError::BufferTooSmall { .. } => StatusCode::BufferTooSmall,
            AflError::InvalidImageFormat(_) => StatusCode::InvalidImageFormat,
            AflError::NotSupported(_) => StatusCode::NotSupported,
        }
    }

    /// Rebuild an error from a status code. `Success` has no error and yields `None`.
    ///
    /// `BufferTooSmall` carries no sizes through this path, both are reported as zero.
    pub fn from_code(code: StatusCode, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let error = match code {
            StatusCode::Success => return None,
            StatusCode::Error => AflError::Error(message),
            StatusCode::NotInitialized => AflError::NotInitialized,
            StatusCode::InvalidParameter => AflError::InvalidParameter(message),
            StatusCode::AccessDenied => AflError::AccessDenied(message),
            StatusCode::Busy => AflError::Busy(message),
            StatusCode::BufferTooSmall => AflError::BufferTooSmall {
                required: 0,
                provided: 0,
            },
            StatusCode::InvalidImageFormat => AflError::InvalidImageFormat(message),
            StatusCode::NotSupported => AflError::NotSupported(message),
        };
        Some(error)
    }

    /// Shorthand for a `NotSupported` error naming the feature.
    pub fn not_supported(feature: impl fmt::Display) -> Self {
        AflError::NotSupported(format!("{feature} is not supported by this controller"))
    }

    /// Whether the failed call may succeed if simply repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AflError::Busy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_codes_are_stable() {
        assert_eq!(StatusCode::Success.as_raw(), 0);
        assert_eq!(StatusCode::BufferTooSmall.as_raw(), 6);
        assert_eq!(StatusCode::NotSupported.as_raw(), 8);
        assert_eq!(StatusCode::from_raw(5), Some(StatusCode::Busy));
        assert_eq!(StatusCode::from_raw(9), None);
        assert_eq!(StatusCode::name_of_raw(42), "UNKNOWN_STATUS");
        assert_eq!(StatusCode::name_of_raw(2), "NOT_INITIALIZED");
    }

    #[test]
    fn test_error_code_mapping() {
        for raw in 1..=8 {
            let code = StatusCode::from_raw(raw).unwrap();
            let err = AflError::from_code(code, "x").unwrap();
            assert_eq!(err.code(), code);
        }
        assert!(AflError::from_code(StatusCode::Success, "ok").is_none());
    }

    #[test]
    fn test_display() {
        let err = AflError::BufferTooSmall {
            required: 4,
            provided: 1,
        };
        assert_eq!(
            err.to_string(),
            "Buffer too small: 4 entries required, 1 provided"
        );
        assert!(AflError::Busy("process".into()).is_transient());
        assert!(!AflError::NotInitialized.is_transient());
    }
}
