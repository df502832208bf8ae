//! Thunk error handling
//!
//! Errors reported by the collaborators the bridge depends on. None of them
//! reach a caller of the public entry points; they turn each one into a
//! [`fatal`] abort.

use core::fmt;

/// Thunk error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkError {
    /// The page allocator could not satisfy a low-memory request
    AllocationFailed,

    /// The page allocator returned memory above the requested ceiling
    AboveCeiling,

    /// The interrupt controller rejected a query or mode change
    ControllerFailed(&'static str),

    /// The mode-switch primitive reported a buffer sizing that cannot be reserved
    InvalidSizing,

    /// A call was attempted on a context that was never prepared
    NotInitialized,
}

impl ThunkError {
    /// Static description of the error
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllocationFailed => "Low memory allocation failed",
            Self::AboveCeiling => "Allocation lies above the low memory ceiling",
            Self::ControllerFailed(_) => "Interrupt controller request failed",
            Self::InvalidSizing => "Invalid thunk buffer sizing",
            Self::NotInitialized => "Thunk context not initialized",
        }
    }
}

impl fmt::Display for ThunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControllerFailed(what) => write!(f, "{}: {}", self.as_str(), what),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Result type for thunk collaborators
pub type Result<T> = core::result::Result<T, ThunkError>;

/// Log the diagnostic for an unrecoverable infrastructure failure and stop
#[cold]
#[track_caller]
pub(crate) fn fatal(operation: &'static str, error: ThunkError) -> ! {
    log::error!("{} failed: {}", operation, error);
    panic!("{} failed: {}", operation, error)
}

/// Unwrap a collaborator result or abort with [`fatal`]
pub(crate) trait OrAbort<T> {
    /// Unwrap the value, aborting with `operation` as context on error
    fn or_abort(self, operation: &'static str) -> T;
}

impl<T> OrAbort<T> for Result<T> {
    #[track_caller]
    fn or_abort(self, operation: &'static str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fatal(operation, error),
        }
    }
}
