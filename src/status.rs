//! Kernel Object Status Codes
//!
//! Every socket operation reports failure through [`Status`].
//!
//! # Conventions
//! - Conditions are detected synchronously and returned to the caller
//! - Nothing is retried internally
//! - `ShouldWait` is a retry contract, not a fault: the caller waits on
//!   the readiness signals before trying again

use core::fmt;

/// Status codes returned by kernel object operations.
///
/// The discriminants match the raw values handed back across the
/// syscall boundary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation not supported by this object.
    NotSupported = -2,
    /// Allocation failed.
    NoMemory = -4,
    /// Malformed argument (bad flags, bad length, faulting buffer).
    InvalidArgs = -10,
    /// Argument outside the supported range.
    OutOfRange = -14,
    /// Operation incompatible with the current object state.
    BadState = -20,
    /// Transient condition; retry once the relevant signal asserts.
    ShouldWait = -22,
    /// The other end of the object is gone.
    PeerClosed = -24,
}

impl Status {
    /// Raw value for the syscall return register.
    #[inline]
    pub const fn into_raw(self) -> i32 {
        self as i32
    }

    /// Whether retrying after a signal transition can succeed.
    #[inline]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::ShouldWait)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSupported => write!(f, "operation not supported"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::InvalidArgs => write!(f, "invalid argument"),
            Self::OutOfRange => write!(f, "argument out of range"),
            Self::BadState => write!(f, "bad state"),
            Self::ShouldWait => write!(f, "should wait"),
            Self::PeerClosed => write!(f, "peer closed"),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Status>;
