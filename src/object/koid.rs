//! Kernel Object Identifiers
//!
//! Koids are process-wide unique and never reused. Zero is reserved as
//! "no object" and the first koids are kept for kernel-internal objects.

use core::sync::atomic::{AtomicU64, Ordering};

/// Kernel object identifier.
pub type Koid = u64;

/// The invalid koid.
pub const KOID_INVALID: Koid = 0;

/// First koid handed to a dynamically created object.
pub const KOID_FIRST: Koid = 1024;

static NEXT_KOID: AtomicU64 = AtomicU64::new(KOID_FIRST);

/// Allocate a fresh koid.
#[inline]
pub fn generate() -> Koid {
    NEXT_KOID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_koids_are_unique_and_valid() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert!(a >= KOID_FIRST);
        assert_ne!(b, KOID_INVALID);
    }
}
