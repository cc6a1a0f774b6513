//! User Memory Copy
//!
//! Typed, nullable views of caller buffers handed to kernel objects.
//!
//! # Security Principles
//! - Objects never touch caller memory except through these types
//! - Every copy is bounds-checked and reports a fault instead of panicking
//! - A fault leaves the kernel-side state of the copy unspecified; callers
//!   treat it as "nothing transferred"

mod copy;

pub use copy::{CopyFault, UserInPtr, UserOutPtr};
