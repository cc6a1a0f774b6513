//! Kernel Objects
//!
//! The socket object and the pieces every kernel object is built from.
//!
//! # Design
//! - Objects are reference counted (`Arc`) and reached through [`Handle`]s
//! - Each object owns a signal bitmask observed by the wait subsystem
//! - Each object guards its own state with its own lock; there is no
//!   global object lock

pub mod handle;
pub mod koid;
pub mod mbuf;
pub mod signals;
pub mod socket;

pub use handle::{Handle, Rights};
pub use koid::Koid;
pub use signals::{ObserverId, Signals, StateObserver, StateTracker};
pub use socket::{ShareError, ShutdownOptions, Socket, SocketFlags};
