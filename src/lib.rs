//! PantherOS Socket Object
//!
//! Paired, bidirectional stream/datagram endpoints for the PantherOS
//! microkernel.
//!
//! # Overview
//! - A socket is created as two linked endpoints; each holds a handle-counted
//!   reference to the other until its last handle goes away
//! - Writes on one endpoint queue data on the other
//! - Readiness is published as signal bits; blocking is left to the wait
//!   subsystem, which observes those bits
//! - Optional single-slot control channel and handle-sharing mailbox
//!
//! # Concurrency
//! - No operation blocks; `Status::ShouldWait` is the backpressure contract
//! - One lock per endpoint, never nested with the peer's lock
//!
//! # Out of scope
//! - Syscall marshalling and rights enforcement on syscall entry
//! - Address space setup; user buffers arrive as [`user::UserInPtr`] /
//!   [`user::UserOutPtr`] already resolved by the platform layer

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod object;
pub mod status;
pub mod user;

pub use config::SocketConfig;
pub use object::{
    Handle, Koid, ObserverId, Rights, ShareError, ShutdownOptions, Signals, Socket, SocketFlags,
    StateObserver,
};
pub use status::{Result, Status};
pub use user::{UserInPtr, UserOutPtr};
