//! Handles and Rights
//!
//! A [`Handle`] is what a process actually holds: a counted reference to a
//! socket endpoint plus the rights that reference grants.
//!
//! # Lifecycle
//! ```text
//!  Handle::new ──▶ handle_count += 1
//!  duplicate   ──▶ handle_count += 1   (rights may only shrink)
//!  drop        ──▶ handle_count -= 1 ──(reaches 0)──▶ Socket::on_zero_handles
//! ```
//!
//! The endpoint itself may outlive its last handle (its peer, or a pending
//! share, can still hold an `Arc` to it), but once the count reaches zero
//! it detaches from its peer and is never reachable by a caller again.

use alloc::sync::Arc;
use bitflags::bitflags;

use super::koid::Koid;
use super::socket::Socket;
use crate::status::{Result, Status};

bitflags! {
    /// Operations a handle permits.
    ///
    /// When duplicating a handle, rights can only be reduced, never increased.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// May be duplicated.
        const DUPLICATE = 1 << 0;
        /// May be moved to another process or shared over a socket.
        const TRANSFER = 1 << 1;
        /// May read data and control messages.
        const READ = 1 << 2;
        /// May write data and control messages.
        const WRITE = 1 << 3;
        /// May assert user signals on the object.
        const SIGNAL = 1 << 4;
        /// May assert user signals on the object's peer.
        const SIGNAL_PEER = 1 << 5;
    }
}

impl Rights {
    /// Rights handed out with a freshly created socket pair.
    pub const DEFAULT_SOCKET: Self = Self::DUPLICATE
        .union(Self::TRANSFER)
        .union(Self::READ)
        .union(Self::WRITE)
        .union(Self::SIGNAL)
        .union(Self::SIGNAL_PEER);
}

/// A counted, rights-carrying reference to a socket endpoint.
#[derive(Debug)]
pub struct Handle {
    socket: Arc<Socket>,
    rights: Rights,
}

impl Handle {
    /// Create a handle and count it against the endpoint.
    pub(crate) fn new(socket: Arc<Socket>, rights: Rights) -> Self {
        socket.increment_handle_count();
        Self { socket, rights }
    }

    /// The endpoint this handle refers to.
    #[inline]
    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    /// Rights granted by this handle.
    #[inline]
    pub fn rights(&self) -> Rights {
        self.rights
    }

    /// Check if this handle has all of the specified rights.
    #[inline]
    pub fn has_rights(&self, required: Rights) -> bool {
        self.rights.contains(required)
    }

    /// Koid of the referenced endpoint.
    #[inline]
    pub fn koid(&self) -> Koid {
        self.socket.koid()
    }

    /// Create a second handle to the same endpoint with reduced rights.
    ///
    /// # Returns
    /// * `Err(BadState)` - this handle lacks `DUPLICATE`
    /// * `Err(InvalidArgs)` - `new_rights` is not a subset of this handle's rights
    pub fn duplicate(&self, new_rights: Rights) -> Result<Self> {
        if !self.has_rights(Rights::DUPLICATE) {
            return Err(Status::BadState);
        }
        if !self.rights.contains(new_rights) {
            return Err(Status::InvalidArgs);
        }
        Ok(Self::new(self.socket.clone(), new_rights))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.socket.decrement_handle_count() {
            self.socket.on_zero_handles();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_socket_rights() {
        let rights = Rights::DEFAULT_SOCKET;
        assert!(rights.contains(Rights::READ | Rights::WRITE));
        assert!(rights.contains(Rights::DUPLICATE | Rights::TRANSFER));
        assert!(rights.contains(Rights::SIGNAL | Rights::SIGNAL_PEER));
        assert_eq!(rights, Rights::all());
    }

    #[test]
    fn test_last_handle_closes_endpoint() {
        let (h0, h1) = Socket::create(0).unwrap();
        let dup = h0.duplicate(Rights::READ).unwrap();
        drop(h0);
        assert!(h1.socket().has_peer());
        drop(dup);
        assert!(!h1.socket().has_peer());
    }
}
