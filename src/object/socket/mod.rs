//! Socket Kernel Object
//!
//! A socket is a pair of endpoints joined back to back. Bytes (or whole
//! datagrams) written on one endpoint are queued on the other, which also
//! carries the readiness signals describing that queue.
//!
//! # Structure
//! ```text
//!   Handle ──▶ ┌──────────────── Socket 0 ───────────────┐
//!              │ koid, flags (immutable)                 │
//!              │ state: StateTracker (leaf lock)         │
//!              │ inner: Mutex<{ peer ─────────────────┐  │
//!              │               data: MBufChain        │  │
//!              │               control_msg            │  │
//!              │               accept_queue           │  │
//!              │               read_disabled }>       │  │
//!              └──────────────────────────────────────┼──┘
//!                        ▲                            ▼
//!              ┌─────────┴──────── Socket 1 ─────────────┐
//!   Handle ──▶ │                 (mirror)                │
//!              └─────────────────────────────────────────┘
//! ```
//!
//! # Locking
//! - Each endpoint has its own `inner` lock; two endpoint locks are never
//!   held at the same time. Operations that affect the peer clone the peer
//!   reference under the local lock, release it, then enter the peer's
//!   own `*_self` method which takes the peer's lock.
//! - The signal bitmask lives in a [`StateTracker`] whose lock is a leaf, so
//!   an endpoint may update its peer's signals while holding its own lock.
//! - No `Arc<Socket>` or [`Handle`] is dropped while an endpoint lock is held.
//!
//! # Shutdown
//! Two sticky bits per endpoint. `WRITE_DISABLED` asserts immediately.
//! Read shutdown sets `read_disabled` at once, but `READ_DISABLED` only
//! asserts once the queue is empty, possibly from a later `read`.

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::cmp::min;
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

use super::handle::{Handle, Rights};
use super::koid::{self, Koid, KOID_INVALID};
use super::mbuf::MBufChain;
use super::signals::{ObserverId, Signals, StateObserver, StateTracker};
use crate::config::SocketConfig;
use crate::status::{Result, Status};
use crate::user::{UserInPtr, UserOutPtr};


bitflags! {
    /// Creation-time socket options. Fixed for the socket's lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SocketFlags: u32 {
        /// Preserve message boundaries.
        const DATAGRAM = 1 << 0;
        /// Carry a single-slot control message channel.
        const HAS_CONTROL = 1 << 1;
        /// Allow handles to be shared over the socket.
        const HAS_ACCEPT = 1 << 2;
    }
}

impl SocketFlags {
    /// Every bit `create` accepts.
    pub const CREATE_MASK: Self = Self::all();
}

bitflags! {
    /// Which directions `shutdown` turns off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShutdownOptions: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl ShutdownOptions {
    /// Parse the raw syscall argument.
    pub fn from_raw(how: u32) -> Result<Self> {
        Self::from_bits(how).ok_or(Status::InvalidArgs)
    }
}

/// A rejected [`Socket::share`]. The handle goes back to the caller.
#[derive(Debug)]
pub struct ShareError {
    pub status: Status,
    pub handle: Handle,
}

/// State guarded by the endpoint lock.
struct SocketInner {
    /// The other endpoint, until either side loses its last handle.
    peer: Option<Arc<Socket>>,
    peer_koid: Koid,
    /// Bytes written by the peer, waiting to be read here.
    data: MBufChain,
    /// Control slot buffer, present iff `HAS_CONTROL`.
    control_msg: Option<Vec<u8>>,
    /// Bytes pending in `control_msg`; 0 means the slot is free.
    control_msg_len: usize,
    /// Handle shared by the peer, waiting to be accepted.
    accept_queue: Option<Handle>,
    /// Sticky: set by local read shutdown or peer write shutdown.
    read_disabled: bool,
}

/// One endpoint of a socket pair.
pub struct Socket {
    koid: Koid,
    flags: SocketFlags,
    control_msg_size: usize,
    state: StateTracker,
    handle_count: AtomicU32,
    inner: Mutex<SocketInner>,
}

fn alloc_control_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| Status::NoMemory)?;
    buf.resize(size, 0);
    Ok(buf)
}

impl Socket {
    /// Create a socket pair with the default sizing.
    ///
    /// # Arguments
    /// * `flags` - raw `SocketFlags` bits
    ///
    /// # Returns
    /// Two handles with [`Rights::DEFAULT_SOCKET`], one per endpoint.
    pub fn create(flags: u32) -> Result<(Handle, Handle)> {
        Self::create_with_config(flags, &SocketConfig::default())
    }

    /// Create a socket pair with explicit sizing.
    ///
    /// Invalid flag bits are rejected before anything is allocated. If any
    /// allocation fails, everything allocated so far is released and
    /// `NoMemory` is returned.
    pub fn create_with_config(flags: u32, config: &SocketConfig) -> Result<(Handle, Handle)> {
        if flags & !SocketFlags::CREATE_MASK.bits() != 0 {
            return Err(Status::InvalidArgs);
        }
        let flags = SocketFlags::from_bits_retain(flags);
        if !config.is_valid() {
            return Err(Status::InvalidArgs);
        }

        let mut starting_signals = Signals::WRITABLE;
        if flags.contains(SocketFlags::HAS_ACCEPT) {
            starting_signals |= Signals::SHARE;
        }

        let (control0, control1) = if flags.contains(SocketFlags::HAS_CONTROL) {
            starting_signals |= Signals::CONTROL_WRITABLE;
            let control0 = alloc_control_buffer(config.control_msg_size)?;
            let control1 = alloc_control_buffer(config.control_msg_size)?;
            (Some(control0), Some(control1))
        } else {
            (None, None)
        };

        let socket0 = Arc::new(Self::new(starting_signals, flags, config, control0));
        let socket1 = Arc::new(Self::new(starting_signals, flags, config, control1));

        socket0.init(socket1.clone());
        socket1.init(socket0.clone());

        log::debug!(
            "socket: created pair {}/{} flags={:?}",
            socket0.koid,
            socket1.koid,
            flags
        );

        Ok((
            Handle::new(socket0, Rights::DEFAULT_SOCKET),
            Handle::new(socket1, Rights::DEFAULT_SOCKET),
        ))
    }

    fn new(
        starting_signals: Signals,
        flags: SocketFlags,
        config: &SocketConfig,
        control_msg: Option<Vec<u8>>,
    ) -> Self {
        Self {
            koid: koid::generate(),
            flags,
            control_msg_size: config.control_msg_size,
            state: StateTracker::new(starting_signals),
            handle_count: AtomicU32::new(0),
            inner: Mutex::new(SocketInner {
                peer: None,
                peer_koid: KOID_INVALID,
                data: MBufChain::new(config),
                control_msg,
                control_msg_len: 0,
                accept_queue: None,
                read_disabled: false,
            }),
        }
    }

    // Runs before either endpoint is reachable from another thread.
    fn init(&self, other: Arc<Socket>) {
        let mut inner = self.inner.lock();
        inner.peer_koid = other.koid;
        inner.peer = Some(other);
    }

    #[inline]
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// Koid of the peer endpoint, still reported after the peer is gone.
    pub fn related_koid(&self) -> Koid {
        self.inner.lock().peer_koid
    }

    #[inline]
    pub fn flags(&self) -> SocketFlags {
        self.flags
    }

    /// Current readiness signals.
    #[inline]
    pub fn signals(&self) -> Signals {
        self.state.signals()
    }

    /// Register a wait-subsystem observer on this endpoint's signals.
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) -> ObserverId {
        self.state.add_observer(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> Option<Arc<dyn StateObserver>> {
        self.state.remove_observer(id)
    }

    /// Whether the peer endpoint is still linked.
    pub fn has_peer(&self) -> bool {
        self.inner.lock().peer.is_some()
    }

    fn peer(&self) -> Result<Arc<Socket>> {
        self.inner.lock().peer.clone().ok_or(Status::PeerClosed)
    }

    pub(crate) fn increment_handle_count(&self) {
        self.handle_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns true if this dropped the last handle.
    pub(crate) fn decrement_handle_count(&self) -> bool {
        self.handle_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// The last handle is gone: detach from the peer and tell it.
    pub(crate) fn on_zero_handles(&self) {
        log::debug!("socket {}: zero handles", self.koid);

        let peer = self.inner.lock().peer.take();
        if let Some(peer) = peer {
            peer.on_peer_zero_handles();
        }
    }

    fn on_peer_zero_handles(&self) {
        let peer = {
            let mut inner = self.inner.lock();
            let peer = inner.peer.take();
            self.state
                .update_state(Signals::WRITABLE, Signals::PEER_CLOSED);
            peer
        };
        log::debug!("socket {}: peer closed", self.koid);
        drop(peer);
    }

    /// Assert or deassert user signals on this endpoint or its peer.
    ///
    /// Only bits in [`Signals::USER_ALL`] may be named.
    pub fn user_signal(&self, clear_mask: u32, set_mask: u32, peer: bool) -> Result<()> {
        let user = Signals::USER_ALL.bits();
        if (set_mask & !user) != 0 || (clear_mask & !user) != 0 {
            return Err(Status::InvalidArgs);
        }
        let clear_mask = Signals::from_bits_retain(clear_mask);
        let set_mask = Signals::from_bits_retain(set_mask);

        if !peer {
            self.state.update_state(clear_mask, set_mask);
            return Ok(());
        }

        let other = self.peer()?;
        other.user_signal_self(clear_mask, set_mask);
        Ok(())
    }

    fn user_signal_self(&self, clear_mask: Signals, set_mask: Signals) {
        self.state.update_state(clear_mask, set_mask);
    }

    /// Shut down reading and/or writing on this endpoint.
    ///
    /// Repeating an already-achieved shutdown is a no-op. The peer, if any,
    /// is told afterwards; local state is never rolled back.
    pub fn shutdown(&self, how: ShutdownOptions) -> Result<()> {
        log::trace!("socket {}: shutdown {:?}", self.koid, how);

        let shutdown_read = how.contains(ShutdownOptions::READ);
        let shutdown_write = how.contains(ShutdownOptions::WRITE);

        let other = {
            let mut inner = self.inner.lock();

            let mut want = Signals::empty();
            if shutdown_read {
                want |= Signals::READ_DISABLED;
            }
            if shutdown_write {
                want |= Signals::WRITE_DISABLED;
            }
            let have = self
                .state
                .signals()
                .intersection(Signals::READ_DISABLED | Signals::WRITE_DISABLED);
            if want == have {
                return Ok(());
            }

            let mut clear_mask = Signals::empty();
            let mut set_mask = Signals::empty();
            if shutdown_read {
                inner.read_disabled = true;
                if inner.data.is_empty() {
                    set_mask |= Signals::READ_DISABLED;
                }
            }
            if shutdown_write {
                clear_mask |= Signals::WRITABLE;
                set_mask |= Signals::WRITE_DISABLED;
            }
            self.state.update_state(clear_mask, set_mask);

            inner.peer.clone()
        };

        if let Some(other) = other {
            other.shutdown_other(how);
        }
        Ok(())
    }

    // The peer shut down in `how`; mirror the effect on this end.
    fn shutdown_other(&self, how: ShutdownOptions) {
        let mut inner = self.inner.lock();
        let mut clear_mask = Signals::empty();
        let mut set_mask = Signals::empty();

        if how.contains(ShutdownOptions::READ) {
            clear_mask |= Signals::WRITABLE;
            set_mask |= Signals::WRITE_DISABLED;
        }
        if how.contains(ShutdownOptions::WRITE) {
            // Whatever is queued can still be read; READ_DISABLED waits
            // for the drain if there is any.
            inner.read_disabled = true;
            if inner.data.is_empty() {
                set_mask |= Signals::READ_DISABLED;
            }
        }

        self.state.update_state(clear_mask, set_mask);
    }

    /// Write `len` bytes from `src` to the peer.
    ///
    /// # Returns
    /// * `Ok(n)` - bytes queued; stream writes may be short, datagram
    ///   writes are all-or-nothing
    /// * `Err(PeerClosed)` - no peer
    /// * `Err(BadState)` - writing is disabled on this end
    /// * `Err(InvalidArgs)` - `len` does not fit 32 bits, or `src` faulted
    /// * `Err(ShouldWait)` - the peer's queue is full, or a datagram does not
    ///   fit in the remaining space. In the latter case `WRITABLE` stays
    ///   asserted, since the queue is not full.
    pub fn write(&self, src: UserInPtr<'_>, len: usize) -> Result<usize> {
        log::trace!("socket {}: write len={}", self.koid, len);

        let other = {
            let inner = self.inner.lock();
            let Some(other) = inner.peer.clone() else {
                return Err(Status::PeerClosed);
            };
            if self.state.signals().contains(Signals::WRITE_DISABLED) {
                return Err(Status::BadState);
            }
            other
        };

        if len == 0 {
            return Ok(0);
        }
        if u32::try_from(len).is_err() {
            return Err(Status::InvalidArgs);
        }

        other.write_self(src, len)
    }

    fn write_self(&self, src: UserInPtr<'_>, len: usize) -> Result<usize> {
        let mut inner = self.inner.lock();

        if inner.data.is_full() {
            return Err(Status::ShouldWait);
        }

        let was_empty = inner.data.is_empty();
        let written = if self.flags.contains(SocketFlags::DATAGRAM) {
            inner.data.write_datagram(src, len)?
        } else {
            inner.data.write_stream(src, len)?
        };

        if written > 0 && was_empty {
            self.state.update_state(Signals::empty(), Signals::READABLE);
        }

        if inner.data.is_full() {
            if let Some(other) = inner.peer.as_ref() {
                other.state.update_state(Signals::WRITABLE, Signals::empty());
            }
        }

        Ok(written)
    }

    /// Read up to `len` bytes into `dst`.
    ///
    /// With a null `dst` and `len == 0`, reports the number of queued bytes
    /// without consuming anything. Datagram sockets consume exactly one
    /// datagram per call, copying at most `len` bytes of it.
    ///
    /// # Returns
    /// * `Ok(n)` - bytes copied
    /// * `Err(InvalidArgs)` - `len` does not fit 32 bits, or `dst` faulted
    /// * `Err(PeerClosed)` - empty and the peer is gone
    /// * `Err(BadState)` - empty and reading is disabled
    /// * `Err(ShouldWait)` - empty for now
    pub fn read(&self, mut dst: UserOutPtr<'_>, len: usize) -> Result<usize> {
        log::trace!("socket {}: read len={}", self.koid, len);

        let mut inner = self.inner.lock();

        if dst.is_null() && len == 0 {
            return Ok(inner.data.size());
        }

        if u32::try_from(len).is_err() {
            return Err(Status::InvalidArgs);
        }

        if inner.data.is_empty() {
            if inner.peer.is_none() {
                return Err(Status::PeerClosed);
            }
            if inner.read_disabled {
                return Err(Status::BadState);
            }
            return Err(Status::ShouldWait);
        }

        let was_full = inner.data.is_full();
        let size_before = inner.data.size();

        let copied = inner.data.read(
            &mut dst,
            len,
            self.flags.contains(SocketFlags::DATAGRAM),
        )?;

        if inner.data.is_empty() {
            let mut set_mask = Signals::empty();
            if inner.read_disabled {
                set_mask |= Signals::READ_DISABLED;
            }
            self.state.update_state(Signals::READABLE, set_mask);
        }

        if was_full && inner.data.size() < size_before {
            if let Some(other) = inner.peer.as_ref() {
                other.state.update_state(Signals::empty(), Signals::WRITABLE);
            }
        }

        Ok(copied)
    }

    /// Send one control message to the peer.
    ///
    /// # Returns
    /// * `Err(BadState)` - the socket has no control channel
    /// * `Err(InvalidArgs)` - empty message, or `src` faulted
    /// * `Err(OutOfRange)` - message larger than the control slot
    /// * `Err(PeerClosed)` - no peer
    /// * `Err(ShouldWait)` - the peer's slot is occupied
    pub fn write_control(&self, src: UserInPtr<'_>, len: usize) -> Result<()> {
        if !self.flags.contains(SocketFlags::HAS_CONTROL) {
            return Err(Status::BadState);
        }
        if len == 0 {
            return Err(Status::InvalidArgs);
        }
        if len > self.control_msg_size {
            return Err(Status::OutOfRange);
        }

        let other = self.peer()?;
        other.write_control_self(src, len)
    }

    fn write_control_self(&self, src: UserInPtr<'_>, len: usize) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.control_msg_len != 0 {
            return Err(Status::ShouldWait);
        }

        let buf = inner
            .control_msg
            .as_mut()
            .ok_or(Status::BadState)?
            .get_mut(..len)
            .ok_or(Status::OutOfRange)?;
        if src.copy_array_from_user(buf, 0).is_err() {
            log::warn!("socket {}: control write faulted", self.koid);
            return Err(Status::InvalidArgs);
        }

        inner.control_msg_len = len;

        self.state
            .update_state(Signals::empty(), Signals::CONTROL_READABLE);
        if let Some(other) = inner.peer.as_ref() {
            other
                .state
                .update_state(Signals::CONTROL_WRITABLE, Signals::empty());
        }

        Ok(())
    }

    /// Take the pending control message, copying at most `len` bytes.
    ///
    /// A message longer than `len` is truncated; the rest is discarded.
    pub fn read_control(&self, mut dst: UserOutPtr<'_>, len: usize) -> Result<usize> {
        if !self.flags.contains(SocketFlags::HAS_CONTROL) {
            return Err(Status::BadState);
        }

        let mut inner = self.inner.lock();

        if inner.control_msg_len == 0 {
            return Err(Status::ShouldWait);
        }

        let copy_len = min(inner.control_msg_len, len);
        let buf = inner.control_msg.as_ref().ok_or(Status::BadState)?;
        if dst.copy_array_to_user(&buf[..copy_len], 0).is_err() {
            log::warn!("socket {}: control read faulted", self.koid);
            return Err(Status::InvalidArgs);
        }

        inner.control_msg_len = 0;
        self.state
            .update_state(Signals::CONTROL_READABLE, Signals::empty());
        if let Some(other) = inner.peer.as_ref() {
            other
                .state
                .update_state(Signals::empty(), Signals::CONTROL_WRITABLE);
        }

        Ok(copy_len)
    }

    /// Check that `to_send` may be shared over this socket.
    ///
    /// Accept-capable sockets, this endpoint and its peer are refused so
    /// that sharing can never form a loop.
    pub fn check_shareable(&self, to_send: &Socket) -> Result<()> {
        let inner = self.inner.lock();
        let is_peer = inner
            .peer
            .as_deref()
            .is_some_and(|peer| ptr::eq(peer, to_send));
        if to_send.flags.contains(SocketFlags::HAS_ACCEPT) || ptr::eq(to_send, self) || is_peer {
            return Err(Status::BadState);
        }
        Ok(())
    }

    /// Hand `handle` to the peer's accept slot.
    ///
    /// On failure the handle is returned inside the error.
    pub fn share(&self, handle: Handle) -> core::result::Result<(), ShareError> {
        log::trace!("socket {}: share {}", self.koid, handle.koid());

        if !self.flags.contains(SocketFlags::HAS_ACCEPT) {
            return Err(ShareError {
                status: Status::NotSupported,
                handle,
            });
        }
        if let Err(status) = self.check_shareable(handle.socket()) {
            return Err(ShareError { status, handle });
        }

        let other = match self.peer() {
            Ok(other) => other,
            Err(status) => return Err(ShareError { status, handle }),
        };
        other.share_self(handle)
    }

    fn share_self(&self, handle: Handle) -> core::result::Result<(), ShareError> {
        let mut inner = self.inner.lock();

        if inner.accept_queue.is_some() {
            return Err(ShareError {
                status: Status::ShouldWait,
                handle,
            });
        }

        inner.accept_queue = Some(handle);

        self.state.update_state(Signals::empty(), Signals::ACCEPT);
        if let Some(other) = inner.peer.as_ref() {
            other.state.update_state(Signals::SHARE, Signals::empty());
        }

        Ok(())
    }

    /// Take the handle the peer shared.
    pub fn accept(&self) -> Result<Handle> {
        if !self.flags.contains(SocketFlags::HAS_ACCEPT) {
            return Err(Status::NotSupported);
        }

        let mut inner = self.inner.lock();

        let handle = inner.accept_queue.take().ok_or(Status::ShouldWait)?;

        self.state.update_state(Signals::ACCEPT, Signals::empty());
        if let Some(other) = inner.peer.as_ref() {
            other.state.update_state(Signals::empty(), Signals::SHARE);
        }

        Ok(handle)
    }
}

impl core::fmt::Debug for Socket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Socket")
            .field("koid", &self.koid)
            .field("flags", &self.flags)
            .field("signals", &self.state.signals())
            .finish()
    }
}
