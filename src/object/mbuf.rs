//! MBuf Chain
//!
//! The byte queue behind every socket endpoint. Data lives in a FIFO of
//! fixed-size buffers ("mbufs") so a large queue never needs one large
//! contiguous allocation.
//!
//! # Modes
//! - **Stream**: bytes are appended to the tail mbuf until it is full,
//!   reads drain across mbuf boundaries and may leave a remainder.
//! - **Datagram**: each write starts a fresh run of mbufs whose first mbuf
//!   records the packet length; a read consumes exactly one packet.
//!
//! ```text
//!  head                                         tail
//!  ┌────────────┐   ┌────────────┐   ┌────────────┐
//!  │ off ──▶ len│──▶│ 0  ──▶  len│──▶│ 0 ──▶ len  │  (room)
//!  └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! The chain is not synchronized; the owning endpoint's lock guards it.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cmp::min;

use crate::config::SocketConfig;
use crate::status::{Result, Status};
use crate::user::{UserInPtr, UserOutPtr};

/// One fixed-capacity buffer in the chain.
struct MBuf {
    /// Written bytes; capacity is the configured payload size.
    data: Vec<u8>,
    /// Read offset into `data`.
    off: usize,
    /// Datagram length if this mbuf starts a packet, otherwise 0.
    pkt_len: usize,
}

impl MBuf {
    /// Unread bytes.
    #[inline]
    fn len(&self) -> usize {
        self.data.len() - self.off
    }

    /// Free payload bytes at the end.
    #[inline]
    fn room(&self, payload: usize) -> usize {
        payload - self.data.len()
    }

    #[inline]
    fn unread(&self) -> &[u8] {
        &self.data[self.off..]
    }
}

/// FIFO of mbufs with a byte-count capacity.
pub struct MBufChain {
    mbufs: VecDeque<MBuf>,
    size: usize,
    capacity: usize,
    payload: usize,
}

impl MBufChain {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            mbufs: VecDeque::new(),
            size: 0,
            capacity: config.data_capacity,
            payload: config.mbuf_payload_size,
        }
    }

    /// Bytes currently queued.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maximum bytes the chain will hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size >= self.capacity
    }

    fn alloc_mbuf(&self) -> Result<MBuf> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.payload)
            .map_err(|_| Status::NoMemory)?;
        Ok(MBuf {
            data,
            off: 0,
            pkt_len: 0,
        })
    }

    /// Append up to `len` bytes from `src`, as many as fit.
    ///
    /// # Returns
    /// * `Ok(n)` - `n` bytes queued; `n < len` when the chain filled up or a
    ///   later part of `src` faulted
    /// * `Err(InvalidArgs)` - `src` faulted before anything was queued
    /// * `Err(NoMemory)` - no mbuf could be allocated
    pub fn write_stream(&mut self, src: UserInPtr<'_>, len: usize) -> Result<usize> {
        let budget = min(len, self.capacity.saturating_sub(self.size));
        let mut pos = 0;

        while pos < budget {
            let needs_mbuf = self.mbufs.back().map_or(true, |m| m.room(self.payload) == 0);
            if needs_mbuf {
                match self.alloc_mbuf() {
                    Ok(mbuf) => self.mbufs.push_back(mbuf),
                    Err(status) if pos == 0 => return Err(status),
                    Err(_) => break,
                }
            }

            let payload = self.payload;
            let Some(tail) = self.mbufs.back_mut() else {
                break;
            };
            let chunk = min(tail.room(payload), budget - pos);
            let start = tail.data.len();
            tail.data.resize(start + chunk, 0);
            if src.copy_array_from_user(&mut tail.data[start..], pos).is_err() {
                tail.data.truncate(start);
                if tail.data.is_empty() {
                    self.mbufs.pop_back();
                }
                log::warn!("mbuf: stream write faulted at offset {}", pos);
                if pos == 0 {
                    return Err(Status::InvalidArgs);
                }
                break;
            }

            pos += chunk;
            self.size += chunk;
        }

        Ok(pos)
    }

    /// Append one whole datagram of `len` bytes.
    ///
    /// Nothing is queued unless the entire datagram is.
    pub fn write_datagram(&mut self, src: UserInPtr<'_>, len: usize) -> Result<usize> {
        if len == 0 {
            return Err(Status::InvalidArgs);
        }
        if len > self.capacity {
            return Err(Status::OutOfRange);
        }
        if len + self.size > self.capacity {
            return Err(Status::ShouldWait);
        }

        let mut packet: VecDeque<MBuf> = VecDeque::new();
        let mut pos = 0;
        while pos < len {
            let mut mbuf = self.alloc_mbuf()?;
            let chunk = min(self.payload, len - pos);
            mbuf.data.resize(chunk, 0);
            if src.copy_array_from_user(&mut mbuf.data, pos).is_err() {
                log::warn!("mbuf: datagram write faulted at offset {}", pos);
                return Err(Status::InvalidArgs);
            }
            pos += chunk;
            packet.push_back(mbuf);
        }

        if let Some(first) = packet.front_mut() {
            first.pkt_len = len;
        }
        self.mbufs.append(&mut packet);
        self.size += len;
        Ok(len)
    }

    /// Dequeue into `dst`.
    ///
    /// Stream mode copies up to `len` bytes. Datagram mode copies at most
    /// `len` bytes of the head packet and discards the whole packet.
    /// Returns the number of bytes copied.
    pub fn read(&mut self, dst: &mut UserOutPtr<'_>, len: usize, datagram: bool) -> Result<usize> {
        if datagram {
            self.read_datagram(dst, len)
        } else {
            self.read_stream(dst, len)
        }
    }

    fn read_stream(&mut self, dst: &mut UserOutPtr<'_>, len: usize) -> Result<usize> {
        let mut pos = 0;
        while pos < len {
            let Some(head) = self.mbufs.front_mut() else {
                break;
            };
            let chunk = min(head.len(), len - pos);
            if dst.copy_array_to_user(&head.unread()[..chunk], pos).is_err() {
                log::warn!("mbuf: stream read faulted at offset {}", pos);
                if pos == 0 {
                    return Err(Status::InvalidArgs);
                }
                break;
            }
            head.off += chunk;
            pos += chunk;
            self.size -= chunk;
            if head.len() == 0 {
                self.mbufs.pop_front();
            }
        }
        Ok(pos)
    }

    fn read_datagram(&mut self, dst: &mut UserOutPtr<'_>, len: usize) -> Result<usize> {
        let Some(head) = self.mbufs.front() else {
            return Ok(0);
        };
        let pkt_len = head.pkt_len;
        let copy_len = min(len, pkt_len);

        let mut copied = 0;
        for mbuf in self.mbufs.iter() {
            if copied == copy_len {
                break;
            }
            let chunk = min(mbuf.len(), copy_len - copied);
            if dst.copy_array_to_user(&mbuf.unread()[..chunk], copied).is_err() {
                log::warn!("mbuf: datagram read faulted at offset {}", copied);
                return Err(Status::InvalidArgs);
            }
            copied += chunk;
        }

        let mut remaining = pkt_len;
        while remaining > 0 {
            let Some(mbuf) = self.mbufs.pop_front() else {
                break;
            };
            remaining -= min(mbuf.len(), remaining);
        }
        self.size -= pkt_len;

        Ok(copy_len)
    }
}

impl core::fmt::Debug for MBufChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MBufChain")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("mbufs", &self.mbufs.len())
            .finish()
    }
}
