//! Socket Sizing Configuration
//!
//! The defaults mirror the kernel's fixed allocation sizes. The embedding
//! kernel may shrink them (e.g. for memory-constrained boards), and tests
//! use small capacities to reach the full-queue paths quickly.

/// Bytes allocated per mbuf, header included.
pub const MBUF_MALLOC_SIZE: usize = 2048;

/// Bytes of mbuf bookkeeping (link, offset, length, packet length).
pub const MBUF_HEADER_SIZE: usize = 32;

/// Usable payload bytes per mbuf.
pub const MBUF_PAYLOAD_SIZE: usize = MBUF_MALLOC_SIZE - MBUF_HEADER_SIZE;

/// Default number of mbufs worth of data a socket may buffer.
pub const DEFAULT_MBUF_COUNT: usize = 128;

/// Size of the single-slot control message buffer.
pub const CONTROL_MSG_SIZE: usize = 1024;

/// Per-socket sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// Maximum number of bytes buffered in the receive queue.
    pub data_capacity: usize,
    /// Payload bytes per mbuf.
    pub mbuf_payload_size: usize,
    /// Capacity of the control message slot.
    pub control_msg_size: usize,
}

impl SocketConfig {
    /// Kernel defaults.
    pub const fn new() -> Self {
        Self {
            data_capacity: DEFAULT_MBUF_COUNT * MBUF_PAYLOAD_SIZE,
            mbuf_payload_size: MBUF_PAYLOAD_SIZE,
            control_msg_size: CONTROL_MSG_SIZE,
        }
    }

    /// Override the queue capacity.
    pub const fn with_data_capacity(mut self, data_capacity: usize) -> Self {
        self.data_capacity = data_capacity;
        self
    }

    /// Override the mbuf payload size.
    pub const fn with_mbuf_payload_size(mut self, mbuf_payload_size: usize) -> Self {
        self.mbuf_payload_size = mbuf_payload_size;
        self
    }

    /// Override the control slot size.
    pub const fn with_control_msg_size(mut self, control_msg_size: usize) -> Self {
        self.control_msg_size = control_msg_size;
        self
    }

    /// Check that the sizes describe a usable socket.
    pub const fn is_valid(&self) -> bool {
        self.data_capacity > 0 && self.mbuf_payload_size > 0 && self.control_msg_size > 0
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketConfig::default();
        assert_eq!(config.mbuf_payload_size, 2016);
        assert_eq!(config.data_capacity, 128 * 2016);
        assert_eq!(config.control_msg_size, 1024);
        assert!(config.is_valid());
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        assert!(!SocketConfig::new().with_data_capacity(0).is_valid());
        assert!(!SocketConfig::new().with_mbuf_payload_size(0).is_valid());
    }
}
