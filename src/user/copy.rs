//! Copy-in / Copy-out Helpers
//!
//! The platform layer resolves a user address range into one of these
//! pointers once it has validated the mapping. From then on the socket
//! core only needs memcpy-equivalent copies with a pass/fail result.
//!
//! The pointers carry the extent of the caller's buffer, so a request
//! to copy past the end is caught here rather than in the object.

use crate::status::Status;

/// A user copy touched memory outside the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFault;

impl From<CopyFault> for Status {
    fn from(_: CopyFault) -> Self {
        Status::InvalidArgs
    }
}

/// A caller buffer the kernel may read from.
#[derive(Debug, Clone, Copy)]
pub struct UserInPtr<'a> {
    buf: Option<&'a [u8]>,
}

impl<'a> UserInPtr<'a> {
    /// Wrap a validated caller buffer.
    #[inline]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf: Some(buf) }
    }

    /// The null user pointer.
    #[inline]
    pub const fn null() -> Self {
        Self { buf: None }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.buf.is_none()
    }

    /// Copy `dst.len()` bytes starting `offset` bytes into the buffer.
    ///
    /// # Returns
    /// * `Ok(())` - `dst` is filled
    /// * `Err(CopyFault)` - the pointer is null or the range overruns the buffer
    pub fn copy_array_from_user(&self, dst: &mut [u8], offset: usize) -> Result<(), CopyFault> {
        let buf = self.buf.ok_or(CopyFault)?;
        let end = offset.checked_add(dst.len()).ok_or(CopyFault)?;
        let src = buf.get(offset..end).ok_or(CopyFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// A caller buffer the kernel may write to.
#[derive(Debug)]
pub struct UserOutPtr<'a> {
    buf: Option<&'a mut [u8]>,
}

impl<'a> UserOutPtr<'a> {
    /// Wrap a validated caller buffer.
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf: Some(buf) }
    }

    /// The null user pointer.
    #[inline]
    pub const fn null() -> Self {
        Self { buf: None }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.buf.is_none()
    }

    /// Copy `src` into the buffer starting `offset` bytes in.
    ///
    /// An empty `src` always succeeds, even through a null pointer.
    pub fn copy_array_to_user(&mut self, src: &[u8], offset: usize) -> Result<(), CopyFault> {
        if src.is_empty() {
            return Ok(());
        }
        let buf = self.buf.as_deref_mut().ok_or(CopyFault)?;
        let end = offset.checked_add(src.len()).ok_or(CopyFault)?;
        let dst = buf.get_mut(offset..end).ok_or(CopyFault)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_in() {
        let src = [1u8, 2, 3, 4];
        let ptr = UserInPtr::new(&src);
        let mut dst = [0u8; 2];
        assert!(ptr.copy_array_from_user(&mut dst, 2).is_ok());
        assert_eq!(dst, [3, 4]);
    }

    #[test]
    fn test_copy_in_overrun() {
        let src = [1u8, 2, 3, 4];
        let ptr = UserInPtr::new(&src);
        let mut dst = [0u8; 3];
        assert_eq!(ptr.copy_array_from_user(&mut dst, 2), Err(CopyFault));
    }

    #[test]
    fn test_null_pointer() {
        let mut dst = [0u8; 1];
        assert_eq!(UserInPtr::null().copy_array_from_user(&mut dst, 0), Err(CopyFault));
        assert_eq!(UserOutPtr::null().copy_array_to_user(&[1], 0), Err(CopyFault));
        assert!(UserOutPtr::null().copy_array_to_user(&[], 0).is_ok());
    }

    #[test]
    fn test_overflowing_offset() {
        let mut buf = [0u8; 4];
        let mut ptr = UserOutPtr::new(&mut buf);
        assert_eq!(ptr.copy_array_to_user(&[1, 2], usize::MAX), Err(CopyFault));
    }

    #[test]
    fn test_fault_maps_to_invalid_args() {
        assert_eq!(Status::from(CopyFault), Status::InvalidArgs);
    }
}
