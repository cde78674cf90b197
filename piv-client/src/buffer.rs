//! Owned byte buffer that wipes itself on drop
//!
//! Every secret this crate touches (PINs, PUKs, management keys, private
//! key components, shared secrets) lives in a [`SecretBuffer`] or in a
//! `zeroize::Zeroizing` temporary. Debug and Display never reveal the
//! contents, only the length.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned bytes guaranteed to be zeroed when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBuffer(Vec<u8>);

impl SecretBuffer {
    /// Take ownership of `bytes`. The original allocation is the one that
    /// gets wiped; callers must not keep copies.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// A buffer of `len` zero bytes, for staged writes.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for SecretBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl AsRef<[u8]> for SecretBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroize_clears_contents() {
        let mut buf = SecretBuffer::from(vec![0xAA; 32]);
        buf.zeroize();
        assert!(buf.as_slice().is_empty() || buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn debug_hides_contents() {
        let buf = SecretBuffer::from(vec![0x31, 0x32, 0x33]);
        let rendered = format!("{buf:?}");
        assert_eq!(rendered, "SecretBuffer(3 bytes)");
        assert!(!rendered.contains("31"));
    }

    #[test]
    fn zeroed_builds_all_zero() {
        let buf = SecretBuffer::zeroed(8);
        assert_eq!(buf.len(), 8);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }
}
