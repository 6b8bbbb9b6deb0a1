//! Reference-counted byte buffer with copy-on-write semantics.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A reference-counted, immutable byte buffer.
///
/// This is the virtual machine's only runtime value type: programs, stack
/// items and witness arguments are all raw byte strings whose boolean or
/// integer interpretation is contextual (see [`crate::types::value`]).
///
/// Wraps `Arc<Vec<u8>>` so that `DUP`, `PICK` and the full-stack clone done
/// for predicate recursion are cheap pointer copies. Mutations trigger
/// copy-on-write via `Arc::make_mut`.
#[derive(Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    /// Creates a new buffer from any type convertible to `Vec<u8>`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    /// Creates a new buffer from an existing `Vec<u8>`.
    pub fn from_vec(v: Vec<u8>) -> Self {
        Self(Arc::new(v))
    }

    /// Returns the number of bytes in the buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the buffer contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Copies the buffer contents into a new `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns a mutable reference to the underlying vector.
    ///
    /// Clones the data if other references exist (copy-on-write).
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    /// Appends bytes to the buffer, cloning if necessary.
    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.make_mut().extend_from_slice(s);
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes(")?;
        for byte in self.as_slice() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl PartialEq<[u8]> for Bytes {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Bytes {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_slice() == other
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

impl<const N: usize> From<&[u8; N]> for Bytes {
    fn from(arr: &[u8; N]) -> Self {
        Self::new(arr.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_storage() {
        let a = Bytes::new(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.as_slice().as_ptr(), b.as_slice().as_ptr());
    }

    #[test]
    fn make_mut_copies_on_write() {
        let a = Bytes::new(vec![1, 2, 3]);
        let mut b = a.clone();
        b.make_mut().push(4);
        assert_eq!(a, [1, 2, 3]);
        assert_eq!(b, [1, 2, 3, 4]);
    }

    #[test]
    fn extend_from_slice_appends() {
        let mut a = Bytes::new(vec![1]);
        a.extend_from_slice(&[2, 3]);
        assert_eq!(a, [1, 2, 3]);
    }

    #[test]
    fn deref_gives_slice_ops() {
        let a = Bytes::new(vec![9, 8, 7]);
        assert_eq!(a.len(), 3);
        assert_eq!(a[1], 8);
        assert!(!a.is_empty());
        assert!(Bytes::default().is_empty());
    }
}
