//! Fixed-capacity storage with a logical length
//!
//! The storage never grows or shrinks. `len()` tracks how much of it holds
//! valid data; bytes past `len()` are indeterminate until written.

use std::fmt;

/// Capacity-bounded byte buffer
///
/// Not internally locked: the owner (the device) serializes access.
///
/// # Example
///
/// ```
/// use chardev::BoundedBuffer;
///
/// let mut buffer = BoundedBuffer::new(8);
/// let window = buffer.window_mut(0, 5).unwrap();
/// window.copy_from_slice(b"hello");
/// buffer.extend_to(5);
///
/// assert_eq!(buffer.len(), 5);
/// assert_eq!(buffer.readable_at(1, 3), b"ell");
/// ```
pub struct BoundedBuffer {
    storage: Box<[u8]>,
    used: usize,
}

impl BoundedBuffer {
    /// Create a zero-filled buffer of the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Fixed capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Logical length of valid data
    #[must_use]
    pub fn len(&self) -> usize {
        self.used
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// The valid region, `storage[..len()]`
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.used]
    }

    /// Up to `max` valid bytes starting at `offset`
    ///
    /// Empty when `offset` is at or past `len()`.
    #[must_use]
    pub fn readable_at(&self, offset: u64, max: usize) -> &[u8] {
        let Some(start) = self.index(offset).filter(|&start| start < self.used) else {
            return &[];
        };
        let end = start + max.min(self.used - start);
        &self.storage[start..end]
    }

    /// Writable window of up to `max` bytes starting at `offset`
    ///
    /// Returns `None` when `offset` is at or past the capacity. Writing into
    /// the window does not change `len()`; call [`Self::extend_to`] after.
    pub fn window_mut(&mut self, offset: u64, max: usize) -> Option<&mut [u8]> {
        let capacity = self.capacity();
        let start = self.index(offset).filter(|&start| start < capacity)?;
        let end = start + max.min(capacity - start);
        Some(&mut self.storage[start..end])
    }

    /// Grow the logical length to `end` (never shrinks, clamped to capacity)
    pub fn extend_to(&mut self, end: usize) {
        self.used = self.used.max(end.min(self.capacity()));
    }

    /// Zero the whole storage and forget all data
    pub fn clear(&mut self) {
        self.storage.fill(0);
        self.used = 0;
    }

    fn index(&self, offset: u64) -> Option<usize> {
        usize::try_from(offset).ok()
    }
}

impl fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundedBuffer(len={}, capacity={})", self.used, self.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, data: &[u8]) -> BoundedBuffer {
        let mut buffer = BoundedBuffer::new(capacity);
        buffer.window_mut(0, data.len()).unwrap().copy_from_slice(data);
        buffer.extend_to(data.len());
        buffer
    }

    #[test]
    fn test_new_buffer_is_empty_and_zeroed() {
        let buffer = BoundedBuffer::new(16);
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.as_slice(), b"");
        assert!(buffer.storage.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_readable_at_clamps_to_len() {
        let buffer = filled(16, b"hello world");
        assert_eq!(buffer.readable_at(0, 100), b"hello world");
        assert_eq!(buffer.readable_at(6, 3), b"wor");
        assert_eq!(buffer.readable_at(11, 4), b"");
        assert_eq!(buffer.readable_at(u64::MAX, 4), b"");
    }

    #[test]
    fn test_window_mut_clamps_to_capacity() {
        let mut buffer = BoundedBuffer::new(8);
        assert_eq!(buffer.window_mut(5, 10).map(|w| w.len()), Some(3));
        assert!(buffer.window_mut(8, 1).is_none());
        assert!(buffer.window_mut(100, 1).is_none());
    }

    #[test]
    fn test_extend_to_never_shrinks() {
        let mut buffer = filled(8, b"abcdef");
        buffer.extend_to(2);
        assert_eq!(buffer.len(), 6);
        buffer.extend_to(50);
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn test_clear_zeroes_storage() {
        let mut buffer = filled(8, b"abcdef");
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.storage.iter().all(|&b| b == 0));
    }
}
