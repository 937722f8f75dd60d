use crate::error::AllocationError;

/// Largest buffer the table format can address.
pub(crate) const MAX_BUFFER_SIZE: usize = i32::MAX as usize;

/// Growable byte buffer that is written from the end toward the front.
///
/// Live data occupies `bytes[head..]`. Positions handed out to callers are measured from
/// the end of the buffer, so they stay valid when the buffer grows and its contents move.
pub(crate) struct DownwardBuffer {
    bytes: Vec<u8>,
    head: usize,
    initial_capacity: usize,
    limit: usize,
}

impl DownwardBuffer {
    /// Creates an empty buffer. Nothing is allocated until the first write.
    pub fn new(initial_capacity: usize, limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            head: 0,
            initial_capacity: initial_capacity.max(1),
            limit: limit.min(MAX_BUFFER_SIZE),
        }
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() - self.head
    }

    /// Bytes currently reserved, written or not.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The written bytes, front to back.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.bytes[self.head..]
    }

    /// Drops all written bytes but keeps the allocation.
    pub fn clear(&mut self) {
        self.head = self.bytes.len();
    }

    /// Makes sure `additional` bytes can be written without reallocating.
    ///
    /// On failure the buffer is left untouched.
    pub fn reserve(&mut self, additional: usize) -> Result<(), AllocationError> {
        if additional <= self.head {
            return Ok(());
        }

        let used = self.len();
        let needed = used
            .checked_add(additional)
            .ok_or(AllocationError::new(usize::MAX, self.limit))?;
        if needed > self.limit {
            return Err(AllocationError::new(needed, self.limit));
        }

        let new_capacity = self
            .bytes
            .len()
            .saturating_mul(2)
            .max(self.initial_capacity)
            .max(needed)
            .min(self.limit);

        let mut grown = Vec::new();
        grown
            .try_reserve_exact(new_capacity)
            .map_err(|_| AllocationError::new(new_capacity, self.limit))?;
        grown.resize(new_capacity - used, 0);
        grown.extend_from_slice(self.data());

        self.head = new_capacity - used;
        self.bytes = grown;
        Ok(())
    }

    /// Claims `len` bytes in front of the written data and returns them.
    ///
    /// The returned bytes may hold stale data from before a [`clear`](Self::clear).
    pub fn claim(&mut self, len: usize) -> Result<&mut [u8], AllocationError> {
        self.reserve(len)?;
        self.head -= len;
        Ok(&mut self.bytes[self.head..self.head + len])
    }

    /// Writes `src` in front of the written data.
    pub fn push(&mut self, src: &[u8]) -> Result<(), AllocationError> {
        self.claim(src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Writes `len` zero bytes in front of the written data.
    pub fn push_zeros(&mut self, len: usize) -> Result<(), AllocationError> {
        self.claim(len)?.fill(0);
        Ok(())
    }

    /// Returns `len` written bytes starting at `position`, measured from the end.
    ///
    /// # Panics
    ///
    /// Panics if the range is not part of the written data.
    pub fn at_mut(&mut self, position: usize, len: usize) -> &mut [u8] {
        let start = self.bytes.len() - position;
        &mut self.bytes[start..start + len]
    }
}

/// Number of padding bytes needed so that `len` becomes a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub(crate) fn padding_bytes(len: usize, alignment: usize) -> usize {
    (!len).wrapping_add(1) & (alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_writes_front_to_back_order() {
        let mut buf = DownwardBuffer::new(4, MAX_BUFFER_SIZE);
        buf.push(&[3, 4]).unwrap();
        buf.push(&[1, 2]).unwrap();
        assert_eq!(buf.data(), &[1, 2, 3, 4]);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_growth_preserves_data() {
        let mut buf = DownwardBuffer::new(2, MAX_BUFFER_SIZE);
        for i in 0..100u8 {
            buf.push(&[i]).unwrap();
        }
        let expected: Vec<u8> = (0..100u8).rev().collect();
        assert_eq!(buf.data(), expected.as_slice());
        assert!(buf.capacity() >= 100);
    }

    #[test]
    fn test_positions_survive_growth() {
        let mut buf = DownwardBuffer::new(2, MAX_BUFFER_SIZE);
        buf.push(&[0xAA, 0xBB]).unwrap();
        let position = buf.len();
        buf.push(&[0; 64]).unwrap();
        assert_eq!(buf.at_mut(position, 2), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_clear_keeps_allocation() {
        let mut buf = DownwardBuffer::new(16, MAX_BUFFER_SIZE);
        buf.push(&[1; 10]).unwrap();
        let capacity = buf.capacity();

        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), capacity);

        buf.push(&[2; 10]).unwrap();
        assert_eq!(buf.capacity(), capacity);
        assert_eq!(buf.data(), &[2; 10]);
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut buf = DownwardBuffer::new(8, 16);
        buf.push(&[0; 16]).unwrap();

        let err = buf.push(&[0]).unwrap_err();
        assert_eq!(err.requested, 17);
        assert_eq!(err.limit, 16);
        // Failed pushes leave the data untouched.
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn test_push_zeros_overwrites_stale_bytes() {
        let mut buf = DownwardBuffer::new(8, MAX_BUFFER_SIZE);
        buf.push(&[0xFF; 8]).unwrap();
        buf.clear();
        buf.push_zeros(8).unwrap();
        assert_eq!(buf.data(), &[0; 8]);
    }

    #[test]
    fn test_padding_bytes() {
        assert_eq!(padding_bytes(0, 4), 0);
        assert_eq!(padding_bytes(1, 4), 3);
        assert_eq!(padding_bytes(6, 4), 2);
        assert_eq!(padding_bytes(9, 8), 7);
        assert_eq!(padding_bytes(5, 1), 0);
    }
}
