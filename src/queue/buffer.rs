//! Reusable pack buffer
//!
//! ```text
//!   slots: [ None | None | p2 | p3 | p4 | None | None ]
//!                         ^off           ^end         ^capacity
//! ```
//!
//! Reads advance `off`, writes advance `end`. When the tail runs out of room
//! the live region is slid back to the front if it fits in half the
//! capacity, otherwise the slots are reallocated at `2 * capacity + n`.
//! Every consumed or vacated slot is set to `None`, so a pack is released as
//! soon as its last reader takes it and is never observed twice.

/// Growable, reusable FIFO of packs
#[derive(Debug)]
pub struct PackBuffer<T> {
    slots: Vec<Option<T>>,
    off: usize,
    end: usize,
}

impl<T> PackBuffer<T> {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            off: 0,
            end: 0,
        }
    }

    /// Create a buffer with room for `capacity` packs
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            off: 0,
            end: 0,
        }
    }

    /// Number of unread packs
    pub fn len(&self) -> usize {
        self.end - self.off
    }

    /// Whether there is nothing left to read
    pub fn is_empty(&self) -> bool {
        self.end <= self.off
    }

    /// Allocated slot count
    pub fn cap(&self) -> usize {
        self.slots.len()
    }

    /// Unread packs in order
    pub fn packs(&self) -> impl Iterator<Item = &T> {
        self.slots[self.off..self.end].iter().flatten()
    }

    /// Drop every unread pack and rewind
    pub fn reset(&mut self) {
        for slot in &mut self.slots[self.off..self.end] {
            *slot = None;
        }
        self.off = 0;
        self.end = 0;
    }

    /// Make room for `n` more packs without changing the length
    pub fn grow(&mut self, n: usize) {
        let m = self.grow_for(n);
        self.end = m;
    }

    /// Append one pack
    pub fn write_pack(&mut self, pack: T) {
        let i = self.grow_for(1);
        self.slots[i] = Some(pack);
    }

    /// Append a run of packs, returns how many were written
    pub fn write(&mut self, packs: &[T]) -> usize
    where
        T: Clone,
    {
        let i = self.grow_for(packs.len());
        for (slot, pack) in self.slots[i..].iter_mut().zip(packs) {
            *slot = Some(pack.clone());
        }
        packs.len()
    }

    /// Take the next pack
    pub fn read_pack(&mut self) -> Option<T> {
        if self.is_empty() {
            self.reset();
            return None;
        }

        let pack = self.slots[self.off].take();
        self.off += 1;
        pack
    }

    /// Move up to `max` packs into `out`, returns how many were moved
    pub fn read(&mut self, out: &mut Vec<T>, max: usize) -> usize {
        if self.is_empty() {
            self.reset();
            return 0;
        }

        let n = max.min(self.len());
        out.extend(
            self.slots[self.off..self.off + n]
                .iter_mut()
                .filter_map(Option::take),
        );
        self.off += n;
        n
    }

    /// Discard up to `n` packs, returns how many were discarded
    pub fn skip(&mut self, n: usize) -> usize {
        if self.is_empty() {
            self.reset();
            return 0;
        }

        let n = n.min(self.len());
        for slot in &mut self.slots[self.off..self.off + n] {
            *slot = None;
        }
        self.off += n;
        n
    }

    /// Reserve `n` slots at the tail, returns the index of the first one
    fn grow_for(&mut self, n: usize) -> usize {
        let m = self.len();
        if m == 0 && self.off != 0 {
            self.reset();
        }

        if n <= self.cap() - self.end {
            let i = self.end;
            self.end += n;
            return i;
        }

        let c = self.cap();
        if m + n <= c / 2 {
            // Slide live packs down; the consumed prefix is already None
            self.slots[..self.end].rotate_left(self.off);
            for slot in &mut self.slots[m..self.end] {
                *slot = None;
            }
        } else {
            let new_cap = 2 * c + n;
            let mut slots = Vec::with_capacity(new_cap);
            slots.extend(self.slots[self.off..self.end].iter_mut().map(Option::take));
            slots.resize_with(new_cap, || None);
            self.slots = slots;
        }

        self.off = 0;
        self.end = m + n;
        m
    }
}

impl<T> Default for PackBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_write_then_read_in_order() {
        let mut buf = PackBuffer::new();
        for i in 0..10 {
            buf.write_pack(i);
        }
        assert_eq!(buf.len(), 10);

        for i in 0..10 {
            assert_eq!(buf.read_pack(), Some(i));
        }
        assert_eq!(buf.read_pack(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bulk_write_and_read() {
        let mut buf = PackBuffer::new();
        assert_eq!(buf.write(&[1, 2, 3, 4, 5]), 5);

        let mut out = Vec::new();
        assert_eq!(buf.read(&mut out, 3), 3);
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(buf.packs().copied().collect::<Vec<_>>(), vec![4, 5]);

        assert_eq!(buf.read(&mut out, 10), 2);
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
        assert_eq!(buf.read(&mut out, 1), 0);
    }

    #[test]
    fn test_slides_before_reallocating() {
        let mut buf = PackBuffer::with_capacity(8);
        for i in 0..8 {
            buf.write_pack(i);
        }
        // Consume 6, 2 live packs fit in half the capacity
        for _ in 0..6 {
            buf.read_pack();
        }

        buf.write_pack(8);
        assert_eq!(buf.cap(), 8);
        assert_eq!(buf.packs().copied().collect::<Vec<_>>(), vec![6, 7, 8]);
    }

    #[test]
    fn test_reallocates_when_live_data_is_large() {
        let mut buf = PackBuffer::with_capacity(4);
        for i in 0..4 {
            buf.write_pack(i);
        }

        buf.write_pack(4);
        assert_eq!(buf.cap(), 9);
        assert_eq!(buf.packs().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_consumed_pack_is_released() {
        let pack = Arc::new(vec![0u8; 64]);
        let mut buf = PackBuffer::new();
        buf.write_pack(Arc::clone(&pack));
        buf.write_pack(Arc::new(vec![1u8]));
        assert_eq!(Arc::strong_count(&pack), 2);

        let taken = buf.read_pack();
        drop(taken);
        // The buffer no longer holds a reference to the consumed pack
        assert_eq!(Arc::strong_count(&pack), 1);
    }

    #[test]
    fn test_skip_releases_packs() {
        let pack = Arc::new(1);
        let mut buf = PackBuffer::new();
        buf.write(&[Arc::clone(&pack), Arc::clone(&pack), Arc::new(2)]);
        assert_eq!(Arc::strong_count(&pack), 3);

        assert_eq!(buf.skip(2), 2);
        assert_eq!(Arc::strong_count(&pack), 1);
        assert_eq!(buf.read_pack().map(|p| *p), Some(2));
        assert_eq!(buf.skip(5), 0);
    }

    #[test]
    fn test_reset_releases_unread() {
        let pack = Arc::new(7);
        let mut buf = PackBuffer::new();
        buf.write_pack(Arc::clone(&pack));
        buf.reset();

        assert!(buf.is_empty());
        assert_eq!(Arc::strong_count(&pack), 1);
    }

    #[test]
    fn test_grow_keeps_length() {
        let mut buf: PackBuffer<u32> = PackBuffer::new();
        buf.write_pack(1);
        buf.grow(16);

        assert_eq!(buf.len(), 1);
        assert!(buf.cap() >= 17);
        assert_eq!(buf.read_pack(), Some(1));
    }
}
