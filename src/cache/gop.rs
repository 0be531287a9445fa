//! Group of pictures buffer

use crate::pack::Pack;
use crate::queue::PackQueue;

/// Packs since the most recent keyframe
///
/// Always starts with a keyframe: a keyframe resets the buffer, a
/// non-keyframe is only kept once a keyframe has been seen.
#[derive(Debug)]
pub struct Gop<T> {
    packs: Vec<T>,
    size: usize,
}

impl<T: Pack + Clone> Gop<T> {
    pub fn new() -> Self {
        Self {
            packs: Vec::new(),
            size: 0,
        }
    }

    /// Add a pack; returns false when a non-keyframe arrives before any keyframe
    pub fn push(&mut self, pack: T, keyframe: bool) -> bool {
        if keyframe {
            self.clear();
        } else if self.packs.is_empty() {
            return false;
        }

        self.size += pack.size();
        self.packs.push(pack);
        true
    }

    pub fn clear(&mut self) {
        self.packs.clear();
        self.size = 0;
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Total bytes held
    pub fn size(&self) -> usize {
        self.size
    }

    /// The keyframe that opened the group
    pub fn first(&self) -> Option<&T> {
        self.packs.first()
    }

    /// Enqueue the group in order, returning the bytes pushed
    pub fn push_to(&self, queue: &PackQueue<T>) -> usize {
        queue.push_all(self.packs.iter().cloned());
        self.size
    }
}

impl<T: Pack + Clone> Default for Gop<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pack(n: usize) -> Bytes {
        Bytes::from(vec![0u8; n])
    }

    #[test]
    fn test_requires_keyframe_first() {
        let mut gop = Gop::new();

        assert!(!gop.push(pack(10), false));
        assert!(gop.is_empty());

        assert!(gop.push(pack(100), true));
        assert!(gop.push(pack(10), false));
        assert_eq!(gop.len(), 2);
        assert_eq!(gop.size(), 110);
    }

    #[test]
    fn test_keyframe_resets() {
        let mut gop = Gop::new();
        gop.push(pack(100), true);
        gop.push(pack(10), false);
        gop.push(pack(10), false);

        gop.push(pack(50), true);
        assert_eq!(gop.len(), 1);
        assert_eq!(gop.size(), 50);
        assert_eq!(gop.first().map(|p| p.len()), Some(50));
    }

    #[test]
    fn test_push_to_keeps_order() {
        let mut gop = Gop::new();
        gop.push(pack(3), true);
        gop.push(pack(1), false);
        gop.push(pack(2), false);

        let queue = PackQueue::new();
        assert_eq!(gop.push_to(&queue), 6);

        let lens: Vec<usize> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|p| p.len())
            .collect();
        assert_eq!(lens, [3, 1, 2]);
        // Replay does not consume the group
        assert_eq!(gop.len(), 3);
    }
}
