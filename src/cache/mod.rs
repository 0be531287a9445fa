//! Late-joiner caches
//!
//! A cache watches the packs flowing through a stream and keeps what a new
//! subscriber needs to start decoding: parameter sets or sequence headers,
//! plus (optionally) every pack since the last keyframe. `push_to` replays
//! that state into the subscriber's queue.

mod flv;
mod gop;
mod h264;
mod hevc;

pub use self::flv::FlvCache;
pub use gop::Gop;
pub use h264::H264Cache;
pub use hevc::HevcCache;

use crate::queue::PackQueue;

/// Keeps the packs a late subscriber needs
pub trait PackCache<T>: Send + Sync {
    /// Observe a pack flowing through the stream
    fn cache_pack(&self, pack: T);

    /// Replay the cached packs into `queue`, returning the bytes pushed
    fn push_to(&self, queue: &PackQueue<T>) -> usize;

    /// Forget everything
    fn reset(&self);
}

/// Cache for streams whose codec has no start-up state
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCache;

impl<T> PackCache<T> for EmptyCache {
    fn cache_pack(&self, _pack: T) {}

    fn push_to(&self, _queue: &PackQueue<T>) -> usize {
        0
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache() {
        let cache = EmptyCache;
        let queue = PackQueue::new();

        cache.cache_pack(1u32);
        assert_eq!(PackCache::<u32>::push_to(&cache, &queue), 0);
        assert!(queue.is_empty());
    }
}
