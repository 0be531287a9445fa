//! FLV tag cache

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Gop, PackCache};
use crate::flv::FlvTag;
use crate::pack::Pack;
use crate::queue::PackQueue;

#[derive(Default)]
struct FlvCacheState {
    metadata: Option<Arc<FlvTag>>,
    video_sequence_header: Option<Arc<FlvTag>>,
    audio_sequence_header: Option<Arc<FlvTag>>,
    gop: Gop<Arc<FlvTag>>,
}

/// Keeps metadata, sequence headers and the current GOP of an FLV stream
///
/// On replay the header tags are restamped with the timestamp of the first
/// GOP tag (0 without a GOP) so players do not see time jump backwards.
pub struct FlvCache {
    cache_gop: bool,
    state: RwLock<FlvCacheState>,
}

impl FlvCache {
    pub fn new(cache_gop: bool) -> Self {
        Self {
            cache_gop,
            state: RwLock::new(FlvCacheState::default()),
        }
    }
}

impl PackCache<Arc<FlvTag>> for FlvCache {
    fn cache_pack(&self, tag: Arc<FlvTag>) {
        let mut state = self.state.write();

        if tag.is_metadata() {
            state.metadata = Some(tag);
            return;
        }
        if tag.is_avc_sequence_header() {
            state.video_sequence_header = Some(tag);
            return;
        }
        if tag.is_aac_sequence_header() {
            state.audio_sequence_header = Some(tag);
            return;
        }

        if self.cache_gop {
            let keyframe = tag.is_keyframe();
            state.gop.push(tag, keyframe);
        }
    }

    fn push_to(&self, queue: &PackQueue<Arc<FlvTag>>) -> usize {
        let state = self.state.read();
        let init_timestamp = state.gop.first().map(|t| t.timestamp).unwrap_or(0);

        let headers = [
            &state.metadata,
            &state.video_sequence_header,
            &state.audio_sequence_header,
        ];
        let mut bytes = 0;
        for header in headers.into_iter().flatten() {
            let tag = Arc::new(header.with_timestamp(init_timestamp));
            bytes += tag.size();
            queue.enqueue(tag);
        }

        bytes + state.gop.push_to(queue)
    }

    fn reset(&self) {
        *self.state.write() = FlvCacheState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn metadata() -> Arc<FlvTag> {
        Arc::new(FlvTag::script(0, Bytes::from_static(b"meta")))
    }

    fn video(ts: u32, first: u8) -> Arc<FlvTag> {
        Arc::new(FlvTag::video(ts, Bytes::from(vec![first, 0x01, 0, 0, 0, 0xAA])))
    }

    fn drain(queue: &PackQueue<Arc<FlvTag>>) -> Vec<Arc<FlvTag>> {
        std::iter::from_fn(|| queue.try_dequeue()).collect()
    }

    #[test]
    fn test_headers_restamped_to_gop_start() {
        let cache = FlvCache::new(true);
        cache.cache_pack(metadata());
        cache.cache_pack(Arc::new(FlvTag::video(0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]))));
        cache.cache_pack(Arc::new(FlvTag::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]))));
        cache.cache_pack(video(4000, 0x17));
        cache.cache_pack(video(4040, 0x27));

        let queue = PackQueue::new();
        let bytes = cache.push_to(&queue);
        let tags = drain(&queue);

        assert_eq!(tags.len(), 5);
        assert!(tags[0].is_metadata());
        assert!(tags[1].is_avc_sequence_header());
        assert!(tags[2].is_aac_sequence_header());
        assert!(tags[..3].iter().all(|t| t.timestamp == 4000));
        assert_eq!(tags[4].timestamp, 4040);
        assert_eq!(bytes, tags.iter().map(|t| t.size()).sum::<usize>());
    }

    #[test]
    fn test_gop_starts_at_keyframe() {
        let cache = FlvCache::new(true);
        cache.cache_pack(video(0, 0x27));
        cache.cache_pack(video(40, 0x17));
        cache.cache_pack(video(80, 0x27));
        cache.cache_pack(Arc::new(FlvTag::audio(90, Bytes::from_static(&[0xAF, 0x01, 1]))));

        let queue = PackQueue::new();
        cache.push_to(&queue);
        let stamps: Vec<u32> = drain(&queue).iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, [40, 80, 90]);
    }

    #[test]
    fn test_without_gop_cache() {
        let cache = FlvCache::new(false);
        cache.cache_pack(metadata());
        cache.cache_pack(video(40, 0x17));

        let queue = PackQueue::new();
        cache.push_to(&queue);
        let tags = drain(&queue);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].timestamp, 0);
    }

    #[test]
    fn test_reset() {
        let cache = FlvCache::new(true);
        cache.cache_pack(metadata());
        cache.cache_pack(video(40, 0x17));
        cache.reset();

        let queue = PackQueue::new();
        assert_eq!(cache.push_to(&queue), 0);
        assert!(queue.is_empty());
    }
}
