//! HEVC RTP packet cache

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Gop, PackCache};
use crate::codec::h264::FU_START;
use crate::codec::hevc::{is_irap, nal_type, NAL_AP, NAL_FU, NAL_MAX_NATIVE, NAL_PPS, NAL_SPS, NAL_VPS};
use crate::pack::Pack;
use crate::queue::PackQueue;
use crate::rtp::{Channel, Packet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PayloadKind {
    vps: bool,
    sps: bool,
    pps: bool,
    irap: bool,
}

impl PayloadKind {
    fn mark(&mut self, nal: u8) {
        if is_irap(nal) {
            self.irap = true;
            return;
        }
        match nal {
            NAL_VPS => self.vps = true,
            NAL_SPS => self.sps = true,
            NAL_PPS => self.pps = true,
            _ => {}
        }
    }

    fn of(payload: &[u8]) -> Self {
        let mut kind = Self::default();
        if payload.len() < 3 {
            return kind;
        }

        match nal_type(payload[0]) {
            NAL_FU => {
                if payload[2] & FU_START != 0 {
                    kind.mark(payload[2] & 0x3F);
                }
            }
            NAL_AP => {
                let mut off = 2;
                while off + 2 < payload.len() {
                    let size = u16::from_be_bytes([payload[off], payload[off + 1]]) as usize;
                    if size < 1 {
                        break;
                    }
                    off += 2;
                    kind.mark(nal_type(payload[off]));
                    off += size;
                }
            }
            t if t <= NAL_MAX_NATIVE => kind.mark(t),
            _ => {}
        }
        kind
    }
}

#[derive(Default)]
struct HevcCacheState {
    vps: Option<Arc<Packet>>,
    sps: Option<Arc<Packet>>,
    pps: Option<Arc<Packet>>,
    gop: Gop<Arc<Packet>>,
}

/// Keeps the latest VPS, SPS and PPS packets and the current GOP of an HEVC
/// RTP stream
pub struct HevcCache {
    cache_gop: bool,
    state: RwLock<HevcCacheState>,
}

impl HevcCache {
    pub fn new(cache_gop: bool) -> Self {
        Self {
            cache_gop,
            state: RwLock::new(HevcCacheState::default()),
        }
    }
}

impl PackCache<Arc<Packet>> for HevcCache {
    fn cache_pack(&self, packet: Arc<Packet>) {
        if packet.channel != Channel::Video {
            return;
        }
        let kind = packet
            .payload()
            .map(|p| PayloadKind::of(&p))
            .unwrap_or_default();

        let mut state = self.state.write();
        if kind.vps {
            state.vps = Some(packet);
            return;
        }
        if kind.sps {
            state.sps = Some(packet);
            return;
        }
        if kind.pps {
            state.pps = Some(packet);
            return;
        }

        if self.cache_gop {
            state.gop.push(packet, kind.irap);
        }
    }

    fn push_to(&self, queue: &PackQueue<Arc<Packet>>) -> usize {
        let state = self.state.read();
        let mut bytes = 0;

        for packet in [&state.vps, &state.sps, &state.pps].into_iter().flatten() {
            bytes += packet.size();
            queue.enqueue(Arc::clone(packet));
        }
        if self.cache_gop {
            bytes += state.gop.push_to(queue);
        }
        bytes
    }

    fn reset(&self) {
        *self.state.write() = HevcCacheState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::packet::rtp_body;

    fn video(seq: u16, payload: &[u8]) -> Arc<Packet> {
        Arc::new(Packet::new(Channel::Video, rtp_body(seq, 0, payload)).unwrap())
    }

    #[test]
    fn test_payload_kind() {
        assert!(PayloadKind::of(&[0x40, 0x01, 0x0C]).vps);
        assert!(PayloadKind::of(&[0x42, 0x01, 0x01]).sps);
        assert!(PayloadKind::of(&[0x44, 0x01, 0xC1]).pps);
        // IDR_W_RADL (19) and CRA (21)
        assert!(PayloadKind::of(&[0x26, 0x01, 0xAF]).irap);
        assert!(PayloadKind::of(&[0x2A, 0x01, 0xAF]).irap);
        // TRAIL_R
        assert_eq!(PayloadKind::of(&[0x02, 0x01, 0xD0]), PayloadKind::default());

        // FU start fragment of an IDR, then a middle fragment
        assert!(PayloadKind::of(&[0x62, 0x01, 0x80 | 19]).irap);
        assert!(!PayloadKind::of(&[0x62, 0x01, 19]).irap);
    }

    #[test]
    fn test_replay_order() {
        let cache = HevcCache::new(true);
        cache.cache_pack(video(1, &[0x26, 0x01, 0xAF]));
        cache.cache_pack(video(2, &[0x02, 0x01, 0xD0]));
        cache.cache_pack(video(3, &[0x44, 0x01, 0xC1]));
        cache.cache_pack(video(4, &[0x42, 0x01, 0x01]));
        cache.cache_pack(video(5, &[0x40, 0x01, 0x0C]));

        let queue = PackQueue::new();
        let bytes = cache.push_to(&queue);
        let seqs: Vec<u16> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|p| p.sequence_number())
            .collect();

        // VPS, SPS, PPS, then the GOP
        assert_eq!(seqs, [5, 4, 3, 1, 2]);
        assert_eq!(bytes, 5 * (4 + 12 + 3));
    }
}
