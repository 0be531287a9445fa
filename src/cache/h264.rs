//! H.264 RTP packet cache

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Gop, PackCache};
use crate::codec::h264::{
    nal_type, FU_START, NAL_FU_A, NAL_FU_B, NAL_IDR, NAL_MTAP16, NAL_MTAP24, NAL_PPS, NAL_SPS,
    NAL_STAP_A, NAL_STAP_B,
};
use crate::pack::Pack;
use crate::queue::PackQueue;
use crate::rtp::{Channel, Packet};

/// What a video packet carries, as far as the cache cares
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PayloadKind {
    sps: bool,
    pps: bool,
    idr: bool,
}

impl PayloadKind {
    fn mark(&mut self, nal: u8) {
        match nal {
            NAL_SPS => self.sps = true,
            NAL_PPS => self.pps = true,
            NAL_IDR => self.idr = true,
            _ => {}
        }
    }

    fn of(payload: &[u8]) -> Self {
        let mut kind = Self::default();
        if payload.len() < 3 {
            return kind;
        }

        match nal_type(payload[0]) {
            NAL_STAP_A | NAL_STAP_B | NAL_MTAP16 | NAL_MTAP24 => {
                let mut off = 1;
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
            NAL_FU_A | NAL_FU_B => {
                // Only the start fragment carries the NAL type of interest
                if payload[1] & FU_START != 0 {
                    kind.mark(nal_type(payload[1]));
                }
            }
            t => kind.mark(t),
        }
        kind
    }
}

#[derive(Default)]
struct H264CacheState {
    sps: Option<Arc<Packet>>,
    pps: Option<Arc<Packet>>,
    gop: Gop<Arc<Packet>>,
}

/// Keeps the latest SPS and PPS packets and the current GOP of an H.264
/// RTP stream
pub struct H264Cache {
    cache_gop: bool,
    state: RwLock<H264CacheState>,
}

impl H264Cache {
    pub fn new(cache_gop: bool) -> Self {
        Self {
            cache_gop,
            state: RwLock::new(H264CacheState::default()),
        }
    }
}

impl PackCache<Arc<Packet>> for H264Cache {
    fn cache_pack(&self, packet: Arc<Packet>) {
        if packet.channel != Channel::Video {
            return;
        }
        let kind = packet
            .payload()
            .map(|p| PayloadKind::of(&p))
            .unwrap_or_default();

        let mut state = self.state.write();
        if kind.sps {
            state.sps = Some(packet);
            return;
        }
        if kind.pps {
            state.pps = Some(packet);
            return;
        }

        if self.cache_gop {
            state.gop.push(packet, kind.idr);
        }
    }

    fn push_to(&self, queue: &PackQueue<Arc<Packet>>) -> usize {
        let state = self.state.read();
        let mut bytes = 0;

        for packet in [&state.sps, &state.pps].into_iter().flatten() {
            bytes += packet.size();
            queue.enqueue(Arc::clone(packet));
        }
        if self.cache_gop {
            bytes += state.gop.push_to(queue);
        }
        bytes
    }

    fn reset(&self) {
        *self.state.write() = H264CacheState::default();
    }
}
