//! Fragmentation-unit reassembly shared by the H.264 and HEVC extractors

use bytes::{BufMut, Bytes, BytesMut};

/// Fragments of one NAL unit collected so far
#[derive(Debug, Default)]
pub(crate) struct Fragments {
    parts: Vec<Bytes>,
    last_seq: u16,
    rtp_time: u32,
}

impl Fragments {
    pub fn new() -> Self {
        Self {
            parts: Vec::with_capacity(16),
            last_seq: 0,
            rtp_time: 0,
        }
    }

    /// Begin a new unit, discarding anything buffered
    pub fn start(&mut self, seq: u16, rtp_time: u32, data: Bytes) {
        self.parts.clear();
        self.parts.push(data);
        self.last_seq = seq;
        self.rtp_time = rtp_time;
    }

    /// Append a continuation fragment
    ///
    /// Returns false and drops the unit when nothing was started or a
    /// sequence number is missing.
    pub fn push(&mut self, seq: u16, data: Bytes) -> bool {
        if self.parts.is_empty() || self.last_seq != seq.wrapping_sub(1) {
            self.parts.clear();
            return false;
        }
        self.parts.push(data);
        self.last_seq = seq;
        true
    }

    /// RTP timestamp of the first fragment
    pub fn rtp_time(&self) -> u32 {
        self.rtp_time
    }

    /// Concatenate `header` and all fragments, then reset
    pub fn assemble(&mut self, header: &[u8]) -> Bytes {
        let len = header.len() + self.parts.iter().map(Bytes::len).sum::<usize>();
        let mut nal = BytesMut::with_capacity(len);
        nal.put_slice(header);
        for part in self.parts.drain(..) {
            nal.put_slice(&part);
        }
        nal.freeze()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
