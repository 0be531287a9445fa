//! The pack capability
//!
//! A pack is any immutable media unit that knows its serialized size: an RTP
//! packet, an FLV tag, an MPEG-TS frame or an elementary-stream frame. Queues
//! and caches hold packs behind `Arc` and never copy the payload.

use std::sync::Arc;

/// Anything that reports its serialized byte size
pub trait Pack {
    /// Size in bytes as transmitted
    fn size(&self) -> usize;
}

impl<P: Pack + ?Sized> Pack for Arc<P> {
    fn size(&self) -> usize {
        (**self).size()
    }
}

impl Pack for bytes::Bytes {
    fn size(&self) -> usize {
        self.len()
    }
}
