//! Per-stream fan-out
//!
//! A [`Stream`] owns everything one published camera feed needs:
//!
//! ```text
//!                  ┌─► RTP cache + RTP subscribers
//! write_packet ────┤
//!                  └─► FrameConverter ─► FlvMuxer ─► FLV cache + FLV subscribers
//!                                     └► TsMuxer ──► HlsMuxer ─► Playlist
//! ```
//!
//! The FLV and HLS branches exist for H.264 streams only. New subscribers
//! are primed from the cache of their branch before live packs arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::cache::{EmptyCache, FlvCache, H264Cache, HevcCache, PackCache};
use crate::codec::{AudioMeta, Frame, FrameWriter, ParameterSetDecoder, VideoCodec, VideoMeta};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::flv::{FlvMuxer, FlvTag, TagWriter};
use crate::hls::{HlsMuxer, Playlist};
use crate::mpegts::TsMuxer;
use crate::queue::PackQueue;
use crate::rtp::{AacExtractor, FrameConverter, FrameExtractor, H264Extractor, Packet};

/// Queue of one subscriber, closed when it is removed
struct Inbox<T> {
    queue: PackQueue<T>,
    closed: AtomicBool,
}

impl<T> Inbox<T> {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.signal();
    }
}

/// Receiving end of a subscriber
pub struct Subscription<T> {
    id: u64,
    inbox: Arc<Inbox<T>>,
    fanout_closed: Arc<AtomicBool>,
}

impl<T> Subscription<T> {
    /// Id to pass to `unsubscribe`
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next pack; `None` once unsubscribed or the stream is closed, and the
    /// queue is drained
    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(pack) = self.inbox.queue.try_dequeue() {
                return Some(pack);
            }
            if self.is_closed() {
                return None;
            }
            if let Some(pack) = self.inbox.queue.dequeue().await {
                return Some(pack);
            }
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inbox.queue.try_dequeue()
    }

    /// Packs waiting to be received
    pub fn pending(&self) -> usize {
        self.inbox.queue.len()
    }

    fn is_closed(&self) -> bool {
        self.inbox.closed.load(Ordering::Acquire) || self.fanout_closed.load(Ordering::Acquire)
    }
}

/// Cache plus subscriber inboxes for one kind of pack
struct Fanout<T> {
    cache: Box<dyn PackCache<T>>,
    subscribers: RwLock<HashMap<u64, Arc<Inbox<T>>>>,
    closed: Arc<AtomicBool>,
}

impl<T: Clone + Send + 'static> Fanout<T> {
    fn new(cache: Box<dyn PackCache<T>>) -> Self {
        Self {
            cache,
            subscribers: RwLock::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn write(&self, pack: T) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StreamClosed);
        }

        // Held across caching so a joining subscriber sees each pack once
        let subscribers = self.subscribers.read();
        self.cache.cache_pack(pack.clone());
        for inbox in subscribers.values() {
            inbox.queue.enqueue(pack.clone());
        }
        Ok(())
    }

    fn subscribe(&self, id: u64, use_cache: bool) -> Subscription<T> {
        let inbox = Arc::new(Inbox {
            queue: PackQueue::new(),
            closed: AtomicBool::new(false),
        });

        let mut subscribers = self.subscribers.write();
        if use_cache {
            let bytes = self.cache.push_to(&inbox.queue);
            tracing::debug!(id, packs = inbox.queue.len(), bytes, "Primed subscriber from cache");
        }
        subscribers.insert(id, Arc::clone(&inbox));

        Subscription {
            id,
            inbox,
            fanout_closed: Arc::clone(&self.closed),
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        match self.subscribers.write().remove(&id) {
            Some(inbox) => {
                inbox.close();
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for (_, inbox) in self.subscribers.write().drain() {
            inbox.close();
        }
        self.cache.reset();
    }
}

/// Hands muxed FLV tags to the FLV fan-out
struct FanoutTags(Arc<Fanout<Arc<FlvTag>>>);

impl TagWriter for FanoutTags {
    fn write_tag(&mut self, tag: Arc<FlvTag>) -> Result<()> {
        self.0.write(tag)
    }
}

/// Feeds every extracted frame to the FLV muxer and, with HLS, the TS muxer
#[derive(Clone)]
struct MuxerTee {
    flv: Arc<FlvMuxer>,
    ts: Option<Arc<TsMuxer>>,
}

impl FrameWriter for MuxerTee {
    fn write_frame(&mut self, frame: Frame) -> Result<()> {
        if let Some(ts) = &self.ts {
            TsMuxer::write_frame(ts, frame.clone())?;
        }
        FlvMuxer::write_frame(&self.flv, frame)
    }
}

/// Processing stages of a stream, stopped upstream first
struct Shutdown {
    path: String,
    converter: Option<Arc<FrameConverter>>,
    flv_muxer: Option<Arc<FlvMuxer>>,
    ts_muxer: Option<Arc<TsMuxer>>,
    playlist: Option<Arc<Playlist>>,
    flv: Arc<Fanout<Arc<FlvTag>>>,
}

impl Shutdown {
    /// Drain each stage into the next before closing it, so every frame
    /// already accepted reaches the FLV subscribers and the playlist
    async fn run(self) {
        if let Some(converter) = &self.converter {
            converter.close();
            converter.join().await;
        }
        if let Some(muxer) = &self.flv_muxer {
            muxer.close();
        }
        if let Some(muxer) = &self.ts_muxer {
            muxer.close();
        }
        if let Some(muxer) = &self.flv_muxer {
            muxer.join().await;
        }
        if let Some(muxer) = &self.ts_muxer {
            muxer.join().await;
        }
        self.finish();
    }

    /// Stop everything at once, for when no runtime is left to drain on
    fn abort(self) {
        if let Some(converter) = &self.converter {
            converter.close();
        }
        if let Some(muxer) = &self.flv_muxer {
            muxer.close();
        }
        if let Some(muxer) = &self.ts_muxer {
            muxer.close();
        }
        self.finish();
    }

    fn finish(self) {
        self.flv.close();
        if let Some(playlist) = &self.playlist {
            playlist.close();
        }
        tracing::info!(path = %self.path, "Stream closed");
    }
}

/// One published stream with its caches, muxers and subscribers
pub struct Stream {
    path: String,
    video: VideoMeta,
    audio: AudioMeta,
    rtp: Fanout<Arc<Packet>>,
    flv: Arc<Fanout<Arc<FlvTag>>>,
    converter: Option<Arc<FrameConverter>>,
    flv_muxer: Option<Arc<FlvMuxer>>,
    ts_muxer: Option<Arc<TsMuxer>>,
    playlist: Option<Arc<Playlist>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    shutdown: Mutex<Option<JoinHandle<()>>>,
}

impl Stream {
    /// Set up the stream for its video codec
    ///
    /// H.264 streams also get FLV muxing and, when enabled, HLS segmenting.
    /// Must be called within a tokio runtime.
    pub fn new(
        path: impl Into<String>,
        video: VideoMeta,
        audio: AudioMeta,
        config: &RelayConfig,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Self {
        let path = path.into();

        let rtp_cache: Box<dyn PackCache<Arc<Packet>>> = match video.codec {
            VideoCodec::H264 => Box::new(H264Cache::new(config.cache_gop)),
            VideoCodec::H265 => Box::new(HevcCache::new(config.cache_gop)),
            VideoCodec::None => Box::new(EmptyCache),
        };
        let flv_cache: Box<dyn PackCache<Arc<FlvTag>>> = match video.codec {
            VideoCodec::H264 => Box::new(FlvCache::new(config.cache_gop)),
            _ => Box::new(EmptyCache),
        };
        let rtp = Fanout::new(rtp_cache);
        let flv = Arc::new(Fanout::new(flv_cache));

        let mut stream = Self {
            path,
            video,
            audio,
            rtp,
            flv,
            converter: None,
            flv_muxer: None,
            ts_muxer: None,
            playlist: None,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shutdown: Mutex::new(None),
        };
        if stream.video.codec == VideoCodec::H264 {
            stream.start_muxers(config, decoder);
        }

        tracing::info!(
            path = %stream.path,
            video = %stream.video.codec,
            audio = %stream.audio.codec,
            "Stream created"
        );
        stream
    }

    fn start_muxers(&mut self, config: &RelayConfig, decoder: Arc<dyn ParameterSetDecoder>) {
        let flv_muxer = Arc::new(FlvMuxer::new(
            self.video.clone(),
            self.audio.clone(),
            Box::new(FanoutTags(Arc::clone(&self.flv))),
            Arc::clone(&decoder),
        ));

        let ts_muxer = if config.hls {
            match self.start_hls(config, decoder) {
                Ok((muxer, playlist)) => {
                    self.playlist = Some(playlist);
                    Some(muxer)
                }
                Err(e) => {
                    tracing::warn!(path = %self.path, error = %e, "HLS disabled for stream");
                    None
                }
            }
        } else {
            None
        };

        let tee = MuxerTee {
            flv: Arc::clone(&flv_muxer),
            ts: ts_muxer.clone(),
        };
        let video: Box<dyn FrameExtractor> =
            Box::new(H264Extractor::new(tee.clone(), self.video.clock_rate));
        let audio: Option<Box<dyn FrameExtractor>> = if self.audio.is_aac() {
            Some(Box::new(AacExtractor::new(tee, self.audio.sample_rate)))
        } else {
            None
        };

        self.converter = Some(Arc::new(FrameConverter::new(Some(video), audio)));
        self.flv_muxer = Some(flv_muxer);
        self.ts_muxer = ts_muxer;
    }

    fn start_hls(
        &self,
        config: &RelayConfig,
        decoder: Arc<dyn ParameterSetDecoder>,
    ) -> Result<(Arc<TsMuxer>, Arc<Playlist>)> {
        let playlist = Arc::new(Playlist::new(config.hls_remain_segments));
        let segmenter = HlsMuxer::new(
            self.path.clone(),
            Arc::clone(&playlist),
            config,
            self.audio.sample_rate,
        )?;
        let muxer = TsMuxer::new(
            self.video.clone(),
            self.audio.clone(),
            Box::new(segmenter),
            decoder,
        )?;
        Ok((Arc::new(muxer), playlist))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn video(&self) -> &VideoMeta {
        &self.video
    }

    pub fn audio(&self) -> &AudioMeta {
        &self.audio
    }

    /// HLS playlist, for H.264 streams with HLS enabled
    pub fn playlist(&self) -> Option<&Arc<Playlist>> {
        self.playlist.as_ref()
    }

    /// FLV header flags of the muxed output, for H.264 streams
    pub fn flv_type_flags(&self) -> Option<u8> {
        self.flv_muxer.as_ref().map(|m| m.type_flags())
    }

    /// Cache and fan out an RTP or RTCP packet; media also goes to the muxers
    pub fn write_packet(&self, packet: Arc<Packet>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::StreamClosed);
        }
        self.rtp.write(Arc::clone(&packet))?;
        if let Some(converter) = &self.converter {
            converter.write_packet(packet);
        }
        Ok(())
    }

    /// Cache and fan out an FLV tag
    pub fn write_tag(&self, tag: Arc<FlvTag>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::StreamClosed);
        }
        self.flv.write(tag)
    }

    /// Receive the RTP packets, primed with the cached ones if `use_cache`
    pub fn subscribe_rtp(&self, use_cache: bool) -> Result<Subscription<Arc<Packet>>> {
        let id = self.subscriber_id()?;
        let subscription = self.rtp.subscribe(id, use_cache);
        tracing::info!(path = %self.path, id, kind = "rtp", "Subscriber added");
        Ok(subscription)
    }

    /// Receive the FLV tags, primed with the cached ones if `use_cache`
    pub fn subscribe_flv(&self, use_cache: bool) -> Result<Subscription<Arc<FlvTag>>> {
        let id = self.subscriber_id()?;
        let subscription = self.flv.subscribe(id, use_cache);
        tracing::info!(path = %self.path, id, kind = "flv", "Subscriber added");
        Ok(subscription)
    }

    /// Remove a subscriber of either kind
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.rtp.unsubscribe(id) || self.flv.unsubscribe(id);
        if removed {
            tracing::info!(path = %self.path, id, "Subscriber removed");
        }
        removed
    }

    /// Current RTP and FLV subscribers together
    pub fn subscriber_count(&self) -> usize {
        self.rtp.len() + self.flv.len()
    }

    /// Whether `close` was called; writes and new subscribers are refused
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse new input, wake the RTP subscribers and stop the muxers
    ///
    /// Packets accepted before the call still flow through the converter
    /// and muxers; FLV subscribers and the playlist are closed once those
    /// have drained. Outside a runtime everything stops at once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.rtp.close();

        let shutdown = Shutdown {
            path: self.path.clone(),
            converter: self.converter.clone(),
            flv_muxer: self.flv_muxer.clone(),
            ts_muxer: self.ts_muxer.clone(),
            playlist: self.playlist.clone(),
            flv: Arc::clone(&self.flv),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => *self.shutdown.lock() = Some(runtime.spawn(shutdown.run())),
            Err(_) => shutdown.abort(),
        }
    }

    /// Wait for the shutdown started by `close` to finish
    pub async fn join(&self) {
        let handle = self.shutdown.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(path = %self.path, error = %e, "Stream shutdown failed");
            }
        }
    }

    fn subscriber_id(&self) -> Result<u64> {
        if self.is_closed() {
            return Err(Error::StreamClosed);
        }
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}
