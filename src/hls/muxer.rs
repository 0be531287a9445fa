//! TS frames to rotating HLS segments
//!
//! Video key frames start a new segment once the current one reaches the
//! target duration. Audio is buffered into PES packets of up to 100 ms and
//! only forces a rotation at twice the target, which keeps audio-only
//! streams segmented. A new segment always starts with the buffered audio.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::BytesMut;

use super::jitter::AacJitter;
use super::playlist::Playlist;
use super::segment::{segment_file_name, FsSegmentFile, MemorySegmentFile, Segment, SegmentFile};
use crate::config::RelayConfig;
use crate::error::Result;
use crate::mpegts::{TsFrame, TsFrameWriter};

/// Segments shorter than this are discarded
const MIN_SEGMENT_DURATION_MS: f64 = 100.0;
/// Longest audio buffer, in milliseconds
const AAC_DELAY_MS: i64 = 100;

/// Cuts a TS frame sequence into playlist segments
pub struct HlsMuxer {
    playlist: Arc<Playlist>,
    path: String,
    /// Target segment duration in seconds
    fragment: f64,
    segment_dir: Option<PathBuf>,
    sequence_no: u64,
    current: Option<Segment>,
    audio_rate: u32,
    audio_cache: Option<TsFrame>,
    audio_buf: BytesMut,
    jitter: AacJitter,
}

impl HlsMuxer {
    /// Open the first segment of the stream at `path`
    pub fn new(
        path: impl Into<String>,
        playlist: Arc<Playlist>,
        config: &RelayConfig,
        audio_rate: u32,
    ) -> Result<Self> {
        let mut muxer = Self {
            playlist,
            path: path.into(),
            fragment: config.hls_fragment as f64,
            segment_dir: config.hls_segment_path.clone(),
            sequence_no: 0,
            current: None,
            audio_rate,
            audio_cache: None,
            audio_buf: BytesMut::new(),
            jitter: AacJitter::new(config.aac_sync_ms),
        };

        muxer.segment_open(0)?;
        if let Some(current) = muxer.current.as_mut() {
            current.discontinuity = true;
        }
        Ok(muxer)
    }

    pub fn playlist(&self) -> &Arc<Playlist> {
        &self.playlist
    }

    /// Sequence number of the segment being written
    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// Handle one TS frame
    pub fn write_frame(&mut self, frame: TsFrame) -> Result<()> {
        if self.current.is_none() || frame.payload.is_empty() {
            return Ok(());
        }

        if frame.is_audio() {
            return self.write_audio(frame);
        }

        if frame.is_keyframe() && self.is_overflow() {
            self.reap(frame.pts)?;
        }
        self.flush_frame(&frame)
    }

    /// Drop the unfinished segment
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut current) = self.current.take() {
            current.file.close()?;
            current.file.delete()?;
        }
        Ok(())
    }

    fn write_audio(&mut self, frame: TsFrame) -> Result<()> {
        let cache_pts = match &self.audio_cache {
            Some(cache) => {
                self.audio_buf.extend_from_slice(&frame.header);
                self.audio_buf.extend_from_slice(&frame.payload);
                self.jitter.on_buffer_continue();
                cache.pts
            }
            None => {
                let pts = self.jitter.on_buffer_start(frame.pts, self.audio_rate);
                // The first header stays in the cached frame
                self.audio_buf.extend_from_slice(&frame.payload);
                let mut cache = frame.clone();
                cache.dts = pts;
                cache.pts = pts;
                self.audio_cache = Some(cache);
                pts
            }
        };

        if frame.pts - cache_pts > AAC_DELAY_MS * 90 {
            return self.flush_audio_cache();
        }

        if self.is_absolutely_overflow() {
            self.reap(frame.pts)?;
        }
        Ok(())
    }

    fn flush_audio_cache(&mut self) -> Result<()> {
        let Some(mut cache) = self.audio_cache.take() else {
            return Ok(());
        };
        cache.payload = self.audio_buf.split().freeze();
        self.flush_frame(&cache)
    }

    fn flush_frame(&mut self, frame: &TsFrame) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        current.update_duration(frame.pts);
        current.file.write_frame(frame)
    }

    fn segment_open(&mut self, start_pts: i64) -> Result<()> {
        if self.current.is_some() {
            return Ok(());
        }

        self.sequence_no += 1;
        let uri = format!("/streams{}/{}.ts", self.path, self.sequence_no);
        let file_name = segment_file_name(&self.path, self.sequence_no);

        let (mut file, path): (Box<dyn SegmentFile>, PathBuf) = match &self.segment_dir {
            Some(dir) => (Box::new(FsSegmentFile::new()), dir.join(file_name)),
            None => (Box::new(MemorySegmentFile::new()), PathBuf::from(file_name)),
        };
        if let Err(e) = file.open(&path) {
            self.sequence_no -= 1;
            return Err(e);
        }

        tracing::debug!(path = %self.path, seq = self.sequence_no, "Opened HLS segment");
        self.current = Some(Segment::new(self.sequence_no, uri, start_pts, file));
        Ok(())
    }

    fn segment_close(&mut self) -> Result<()> {
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };
        current.file.close()?;

        if current.duration * 1000.0 < MIN_SEGMENT_DURATION_MS {
            // Reuse the sequence number
            self.sequence_no -= 1;
            current.file.delete()?;
            tracing::debug!(path = %self.path, seq = current.sequence_no, "Dropped short HLS segment");
        } else {
            tracing::info!(
                path = %self.path,
                seq = current.sequence_no,
                duration = current.duration,
                "Closed HLS segment"
            );
            self.playlist.add_segment(current);
        }
        Ok(())
    }

    /// Close the current segment and start the next one at `start_pts`
    fn reap(&mut self, start_pts: i64) -> Result<()> {
        self.segment_close()?;
        self.segment_open(start_pts)?;
        self.flush_audio_cache()
    }

    fn is_overflow(&self) -> bool {
        self.current
            .as_ref()
            .map(|s| s.duration >= self.fragment)
            .unwrap_or(false)
    }

    fn is_absolutely_overflow(&self) -> bool {
        self.current
            .as_ref()
            .map(|s| s.duration >= 2.0 * self.fragment)
            .unwrap_or(true)
    }
}

impl TsFrameWriter for HlsMuxer {
    fn write_ts_frame(&mut self, frame: TsFrame) -> Result<()> {
        self.write_frame(frame)
    }

    fn close(&mut self) -> Result<()> {
        HlsMuxer::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const SECOND: i64 = 90_000;

    fn key(pts: i64) -> TsFrame {
        let mut frame = TsFrame::video(pts, pts, Bytes::from_static(&[0x65, 0x88]));
        frame.key = true;
        frame
    }

    fn inter(pts: i64) -> TsFrame {
        TsFrame::video(pts, pts, Bytes::from_static(&[0x41, 0x9A]))
    }

    fn audio(pts: i64) -> TsFrame {
        let mut frame = TsFrame::audio(pts, Bytes::from_static(&[0x21, 0x00]));
        frame.header = Bytes::from_static(&[0xFF, 0xF1, 0x50, 0x80, 0x01, 0x3F, 0xFC]);
        frame
    }

    fn muxer(remain: usize) -> HlsMuxer {
        let config = RelayConfig::default().hls_fragment(2).hls_remain_segments(remain);
        let playlist = Arc::new(Playlist::new(config.hls_remain_segments));
        HlsMuxer::new("/live/cam", playlist, &config, 44_100).unwrap()
    }

    #[test]
    fn test_rotates_on_keyframe_after_fragment() {
        let mut hls = muxer(1);
        assert_eq!(hls.sequence_no(), 1);

        hls.write_frame(key(SECOND)).unwrap();
        hls.write_frame(inter(2 * SECOND)).unwrap();
        // Duration counted from 0 for the first segment
        hls.write_frame(key(3 * SECOND)).unwrap();

        assert_eq!(hls.sequence_no(), 2);
        let m3u8 = hls.playlist().m3u8(None).unwrap();
        assert!(m3u8.contains("#EXT-X-DISCONTINUITY\n#EXTINF:2.000,\n/streams/live/cam/1.ts\n"));

        // Inter frames never rotate
        hls.write_frame(inter(10 * SECOND)).unwrap();
        assert_eq!(hls.sequence_no(), 2);
        hls.write_frame(key(11 * SECOND)).unwrap();
        assert_eq!(hls.sequence_no(), 3);

        let m3u8 = hls.playlist().m3u8(Some("t")).unwrap();
        assert!(m3u8.contains("#EXT-X-MEDIA-SEQUENCE:2\n"));
        assert!(!m3u8.contains("DISCONTINUITY"));
        assert!(m3u8.contains("#EXTINF:7.000,\n/streams/live/cam/2.ts?token=t\n"));
    }

    #[test]
    fn test_short_segment_dropped_and_sequence_reused() {
        let mut hls = muxer(3);
        hls.write_frame(key(3 * SECOND)).unwrap();
        hls.write_frame(key(4 * SECOND)).unwrap();
        assert_eq!(hls.sequence_no(), 2);
        assert_eq!(hls.playlist().len(), 1);

        // Segment 2 holds 50 ms of media when it is reaped
        hls.write_frame(inter(4 * SECOND + 4_500)).unwrap();
        hls.reap(4 * SECOND + 9_000).unwrap();

        assert_eq!(hls.sequence_no(), 2);
        assert_eq!(hls.playlist().len(), 1);
        assert!(hls.playlist().segment(2).is_err());
        assert_eq!(hls.current.as_ref().unwrap().start_pts, 4 * SECOND + 9_000);
    }

    #[test]
    fn test_audio_buffered_into_one_pes() {
        let mut hls = muxer(1);
        hls.write_frame(key(SECOND)).unwrap();

        // 2090 ticks per access unit at 44.1 kHz
        for i in 0..5 {
            hls.write_frame(audio(SECOND + i * 2_090)).unwrap();
        }
        assert!(hls.audio_cache.is_some());
        // 0 + 5 * 2090 > 9000: flushed
        hls.write_frame(audio(SECOND + 5 * 2_090)).unwrap();
        assert!(hls.audio_cache.is_none());
        assert!(hls.audio_buf.is_empty());

        let data = hls.current.as_ref().unwrap().data().unwrap();
        // Tables, key frame, and one PES for six access units
        assert_eq!(data.len(), 4 * 188);
    }

    #[test]
    fn test_audio_only_rotates_at_twice_fragment() {
        let mut hls = muxer(1);
        let mut pts = SECOND;
        while pts < 5 * SECOND {
            hls.write_frame(audio(pts)).unwrap();
            pts += 2_090;
        }

        assert_eq!(hls.sequence_no(), 2);
        let segment = hls.playlist().m3u8(None).unwrap();
        assert!(segment.contains("/streams/live/cam/1.ts"));
    }

    #[test]
    fn test_segments_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::default()
            .hls_fragment(1)
            .hls_remain_segments(1)
            .hls_segment_path(dir.path());
        let playlist = Arc::new(Playlist::new(1));
        let mut hls = HlsMuxer::new("/live/cam", Arc::clone(&playlist), &config, 44_100).unwrap();

        for i in 1..=4 {
            hls.write_frame(key(i * SECOND)).unwrap();
        }

        // Segment 1 was trimmed from the playlist and removed from disk
        let first = dir.path().join(segment_file_name("/live/cam", 1));
        let second = dir.path().join(segment_file_name("/live/cam", 2));
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(playlist.segment(2).unwrap().len(), 4 * 188);

        TsFrameWriter::close(&mut hls).unwrap();
        let third = dir.path().join(segment_file_name("/live/cam", 3));
        assert!(!third.exists());
    }

    #[test]
    fn test_ignores_frames_after_close() {
        let mut hls = muxer(1);
        hls.close().unwrap();
        hls.write_frame(key(10 * SECOND)).unwrap();

        assert!(hls.playlist().is_empty());
    }
}
