//! Live m3u8 playlist over the most recent segments

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

use super::segment::Segment;
use crate::error::{HlsError, Result};

/// Segments published for one stream
///
/// Written by the segmenter, read by HTTP handlers.
pub struct Playlist {
    segments: RwLock<Vec<Segment>>,
    remain: usize,
    /// Unix milliseconds
    last_access: AtomicI64,
}

impl Playlist {
    /// Keep at most `remain` segments; the playlist is served once it has that many
    pub fn new(remain: usize) -> Self {
        Self {
            segments: RwLock::new(Vec::with_capacity(remain + 1)),
            remain: remain.max(1),
            last_access: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Render the playlist; `token` is appended to every segment URI
    pub fn m3u8(&self, token: Option<&str>) -> Result<String> {
        self.touch();
        let segments = self.segments.read();

        if segments.len() < self.remain {
            return Err(HlsError::NotReady.into());
        }

        let max_duration = segments
            .iter()
            .map(|s| s.duration)
            .fold(0.0_f64, f64::max);
        let sequence = segments.first().map(|s| s.sequence_no).unwrap_or(0);

        let mut out = String::with_capacity(512);
        let _ = write!(
            out,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-ALLOW-CACHE:NO\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:{}\n\n",
            (max_duration + 1.0) as i32,
            sequence
        );

        for segment in segments.iter() {
            if segment.discontinuity {
                out.push_str("#EXT-X-DISCONTINUITY\n");
            }
            let _ = write!(out, "#EXTINF:{:.3},\n{}", segment.duration, segment.uri);
            if let Some(token) = token.filter(|t| !t.is_empty()) {
                let _ = write!(out, "?token={}", token);
            }
            out.push('\n');
        }

        Ok(out)
    }

    /// Bytes of segment `sequence_no`
    ///
    /// File segments are read after the lock is released, so a segment
    /// trimmed in between reads as an I/O error.
    pub fn segment(&self, sequence_no: u64) -> Result<Bytes> {
        self.touch();
        let source = {
            let segments = self.segments.read();
            segments
                .iter()
                .find(|s| s.sequence_no == sequence_no)
                .ok_or(HlsError::SegmentNotFound(sequence_no))?
                .source()?
        };
        source.read()
    }

    /// Time of the last playlist or segment request
    pub fn last_access_time(&self) -> DateTime<Utc> {
        let millis = self.last_access.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Segments currently listed
    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }

    /// Drop every segment
    pub fn close(&self) {
        let mut segments = self.segments.write();
        Self::trim(&mut segments, 0);
    }

    pub(crate) fn add_segment(&self, segment: Segment) {
        let mut segments = self.segments.write();
        segments.push(segment);
        Self::trim(&mut segments, self.remain);
    }

    fn trim(segments: &mut Vec<Segment>, remain: usize) {
        if segments.len() <= remain {
            return;
        }
        let excess = segments.len() - remain;
        for mut segment in segments.drain(..excess) {
            if let Err(e) = segment.file.delete() {
                tracing::warn!(uri = %segment.uri, error = %e, "Failed to delete segment, retrying later");
                Self::retry_delete(segment);
            }
        }
    }

    /// One more attempt after the segment's duration, on the runtime if any
    fn retry_delete(mut segment: Segment) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let delay = Duration::from_secs_f64(segment.duration.max(0.0));
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            match segment.file.delete() {
                Ok(()) => tracing::debug!(uri = %segment.uri, "Deleted segment on retry"),
                Err(e) => tracing::warn!(uri = %segment.uri, error = %e, "Segment left undeleted"),
            }
        });
    }

    fn touch(&self) {
        self.last_access
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::segment::{FsSegmentFile, MemorySegmentFile, SegmentFile};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Fails the first delete
    struct StubbornFile {
        deletes: Arc<AtomicUsize>,
    }

    impl SegmentFile for StubbornFile {
        fn open(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }

        fn write_frame(&mut self, _frame: &crate::mpegts::TsFrame) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn get(&self) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        fn delete(&mut self) -> Result<()> {
            if self.deletes.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy").into());
            }
            Ok(())
        }
    }

    fn segment(seq: u64, duration: f64) -> Segment {
        let mut file = MemorySegmentFile::new();
        file.open(Path::new("")).unwrap();
        file.close().unwrap();

        let mut segment = Segment::new(seq, format!("/streams/live/{}.ts", seq), 0, Box::new(file));
        segment.duration = duration;
        segment
    }

    #[test]
    fn test_not_ready() {
        let playlist = Playlist::new(3);
        playlist.add_segment(segment(1, 5.0));
        playlist.add_segment(segment(2, 5.0));

        assert!(matches!(
            playlist.m3u8(None),
            Err(crate::error::Error::Hls(HlsError::NotReady))
        ));
    }

    #[test]
    fn test_m3u8_format() {
        let playlist = Playlist::new(3);
        let mut first = segment(1, 5.2);
        first.discontinuity = true;
        playlist.add_segment(first);
        playlist.add_segment(segment(2, 4.96));
        playlist.add_segment(segment(3, 5.0));

        let m3u8 = playlist.m3u8(None).unwrap();
        assert_eq!(
            m3u8,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-ALLOW-CACHE:NO\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1\n\n\
             #EXT-X-DISCONTINUITY\n#EXTINF:5.200,\n/streams/live/1.ts\n\
             #EXTINF:4.960,\n/streams/live/2.ts\n\
             #EXTINF:5.000,\n/streams/live/3.ts\n"
        );

        let with_token = playlist.m3u8(Some("abc")).unwrap();
        assert!(with_token.contains("/streams/live/2.ts?token=abc\n"));
    }

    #[test]
    fn test_retention() {
        let playlist = Playlist::new(3);
        for seq in 1..=5 {
            playlist.add_segment(segment(seq, 5.0));
        }

        assert_eq!(playlist.len(), 3);
        assert!(playlist.m3u8(None).unwrap().contains("#EXT-X-MEDIA-SEQUENCE:3\n"));
        assert!(matches!(
            playlist.segment(2),
            Err(crate::error::Error::Hls(HlsError::SegmentNotFound(2)))
        ));
        assert_eq!(playlist.segment(5).unwrap().len(), 2 * 188);

        playlist.close();
        assert!(playlist.is_empty());
    }

    #[test]
    fn test_access_time_updates() {
        let playlist = Playlist::new(1);
        let before = playlist.last_access_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let _ = playlist.m3u8(None);

        assert!(playlist.last_access_time() > before);
    }

    #[tokio::test]
    async fn test_failed_delete_is_retried() {
        let playlist = Playlist::new(1);
        let deletes = Arc::new(AtomicUsize::new(0));
        let file = StubbornFile {
            deletes: Arc::clone(&deletes),
        };
        let mut first = Segment::new(1, "/streams/live/1.ts".into(), 0, Box::new(file));
        first.duration = 0.01;
        playlist.add_segment(first);
        playlist.add_segment(segment(2, 5.0));

        assert_eq!(deletes.load(Ordering::SeqCst), 1);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(deletes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_file_segment_read_outside_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.ts");
        let mut file = FsSegmentFile::new();
        file.open(&path).unwrap();
        file.close().unwrap();

        let playlist = Playlist::new(1);
        playlist.add_segment(Segment::new(1, "/streams/live/1.ts".into(), 0, Box::new(file)));

        // Program tables only
        assert_eq!(playlist.segment(1).unwrap().len(), 2 * 188);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(playlist.segment(1), Err(crate::error::Error::Io(_))));
    }
}
