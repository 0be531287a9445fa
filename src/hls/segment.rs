//! HLS segments and their storage
//!
//! A segment is a complete transport stream (program tables first) kept
//! either in memory or in a file under the configured directory.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::mpegts::{TsFrame, TsWriter};

const FILE_BUFFER_SIZE: usize = 64 * 1024;
const MEMORY_SEGMENT_CAPACITY: usize = 512 * 1024;

/// Storage of one segment's transport stream
pub trait SegmentFile: Send + Sync {
    /// Start a new transport stream at `path`
    fn open(&mut self, path: &Path) -> Result<()>;

    fn write_frame(&mut self, frame: &TsFrame) -> Result<()>;

    /// Finish writing; the data stays readable
    fn close(&mut self) -> Result<()>;

    /// Complete segment bytes
    fn get(&self) -> Result<Bytes>;

    /// Handle to read the bytes later without borrowing the file
    fn source(&self) -> Result<SegmentSource> {
        self.get().map(SegmentSource::Memory)
    }

    /// Release the data
    fn delete(&mut self) -> Result<()>;
}

/// Where a published segment's bytes live
#[derive(Debug, Clone)]
pub enum SegmentSource {
    Memory(Bytes),
    File(PathBuf),
}

impl SegmentSource {
    /// Segment bytes; reads the whole file for file segments
    pub fn read(&self) -> Result<Bytes> {
        match self {
            SegmentSource::Memory(data) => Ok(data.clone()),
            SegmentSource::File(path) => Ok(Bytes::from(fs::read(path)?)),
        }
    }
}

/// Segment kept in memory
#[derive(Default)]
pub struct MemorySegmentFile {
    writer: Option<TsWriter<Vec<u8>>>,
    data: Bytes,
}

impl MemorySegmentFile {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentFile for MemorySegmentFile {
    fn open(&mut self, _path: &Path) -> Result<()> {
        self.data = Bytes::new();
        self.writer = Some(TsWriter::new(Vec::with_capacity(MEMORY_SEGMENT_CAPACITY))?);
        Ok(())
    }

    fn write_frame(&mut self, frame: &TsFrame) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_frame(frame),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            self.data = Bytes::from(writer.into_inner());
        }
        Ok(())
    }

    fn get(&self) -> Result<Bytes> {
        match &self.writer {
            Some(writer) => Ok(Bytes::copy_from_slice(writer.get_ref())),
            None => Ok(self.data.clone()),
        }
    }

    fn delete(&mut self) -> Result<()> {
        self.writer = None;
        self.data = Bytes::new();
        Ok(())
    }
}

/// Segment written to a file
#[derive(Default)]
pub struct FsSegmentFile {
    path: PathBuf,
    writer: Option<TsWriter<BufWriter<File>>>,
}

impl FsSegmentFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SegmentFile for FsSegmentFile {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.path = path.to_path_buf();
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(FILE_BUFFER_SIZE, file);
        self.writer = Some(TsWriter::new(writer)?);
        Ok(())
    }

    fn write_frame(&mut self, frame: &TsFrame) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_frame(frame),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn get(&self) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(&self.path)?))
    }

    fn source(&self) -> Result<SegmentSource> {
        Ok(SegmentSource::File(self.path.clone()))
    }

    fn delete(&mut self) -> Result<()> {
        self.close()?;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// One entry of the playlist
pub struct Segment {
    pub sequence_no: u64,
    /// Seconds
    pub duration: f64,
    pub uri: String,
    /// 90 kHz
    pub start_pts: i64,
    /// Written as a discontinuity in the playlist
    pub discontinuity: bool,
    pub(crate) file: Box<dyn SegmentFile>,
}

impl Segment {
    pub(crate) fn new(
        sequence_no: u64,
        uri: String,
        start_pts: i64,
        file: Box<dyn SegmentFile>,
    ) -> Self {
        Self {
            sequence_no,
            duration: 0.0,
            uri,
            start_pts,
            discontinuity: false,
            file,
        }
    }

    /// Extend the duration up to `pts`; earlier timestamps are ignored
    pub fn update_duration(&mut self, pts: i64) {
        if pts < self.start_pts {
            return;
        }
        self.duration = (pts - self.start_pts) as f64 / 90_000.0;
    }

    pub fn data(&self) -> Result<Bytes> {
        self.file.get()
    }

    pub fn source(&self) -> Result<SegmentSource> {
        self.file.source()
    }
}

/// Stable file name prefix for a stream path
pub fn path_key(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// `{key}_{seq}.ts`
pub fn segment_file_name(path: &str, sequence_no: u64) -> String {
    format!("{}_{}.ts", path_key(path), sequence_no)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::TS_PACKET_SIZE;
    use bytes::Bytes;

    fn frame() -> TsFrame {
        TsFrame::audio(90_000, Bytes::from_static(&[0x21, 0x00, 0x49]))
    }

    #[test]
    fn test_memory_segment() {
        let mut file = MemorySegmentFile::new();
        file.open(Path::new("unused")).unwrap();
        file.write_frame(&frame()).unwrap();

        // Readable while open and after close
        assert_eq!(file.get().unwrap().len(), 3 * TS_PACKET_SIZE);
        file.close().unwrap();
        let data = file.get().unwrap();
        assert_eq!(data.len(), 3 * TS_PACKET_SIZE);
        assert_eq!(data[0], 0x47);

        file.delete().unwrap();
        assert!(file.get().unwrap().is_empty());
    }

    #[test]
    fn test_fs_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(segment_file_name("/live/cam", 1));

        let mut file = FsSegmentFile::new();
        file.open(&path).unwrap();
        file.write_frame(&frame()).unwrap();
        file.close().unwrap();

        assert_eq!(file.get().unwrap().len(), 3 * TS_PACKET_SIZE);
        assert!(path.exists());

        let source = file.source().unwrap();
        assert!(matches!(&source, SegmentSource::File(p) if p == &path));
        assert_eq!(source.read().unwrap()[0], 0x47);

        file.delete().unwrap();
        assert!(!path.exists());
        assert!(file.get().is_err());
        assert!(source.read().is_err());
    }

    #[test]
    fn test_file_name() {
        let name = segment_file_name("/live/cam", 7);
        assert!(name.ends_with("_7.ts"));
        assert_eq!(name.len(), 16 + "_7.ts".len());
        assert_eq!(path_key("/live/cam"), path_key("/live/cam"));
        assert_ne!(path_key("/live/cam"), path_key("/live/cam2"));
    }

    #[test]
    fn test_update_duration() {
        let file = Box::new(MemorySegmentFile::new());
        let mut segment = Segment::new(1, "/streams/a/1.ts".into(), 90_000, file);

        segment.update_duration(45_000);
        assert_eq!(segment.duration, 0.0);
        segment.update_duration(270_000);
        assert_eq!(segment.duration, 2.0);
    }
}
