//! FLV file writer
//!
//! ```text
//! | "FLV" | version 1 | flags | header size 9 (4) | prev size 0 (4) | tag | prev size (4) | tag | ...
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::tag::FlvTag;
use crate::error::{MediaError, Result};

/// Header flag for a stream with audio
pub const FLAG_AUDIO: u8 = 0x04;
/// Header flag for a stream with video
pub const FLAG_VIDEO: u8 = 0x01;

/// Serializes tags into an FLV byte stream
pub struct FlvWriter<W> {
    writer: W,
    prev_tag_size: u32,
}

impl<W: AsyncWrite + Unpin> FlvWriter<W> {
    /// Write the file header; `type_flags` must announce audio or video
    pub async fn new(mut writer: W, type_flags: u8) -> Result<Self> {
        if type_flags & (FLAG_AUDIO | FLAG_VIDEO) == 0 {
            return Err(MediaError::NoFlvStreams.into());
        }

        let header = [b'F', b'L', b'V', 0x01, type_flags, 0x00, 0x00, 0x00, 0x09];
        writer.write_all(&header).await?;

        Ok(Self {
            writer,
            prev_tag_size: 0,
        })
    }

    /// Write the previous tag size, then the tag
    pub async fn write_tag(&mut self, tag: &FlvTag) -> Result<()> {
        self.writer
            .write_all(&self.prev_tag_size.to_be_bytes())
            .await?;
        let header = tag.encode_header();
        self.writer.write_all(&header).await?;
        self.writer.write_all(&tag.data).await?;

        self.prev_tag_size = (header.len() + tag.data.len()) as u32;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_header() {
        let writer = FlvWriter::new(Vec::new(), FLAG_AUDIO | FLAG_VIDEO)
            .await
            .unwrap();
        assert_eq!(
            writer.into_inner(),
            vec![b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9]
        );
    }

    #[tokio::test]
    async fn test_no_streams() {
        let result = FlvWriter::new(Vec::new(), 0x02).await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Media(MediaError::NoFlvStreams))
        ));
    }

    #[tokio::test]
    async fn test_previous_tag_size_chain() {
        let mut writer = FlvWriter::new(Vec::new(), FLAG_VIDEO).await.unwrap();
        writer
            .write_tag(&FlvTag::video(0, Bytes::from_static(&[0x17, 0x00])))
            .await
            .unwrap();
        writer
            .write_tag(&FlvTag::video(40, Bytes::from_static(&[0x27, 0x01, 0, 0, 0])))
            .await
            .unwrap();

        let out = writer.into_inner();
        // header, 0, tag(11+2), 13, tag(11+5)
        assert_eq!(out.len(), 9 + 4 + 13 + 4 + 16);
        assert_eq!(&out[9..13], &[0, 0, 0, 0]);
        assert_eq!(&out[26..30], &13u32.to_be_bytes());
        assert_eq!(out[30], 9);
    }
}
