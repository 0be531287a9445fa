//! FLV file reader

use bytes::Bytes;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::tag::{FlvTag, FlvTagType, TAG_HEADER_LEN};
use super::writer::{FLAG_AUDIO, FLAG_VIDEO};
use crate::error::{MediaError, Result};

/// Reads tags back from an FLV byte stream, checking the previous tag size
/// chain as it goes
pub struct FlvReader<R> {
    reader: R,
    type_flags: u8,
    prev_tag_size: u32,
}

impl<R: AsyncRead + Unpin> FlvReader<R> {
    /// Read and validate the file header
    pub async fn new(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 9];
        reader.read_exact(&mut header).await?;
        if &header[..3] != b"FLV" {
            return Err(MediaError::InvalidFlvSignature.into());
        }

        let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
        if data_offset > 9 {
            let mut skip = vec![0u8; (data_offset - 9) as usize];
            reader.read_exact(&mut skip).await?;
        }

        Ok(Self {
            reader,
            type_flags: header[4],
            prev_tag_size: 0,
        })
    }

    pub fn has_video(&self) -> bool {
        self.type_flags & FLAG_VIDEO != 0
    }

    pub fn has_audio(&self) -> bool {
        self.type_flags & FLAG_AUDIO != 0
    }

    /// Next tag, `None` at end of stream
    ///
    /// Tags of unknown type are skipped.
    pub async fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        loop {
            let mut size = [0u8; 4];
            if !self.fill(&mut size).await? {
                return Ok(None);
            }
            let actual = u32::from_be_bytes(size);
            if actual != self.prev_tag_size {
                return Err(MediaError::PreviousTagSizeMismatch {
                    expected: self.prev_tag_size,
                    actual,
                }
                .into());
            }

            let mut header = [0u8; TAG_HEADER_LEN];
            if !self.fill(&mut header).await? {
                return Ok(None);
            }
            let data_size = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
            let v = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
            let timestamp = (v >> 8) | (v << 24);

            let mut data = vec![0u8; data_size];
            self.reader.read_exact(&mut data).await?;
            self.prev_tag_size = (TAG_HEADER_LEN + data_size) as u32;

            match FlvTagType::try_from(header[0]) {
                Ok(tag_type) => return Ok(Some(FlvTag::new(tag_type, timestamp, Bytes::from(data)))),
                Err(_) => {
                    tracing::debug!(tag_type = header[0], "Skipping unknown FLV tag");
                }
            }
        }
    }

    /// Fill `buf`; false when the stream ended before the first byte
    async fn fill(&mut self, buf: &mut [u8]) -> Result<bool> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
