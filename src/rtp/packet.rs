//! Interleaved RTP packets
//!
//! On the wire every packet is prefixed with four bytes (RFC 2326 §10.12):
//!
//! ```text
//! +------+---------+---------------------+--------------------+
//! | 0x24 | channel | length (u16 BE)     | RTP / RTCP packet  |
//! +------+---------+---------------------+--------------------+
//! ```
//!
//! The channel number is mapped to a logical [`Channel`] through a
//! [`ChannelMap`]. Media channels carry RTP, control channels carry RTCP.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FramingError, Result};
use crate::pack::Pack;

/// Interleaved frame magic byte (`$`)
pub const TRANSFER_PREFIX: u8 = 0x24;

/// Interleaved prefix length
pub const PREFIX_LEN: usize = 4;

const RTP_HEADER_LEN: usize = 12;

/// Logical RTP channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Video = 0,
    VideoControl = 1,
    Audio = 2,
    AudioControl = 3,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Video,
        Channel::VideoControl,
        Channel::Audio,
        Channel::AudioControl,
    ];

    /// Position in a [`ChannelMap`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Media channels carry RTP, the others RTCP
    pub fn is_media(self) -> bool {
        matches!(self, Channel::Video | Channel::Audio)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Video => "video",
            Channel::VideoControl => "video control",
            Channel::Audio => "audio",
            Channel::AudioControl => "audio control",
        };
        f.write_str(name)
    }
}

/// Wire channel number per logical channel; outside 0..=255 means not subscribed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap(pub [i32; 4]);

impl ChannelMap {
    /// The usual RTSP interleaving: video 0/1, audio 2/3
    pub fn interleaved() -> Self {
        ChannelMap([0, 1, 2, 3])
    }

    /// Logical channel for a wire channel number
    pub fn lookup(&self, wire: u8) -> Option<Channel> {
        self.0
            .iter()
            .position(|&ch| ch == wire as i32)
            .map(|i| Channel::ALL[i])
    }

    /// Wire channel number for a logical channel, `None` if not subscribed
    pub fn wire(&self, channel: Channel) -> Option<u8> {
        u8::try_from(self.0[channel.index()]).ok()
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::interleaved()
    }
}

/// Fixed RTP header (RFC 3550 §5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// First payload byte
    pub payload_offset: usize,
    /// One past the last payload byte (padding excluded)
    pub payload_end: usize,
}

impl RtpHeader {
    /// Parse the header of an RTP packet
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(FramingError::InvalidRtpHeader.into());
        }

        let version = data[0] >> 6;
        if version != 2 {
            return Err(FramingError::InvalidRtpHeader.into());
        }
        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = data[0] & 0x0F;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = RTP_HEADER_LEN + csrc_count as usize * 4;
        if extension {
            if data.len() < offset + 4 {
                return Err(FramingError::InvalidRtpHeader.into());
            }
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4 + words * 4;
        }
        if data.len() < offset {
            return Err(FramingError::InvalidRtpHeader.into());
        }

        let mut end = data.len();
        if padding {
            let pad = data[end - 1] as usize;
            if pad == 0 || end - offset < pad {
                return Err(FramingError::InvalidRtpHeader.into());
            }
            end -= pad;
        }

        Ok(RtpHeader {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            payload_offset: offset,
            payload_end: end,
        })
    }
}

/// One interleaved RTP or RTCP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub channel: Channel,
    /// Packet body without the interleaved prefix
    pub data: Bytes,
    /// Parsed for media channels only
    pub header: Option<RtpHeader>,
}

impl Packet {
    /// Build a packet from a body, parsing the RTP header on media channels
    pub fn new(channel: Channel, data: Bytes) -> Result<Self> {
        let header = if channel.is_media() {
            Some(RtpHeader::parse(&data)?)
        } else {
            None
        };
        Ok(Packet {
            channel,
            data,
            header,
        })
    }

    /// Decode one prefixed packet from a complete frame
    pub fn decode(frame: Bytes, channels: &ChannelMap) -> Result<Self> {
        if frame.len() < PREFIX_LEN {
            return Err(FramingError::Truncated {
                expected: PREFIX_LEN,
                actual: frame.len(),
            }
            .into());
        }

        let (wire, len) = parse_prefix(&frame[..PREFIX_LEN])?;
        let expected = PREFIX_LEN + len;
        if frame.len() < expected {
            return Err(FramingError::Truncated {
                expected,
                actual: frame.len(),
            }
            .into());
        }

        let channel = channels
            .lookup(wire)
            .ok_or(FramingError::UnknownChannel(wire))?;
        Packet::new(channel, frame.slice(PREFIX_LEN..expected))
    }

    /// Read one prefixed packet from a stream
    pub async fn read_from<R>(reader: &mut R, channels: &ChannelMap) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; PREFIX_LEN];
        reader.read_exact(&mut prefix).await?;
        let (wire, len) = parse_prefix(&prefix)?;

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;

        let channel = channels
            .lookup(wire)
            .ok_or(FramingError::UnknownChannel(wire))?;
        Packet::new(channel, Bytes::from(body))
    }

    /// Append the prefixed packet to `buf`; unsubscribed channels are skipped
    pub fn encode_to(&self, buf: &mut BytesMut, channels: &ChannelMap) -> Result<()> {
        let Some(wire) = channels.wire(self.channel) else {
            return Ok(());
        };
        let len = self.wire_len()?;
        buf.reserve(self.size());
        buf.put_u8(TRANSFER_PREFIX);
        buf.put_u8(wire);
        buf.put_u16(len);
        buf.put_slice(&self.data);
        Ok(())
    }

    /// Write the prefixed packet; unsubscribed channels are skipped
    pub async fn write_to<W>(&self, writer: &mut W, channels: &ChannelMap) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(wire) = channels.wire(self.channel) else {
            return Ok(());
        };
        let [hi, lo] = self.wire_len()?.to_be_bytes();
        let prefix = [TRANSFER_PREFIX, wire, hi, lo];
        writer.write_all(&prefix).await?;
        writer.write_all(&self.data).await?;
        Ok(())
    }

    /// Body length as carried by the 16-bit prefix field
    fn wire_len(&self) -> Result<u16> {
        u16::try_from(self.data.len())
            .map_err(|_| FramingError::Oversized(self.data.len()).into())
    }

    /// RTP payload; `None` on control channels
    pub fn payload(&self) -> Option<Bytes> {
        self.header
            .as_ref()
            .map(|h| self.data.slice(h.payload_offset..h.payload_end))
    }

    pub fn sequence_number(&self) -> u16 {
        self.header.map(|h| h.sequence_number).unwrap_or_default()
    }

    pub fn timestamp(&self) -> u32 {
        self.header.map(|h| h.timestamp).unwrap_or_default()
    }
}

impl Pack for Packet {
    fn size(&self) -> usize {
        self.data.len() + PREFIX_LEN
    }
}

fn parse_prefix(prefix: &[u8]) -> Result<(u8, usize)> {
    if prefix[0] != TRANSFER_PREFIX {
        return Err(FramingError::BadMagic(prefix[0]).into());
    }
    let len = u16::from_be_bytes([prefix[2], prefix[3]]) as usize;
    Ok((prefix[1], len))
}

/// Build an RTP packet body; test helper shared by the extractor tests
#[cfg(test)]
pub(crate) fn rtp_body(seq: u16, timestamp: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RTP_HEADER_LEN + payload.len());
    buf.put_u8(0x80);
    buf.put_u8(96);
    buf.put_u16(seq);
    buf.put_u32(timestamp);
    buf.put_u32(0x1234_5678);
    buf.put_slice(payload);
    buf.freeze()
}
