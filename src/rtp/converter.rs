//! Packet to frame conversion stage

use std::sync::Arc;

use super::{Channel, FrameExtractor, Packet};
use crate::worker::Worker;

/// Routes RTP packets to the video and audio extractors on its own task
///
/// Media channels go to `extract`, control channels to `control`. A missing
/// extractor makes its channels no-ops.
pub struct FrameConverter {
    worker: Worker<Arc<Packet>>,
}

impl FrameConverter {
    /// Spawn the conversion task; must be called within a tokio runtime
    pub fn new(
        video: Option<Box<dyn FrameExtractor>>,
        audio: Option<Box<dyn FrameExtractor>>,
    ) -> Self {
        let mut video = video;
        let mut audio = audio;

        let worker = Worker::spawn("frame-converter", move |packet: Arc<Packet>| {
            let extractor = match packet.channel {
                Channel::Video | Channel::VideoControl => video.as_mut(),
                Channel::Audio | Channel::AudioControl => audio.as_mut(),
            };
            let Some(extractor) = extractor else {
                return Ok(());
            };

            if packet.channel.is_media() {
                extractor.extract(&packet)
            } else {
                extractor.control(&packet)
            }
        });

        Self { worker }
    }

    /// Queue a packet for conversion
    pub fn write_packet(&self, packet: Arc<Packet>) {
        self.worker.submit(packet);
    }

    /// Stop after the queued packets are converted
    pub fn close(&self) {
        self.worker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_closed()
    }

    /// Wait for the conversion task to exit
    pub async fn join(&self) {
        self.worker.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Frame, FrameWriter};
    use crate::error::Result;
    use crate::rtp::packet::rtp_body;
    use crate::rtp::H264Extractor;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct SharedFrames(Arc<Mutex<Vec<Frame>>>);

    impl FrameWriter for SharedFrames {
        fn write_frame(&mut self, frame: Frame) -> Result<()> {
            self.0.lock().push(frame);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_routes_video_packets() {
        let frames = SharedFrames::default();
        let video = H264Extractor::new(frames.clone(), 90_000);
        let converter = FrameConverter::new(Some(Box::new(video)), None);

        for seq in 0..3u16 {
            let packet = Packet::new(Channel::Video, rtp_body(seq, 0, &[0x41, 0x9A, seq as u8]))
                .unwrap();
            converter.write_packet(Arc::new(packet));
        }
        // No audio extractor: ignored
        let audio = Packet::new(Channel::Audio, rtp_body(0, 0, &[0, 16, 0, 8, 1])).unwrap();
        converter.write_packet(Arc::new(audio));

        converter.close();
        converter.join().await;

        let frames = frames.0.lock();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].payload[2], 2);
    }

    #[tokio::test]
    async fn test_extract_error_does_not_stop_conversion() {
        let frames = SharedFrames::default();
        let video = H264Extractor::new(frames.clone(), 90_000);
        let converter = FrameConverter::new(Some(Box::new(video)), None);

        let bad = Packet::new(Channel::Video, rtp_body(0, 0, &[0x1E, 0, 0])).unwrap();
        let good = Packet::new(Channel::Video, rtp_body(1, 0, &[0x41, 0, 0])).unwrap();
        converter.write_packet(Arc::new(bad));
        converter.write_packet(Arc::new(good));

        converter.close();
        converter.join().await;
        assert_eq!(frames.0.lock().len(), 1);
    }
}
