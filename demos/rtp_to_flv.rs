//! Relay a captured interleaved RTP stream into an FLV file
//!
//! Run with: cargo run --example rtp_to_flv INPUT OUTPUT [WIDTHxHEIGHT@FPS]
//!
//! INPUT holds `$ | channel | length | packet` frames as sent over an RTSP
//! TCP connection, H.264 on channels 0/1. The picture size is taken from the
//! command line since SPS decoding lives outside the relay.
//!
//! HLS segments are kept in memory; their count is logged at the end:
//!   RUST_LOG=rtp_relay=debug cargo run --example rtp_to_flv cam.rtp cam.flv 1280x720@25

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::BufReader;

use rtp_relay::codec::{AudioMeta, ParameterSetDecoder, VideoMeta, VideoParams};
use rtp_relay::flv::{FlvWriter, FLAG_VIDEO};
use rtp_relay::rtp::{ChannelMap, Packet};
use rtp_relay::{Error, RelayConfig, Stream};

struct FixedParams(VideoParams);

impl ParameterSetDecoder for FixedParams {
    fn decode_sps(&self, _sps: &[u8]) -> rtp_relay::Result<VideoParams> {
        Ok(self.0)
    }
}

fn parse_params(arg: Option<&str>) -> VideoParams {
    let parsed = arg.and_then(|s| {
        let (size, fps) = s.split_once('@')?;
        let (w, h) = size.split_once('x')?;
        Some(VideoParams {
            width: w.parse().ok()?,
            height: h.parse().ok()?,
            frame_rate: fps.parse().ok()?,
        })
    });
    parsed.unwrap_or(VideoParams {
        width: 1280,
        height: 720,
        frame_rate: 25.0,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtp_relay=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} INPUT OUTPUT [WIDTHxHEIGHT@FPS]", args[0]);
        std::process::exit(2);
    }
    let params = parse_params(args.get(3).map(String::as_str));

    let config = RelayConfig::default();
    let stream = Stream::new(
        "/live/capture",
        VideoMeta::h264(),
        AudioMeta::default(),
        &config,
        Arc::new(FixedParams(params)),
    );

    let viewer = stream.subscribe_flv(true)?;
    let flags = stream.flv_type_flags().unwrap_or(FLAG_VIDEO);
    let output = File::create(&args[2]).await?;
    let recorder = tokio::spawn(async move {
        let mut writer = FlvWriter::new(output, flags).await?;
        let mut tags = 0u64;
        while let Some(tag) = viewer.recv().await {
            writer.write_tag(&tag).await?;
            tags += 1;
        }
        writer.flush().await?;
        Ok::<_, Error>(tags)
    });

    let channels = ChannelMap::interleaved();
    let mut input = BufReader::new(File::open(&args[1]).await?);
    let mut packets = 0u64;
    loop {
        match Packet::read_from(&mut input, &channels).await {
            Ok(packet) => {
                stream.write_packet(Arc::new(packet))?;
                packets += 1;
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(playlist) = stream.playlist() {
        tracing::info!(segments = playlist.len(), "HLS segments produced");
    }
    stream.close();
    stream.join().await;

    let tags = recorder.await??;
    tracing::info!(packets, tags, output = %args[2], "Relay finished");
    Ok(())
}
