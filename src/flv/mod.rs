//! FLV tags, file writer/reader and the H.264/AAC muxer

pub mod data;
pub mod muxer;
pub mod reader;
pub mod tag;
pub mod writer;

pub use data::{AudioData, VideoData};
pub use muxer::{FlvMuxer, TagWriter};
pub use reader::FlvReader;
pub use tag::{FlvTag, FlvTagType};
pub use writer::{FlvWriter, FLAG_AUDIO, FLAG_VIDEO};
