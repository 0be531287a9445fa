//! AMF0 serialization for FLV script data
//!
//! Only encoding is needed: the relay writes `onMetaData` tags and never
//! parses AMF from the network.

mod amf0;
mod value;

pub use amf0::Amf0Encoder;
pub use value::AmfValue;
