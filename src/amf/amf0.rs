//! AMF0 encoding of script data values

use bytes::{BufMut, Bytes, BytesMut};

use super::value::AmfValue;

const NUMBER: u8 = 0x00;
const BOOLEAN: u8 = 0x01;
const STRING: u8 = 0x02;
const NULL: u8 = 0x05;
const ECMA_ARRAY: u8 = 0x08;
const OBJECT_END: u8 = 0x09;
const LONG_STRING: u8 = 0x0C;

/// Appends AMF0 values to an internal buffer
#[derive(Default)]
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded bytes so far; the encoder is left empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Script data body: the `name` string then `value`
    pub fn write_named(&mut self, name: &str, value: &AmfValue) {
        self.write_string(name);
        self.write(value);
    }

    pub fn write(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.buf.put_u8(NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Boolean(b) => self.buf.put_slice(&[BOOLEAN, u8::from(*b)]),
            AmfValue::String(s) => self.write_string(s),
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                for (key, val) in props {
                    self.write_key(key);
                    self.write(val);
                }
                self.write_key("");
                self.buf.put_u8(OBJECT_END);
            }
            AmfValue::Null => self.buf.put_u8(NULL),
        }
    }

    fn write_string(&mut self, s: &str) {
        match u16::try_from(s.len()) {
            Ok(len) => {
                self.buf.put_u8(STRING);
                self.buf.put_u16(len);
            }
            Err(_) => {
                self.buf.put_u8(LONG_STRING);
                self.buf.put_u32(s.len() as u32);
            }
        }
        self.buf.put_slice(s.as_bytes());
    }

    /// Property name: no marker, truncated to 65535 bytes
    fn write_key(&mut self, key: &str) {
        let key = &key.as_bytes()[..key.len().min(u16::MAX as usize)];
        self.buf.put_u16(key.len() as u16);
        self.buf.put_slice(key);
    }
}
