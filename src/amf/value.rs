//! AMF values written into `onMetaData`

/// AMF0 value
///
/// ECMA array properties keep insertion order; players read `onMetaData`
/// entries in the order they were written.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AmfValue {
    Number(f64),
    Boolean(bool),
    /// Long string marker is used past 65535 bytes
    String(String),
    EcmaArray(Vec<(String, AmfValue)>),
    #[default]
    Null,
}

impl AmfValue {
    /// First property named `key` of an ECMA array
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        match self {
            AmfValue::EcmaArray(props) => props.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(f64::from(v))
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_owned())
    }
}
