//! The portable tagged binary message codec: a
//! recursive JSON-like value that round-trips through a compact binary form
//! shared by the JSON cache format and the external key/value persistence
//! file.

use crate::buffer::{Reader, Writer};
use crate::errors::CodecError;

const TAG_NULL: u8 = 0x00;
const TAG_TRUE: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_INT32: u8 = 0x03;
const TAG_INT64: u8 = 0x04;
const TAG_FLOAT64: u8 = 0x05;
const TAG_STRING: u8 = 0x06;
const TAG_ARRAY: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

/// A dynamically typed value, the same shape `serde_json::Value` exposes,
/// with its own binary encoding independent of JSON's textual form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn encode(&self, w: &mut Writer) -> Result<(), CodecError> {
        match self {
            Value::Null => w.write_u8(TAG_NULL),
            Value::Bool(true) => w.write_u8(TAG_TRUE),
            Value::Bool(false) => w.write_u8(TAG_FALSE),
            Value::Int(v) => {
                if let Ok(v32) = i32::try_from(*v) {
                    w.write_u8(TAG_INT32);
                    w.write_i32(v32);
                } else {
                    w.write_u8(TAG_INT64);
                    w.write_i64(*v);
                }
            }
            Value::Float(v) => {
                w.write_u8(TAG_FLOAT64);
                w.write_f64(*v);
            }
            Value::String(s) => {
                w.write_u8(TAG_STRING);
                w.write_str(s)?;
            }
            Value::Array(items) => {
                w.write_u8(TAG_ARRAY);
                w.write_size(items.len() as u64)?;
                for item in items {
                    item.encode(w)?;
                }
            }
            Value::Map(pairs) => {
                w.write_u8(TAG_MAP);
                w.write_size(pairs.len() as u64)?;
                for (k, v) in pairs {
                    k.encode(w)?;
                    v.encode(w)?;
                }
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader) -> Result<Value, CodecError> {
        match r.read_u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_TRUE => Ok(Value::Bool(true)),
            TAG_FALSE => Ok(Value::Bool(false)),
            TAG_INT32 => Ok(Value::Int(r.read_i32()? as i64)),
            TAG_INT64 => Ok(Value::Int(r.read_i64()?)),
            TAG_FLOAT64 => Ok(Value::Float(r.read_f64()?)),
            TAG_STRING => Ok(Value::String(r.read_str()?)),
            TAG_ARRAY => {
                let len = r.read_size()? as usize;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Value::decode(r)?);
                }
                Ok(Value::Array(items))
            }
            TAG_MAP => {
                let len = r.read_size()? as usize;
                let mut pairs = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = Value::decode(r)?;
                    let v = Value::decode(r)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            tag => Err(CodecError::UnknownTag(tag)),
        }
    }

    pub fn encode_to_vec(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = Writer::new();
        self.encode(&mut w)?;
        Ok(w.into_bytes())
    }

    pub fn decode_from_slice(bytes: &[u8]) -> Result<Value, CodecError> {
        let mut r = Reader::new(bytes);
        Value::decode(&mut r)
    }
}

/// Converts a textual `serde_json::Value` into the binary [`Value`] tree,
/// the step performed once on first fetch before the JSON cache file is
/// rewritten in binary form.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}
