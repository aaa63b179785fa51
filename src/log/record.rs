//! Log record definitions
//!
//! One record per line: a JSON object with a string `key` and an optional
//! `val`. A missing or null `val` is a tombstone.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Byte that terminates every record in the log
pub const RECORD_TERMINATOR: u8 = b'\n';

/// A single record in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The key this record sets or deletes
    pub key: String,

    /// The new value; `None` deletes the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,
}

impl Record {
    /// Build a record from a key and an optional value.
    /// `Value::Null` is normalized to a tombstone.
    pub fn new(key: impl Into<String>, val: Option<Value>) -> Self {
        Self {
            key: key.into(),
            val: val.filter(|v| !v.is_null()),
        }
    }

    /// Build a tombstone record
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self::new(key, None)
    }

    pub fn is_tombstone(&self) -> bool {
        self.val.is_none()
    }

    /// Serialize to a terminated line ready for appending
    pub fn encode(&self) -> Result<Bytes> {
        let json = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(json.len() + 1);
        buf.put_slice(&json);
        buf.put_u8(RECORD_TERMINATOR);
        Ok(buf.freeze())
    }

    /// Parse one line (without its terminator). Only JSON objects are
    /// records; arrays that happen to fit the field layout are rejected.
    pub fn decode(line: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(line)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("record is not a JSON object"));
        }
        serde_json::from_value(value)
    }
}
