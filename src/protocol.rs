//! Document representation on the wire between a store and this crate.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Field holding a document's identifier
pub const ID_FIELD: &str = "_id";

/// Maximum encoded document size (16MB)
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Schema-free document body
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Encoding formats
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
  #[default]
  MessagePack = 0x01,
  Json = 0x02,
}

impl TryFrom<u8> for Encoding {
  type Error = ();
  fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
    match v {
      0x01 => Ok(Self::MessagePack),
      0x02 => Ok(Self::Json),
      _ => Err(()),
    }
  }
}

/// Document identifier, stored as a hyphenated UUID string under `_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }

  pub fn as_uuid(&self) -> &Uuid {
    &self.0
  }
}

impl Default for DocumentId {
  fn default() -> Self {
    Self::new()
  }
}

impl From<Uuid> for DocumentId {
  fn from(id: Uuid) -> Self {
    Self(id)
  }
}

impl FromStr for DocumentId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Uuid::parse_str(s)
      .map(Self)
      .map_err(|e| Error::Serialization(format!("invalid document id {s:?}: {e}")))
  }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl From<DocumentId> for serde_json::Value {
  fn from(id: DocumentId) -> Self {
    serde_json::Value::String(id.to_string())
  }
}

/// A single encoded document as yielded by a cursor.
///
/// Decoding is deferred to the consumer so that the element type is chosen
/// by whoever holds the target container.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
  encoding: Encoding,
  bytes: Vec<u8>,
}

impl RawDocument {
  /// Encode a value, rejecting documents larger than [`MAX_DOCUMENT_SIZE`].
  pub fn encode<T: Serialize + ?Sized>(value: &T, encoding: Encoding) -> Result<Self> {
    let bytes = match encoding {
      Encoding::MessagePack => rmp_serde::to_vec_named(value)?,
      Encoding::Json => serde_json::to_vec(value)?,
    };
    if bytes.len() > MAX_DOCUMENT_SIZE {
      return Err(Error::Serialization(format!(
        "document of {} bytes exceeds maximum of {} bytes",
        bytes.len(),
        MAX_DOCUMENT_SIZE
      )));
    }
    Ok(Self { encoding, bytes })
  }

  /// Wrap bytes received from a store without inspecting them.
  pub fn from_bytes(encoding: Encoding, bytes: Vec<u8>) -> Self {
    Self { encoding, bytes }
  }

  pub fn encoding(&self) -> Encoding {
    self.encoding
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Decode into a fresh `T`. Any structural mismatch is a [`Error::Decode`].
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    match self.encoding {
      Encoding::MessagePack => {
        rmp_serde::from_slice(&self.bytes).map_err(|e| Error::Decode(e.to_string()))
      }
      Encoding::Json => {
        serde_json::from_slice(&self.bytes).map_err(|e| Error::Decode(e.to_string()))
      }
    }
  }
}
