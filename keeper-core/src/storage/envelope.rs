//! Versioned on-disk framing for file-backed blobs.

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};

const ENVELOPE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct BlobEnvelope {
    pub(crate) version: u32,
    pub(crate) name: String,
    #[serde(with = "serde_bytes_compat")]
    pub(crate) bytes: Vec<u8>,
    pub(crate) updated_at: u64,
}

impl BlobEnvelope {
    pub(crate) fn new(name: &str, bytes: Vec<u8>, now: u64) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            name: name.to_string(),
            bytes,
            updated_at: now,
        }
    }

    pub(crate) fn serialize(&self) -> StorageResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(self, &mut out)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(out)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedEnvelopeVersion(envelope.version));
        }
        Ok(envelope)
    }
}

/// Encodes the payload as a CBOR byte string instead of an array of integers.
mod serde_bytes_compat {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        ciborium::value::Value::deserialize(deserializer).and_then(|value| match value {
            ciborium::value::Value::Bytes(bytes) => Ok(bytes),
            other => Err(serde::de::Error::custom(format!(
                "expected byte string, found {other:?}"
            ))),
        })
    }
}
