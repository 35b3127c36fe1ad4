use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::VaultResult;

/// Converts between an entity and the string stored in its collection.
pub trait EntityCodec: Send + Sync + 'static {
    /// The stored entity type.
    type Entity: Clone + Send + Sync;

    /// Encodes `entity` for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be encoded.
    fn serialize(entity: &Self::Entity) -> VaultResult<String>;

    /// Decodes a stored entity.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a valid encoding.
    fn deserialize(raw: &str) -> VaultResult<Self::Entity>;

    /// Unique key of `entity` within its collection.
    fn key_of(entity: &Self::Entity) -> String;
}

/// Entities that know their own collection key.
pub trait Keyed {
    /// Unique key within the collection.
    fn key(&self) -> String;
}

/// Codec storing entities as plain JSON.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> EntityCodec for JsonCodec<T>
where
    T: Keyed + Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Entity = T;

    fn serialize(entity: &T) -> VaultResult<String> {
        Ok(serde_json::to_string(entity)?)
    }

    fn deserialize(raw: &str) -> VaultResult<T> {
        Ok(serde_json::from_str(raw)?)
    }

    fn key_of(entity: &T) -> String {
        entity.key()
    }
}
