//! Generic encrypted key→entity map persisted as one blob.
//!
//! Every collection is a single ciphertext that decrypts to an ordered JSON
//! array of `[key, serialized_entity]` pairs. Reads rebuild the map from the
//! blob, mutations re-encrypt and rewrite the whole blob.

mod codec;

use std::marker::PhantomData;
use std::sync::Arc;

pub use codec::{EntityCodec, JsonCodec, Keyed};

use crate::crypto::{CryptoEngine, KeySource};
use crate::error::{VaultError, VaultResult};
use crate::lock::LockController;
use crate::storage::{BlobStore, CollectionKey};

/// Decrypted collection contents in insertion order.
pub type Entries = Vec<(String, String)>;

/// Encrypted store for the entities handled by codec `C`.
pub struct EncryptedCollection<C: EntityCodec> {
    key: CollectionKey,
    source: KeySource,
    lock: Arc<LockController>,
    store: Arc<dyn BlobStore>,
    crypto: CryptoEngine,
    _codec: PhantomData<fn() -> C>,
}

impl<C: EntityCodec> std::fmt::Debug for EncryptedCollection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCollection")
            .field("key", &self.key)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<C: EntityCodec> EncryptedCollection<C> {
    /// Creates a collection persisted under `key`, sealed with the session key for `source`.
    #[must_use]
    pub fn new(
        key: CollectionKey,
        source: KeySource,
        lock: Arc<LockController>,
        store: Arc<dyn BlobStore>,
        crypto: CryptoEngine,
    ) -> Self {
        Self {
            key,
            source,
            lock,
            store,
            crypto,
            _codec: PhantomData,
        }
    }

    /// Blob name of this collection.
    #[must_use]
    pub const fn key(&self) -> CollectionKey {
        self.key
    }

    /// Session key used to seal the blob.
    #[must_use]
    pub const fn source(&self) -> KeySource {
        self.source
    }

    /// Every entity, in insertion order.
    ///
    /// # Errors
    ///
    /// Fails as a whole if the blob cannot be decrypted or any entry cannot be decoded.
    pub fn get_all(&self) -> VaultResult<Vec<C::Entity>> {
        self.entries()?
            .iter()
            .map(|(_, raw)| C::deserialize(raw))
            .collect()
    }

    /// Raw decrypted `(key, serialized)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decrypted.
    pub fn entries(&self) -> VaultResult<Entries> {
        let Some(ciphertext) = self.read_ciphertext()? else {
            return Ok(Vec::new());
        };
        let plaintext = zeroize::Zeroizing::new(self.lock.decrypt(&ciphertext, self.source)?);
        parse_entries(&plaintext)
    }

    /// Keys in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decrypted.
    pub fn keys(&self) -> VaultResult<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }

    /// Looks up one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read, or the entry cannot be decoded.
    pub fn get(&self, key: &str) -> VaultResult<Option<C::Entity>> {
        self.entries()?
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, raw)| C::deserialize(raw))
            .transpose()
    }

    /// Returns `true` if `key` is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decrypted.
    pub fn contains(&self, key: &str) -> VaultResult<bool> {
        Ok(self.entries()?.iter().any(|(existing, _)| existing == key))
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decrypted.
    pub fn len(&self) -> VaultResult<usize> {
        Ok(self.entries()?.len())
    }

    /// Returns `true` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be read or decrypted.
    pub fn is_empty(&self) -> VaultResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Appends `entity`. Returns `false`, without writing, if its key is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read, encoded or written.
    pub fn insert(&self, entity: &C::Entity) -> VaultResult<bool> {
        let key = C::key_of(entity);
        let mut entries = self.entries()?;
        if entries.iter().any(|(existing, _)| *existing == key) {
            tracing::debug!(collection = %self.key, "duplicate key, insert skipped");
            return Ok(false);
        }
        entries.push((key, C::serialize(entity)?));
        self.write_entries(&entries)?;
        Ok(true)
    }

    /// Like [`EncryptedCollection::insert`] but reports a taken key as an error.
    ///
    /// # Errors
    ///
    /// [`VaultError::DuplicateKey`] if the key is taken.
    pub fn insert_unique(&self, entity: &C::Entity) -> VaultResult<()> {
        if self.insert(entity)? {
            Ok(())
        } else {
            Err(VaultError::DuplicateKey(C::key_of(entity)))
        }
    }

    /// Inserts `entity`, replacing any entity under the same key in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read, encoded or written.
    pub fn upsert(&self, entity: &C::Entity) -> VaultResult<()> {
        let key = C::key_of(entity);
        let raw = C::serialize(entity)?;
        let mut entries = self.entries()?;
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = raw,
            None => entries.push((key, raw)),
        }
        self.write_entries(&entries)
    }

    /// Applies `mutator` to the entity under `key`. Returns `false` when absent.
    ///
    /// The mutator must not change the entity's key.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read, decoded, encoded or
    /// written, or if the mutator changed the key.
    pub fn update<F>(&self, key: &str, mutator: F) -> VaultResult<bool>
    where
        F: FnOnce(&mut C::Entity),
    {
        let mut entries = self.entries()?;
        let Some(slot) = entries.iter_mut().find(|(existing, _)| existing == key) else {
            return Ok(false);
        };

        let mut entity = C::deserialize(&slot.1)?;
        mutator(&mut entity);
        if C::key_of(&entity) != key {
            return Err(VaultError::InvalidPayload(format!(
                "update changed the key of {key}"
            )));
        }
        slot.1 = C::serialize(&entity)?;
        self.write_entries(&entries)?;
        Ok(true)
    }

    /// Like [`EncryptedCollection::update`] but reports a missing key as an error.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] if nothing is stored under `key`.
    pub fn update_existing<F>(&self, key: &str, mutator: F) -> VaultResult<()>
    where
        F: FnOnce(&mut C::Entity),
    {
        if self.update(key, mutator)? {
            Ok(())
        } else {
            Err(VaultError::NotFound(key.to_string()))
        }
    }

    /// Deletes the entity under `key`. Returns `false` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read or written.
    pub fn remove(&self, key: &str) -> VaultResult<bool> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|(existing, _)| existing != key);
        if entries.len() == before {
            return Ok(false);
        }
        self.write_entries(&entries)?;
        Ok(true)
    }

    /// Deletes the whole blob, whether or not the session is unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub fn clear(&self) -> VaultResult<()> {
        self.store.delete(self.key.as_str())?;
        tracing::debug!(collection = %self.key, "collection cleared");
        Ok(())
    }

    /// Replaces the contents with `entries`, after checking every entry decodes.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the stored blob untouched, if any entry is invalid.
    pub fn replace_all(&self, entries: &Entries) -> VaultResult<()> {
        for (_, raw) in entries {
            C::deserialize(raw)?;
        }
        self.write_entries(entries)
    }

    pub(crate) fn read_ciphertext(&self) -> VaultResult<Option<String>> {
        self.store
            .read(self.key.as_str())?
            .map(|blob| {
                String::from_utf8(blob).map_err(|err| VaultError::Serialization(err.to_string()))
            })
            .transpose()
    }

    pub(crate) fn write_ciphertext(&self, ciphertext: &str) -> VaultResult<()> {
        self.store
            .write_atomic(self.key.as_str(), ciphertext.as_bytes())?;
        Ok(())
    }

    pub(crate) const fn lock(&self) -> &Arc<LockController> {
        &self.lock
    }

    pub(crate) const fn crypto(&self) -> &CryptoEngine {
        &self.crypto
    }

    fn write_entries(&self, entries: &Entries) -> VaultResult<()> {
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(entries)?);
        let ciphertext = self.lock.encrypt(&plaintext, self.source)?;
        self.write_ciphertext(&ciphertext)?;
        tracing::debug!(collection = %self.key, entries = entries.len(), "collection written");
        Ok(())
    }
}

/// Parses a decrypted blob, rejecting duplicate keys.
pub(crate) fn parse_entries(plaintext: &[u8]) -> VaultResult<Entries> {
    let entries: Entries = serde_json::from_slice(plaintext)?;
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    for (key, _) in &entries {
        if !seen.insert(key.as_str()) {
            return Err(VaultError::DuplicateKey(key.clone()));
        }
    }
    Ok(entries)
}
