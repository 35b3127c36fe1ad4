//! Common test utilities shared across integration tests.

use std::sync::{Arc, Mutex};

use keeper_core::config::{Environment, VaultConfig};
use keeper_core::notification::{Notification, Notifier};
use keeper_core::storage::{BlobStore, FileBlobStore, InMemoryBlobStore, StoragePaths};
use keeper_core::Vault;
use serde_json::json;

pub const PASSWORD: &str = "correct horse battery staple";

pub fn test_config() -> VaultConfig {
    VaultConfig::for_environment(Environment::Test)
}

/// Fresh in-memory vault with the password set up and a mnemonic saved.
pub fn unlocked_vault() -> Vault {
    unlocked_vault_with(test_config())
}

pub fn unlocked_vault_with(config: VaultConfig) -> Vault {
    let store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
    let vault = Vault::builder(store).config(config).build();
    vault.setup_password(PASSWORD).expect("setup password");
    let phrase = vault
        .lock_controller()
        .generate_mnemonic()
        .expect("generate mnemonic");
    vault
        .lock_controller()
        .save_mnemonic(&phrase)
        .expect("save mnemonic");
    vault
}

#[allow(dead_code, reason = "used in tests")]
pub fn file_vault(root: &std::path::Path) -> Vault {
    let store = FileBlobStore::open(StoragePaths::new(root)).expect("open file store");
    Vault::builder(Arc::new(store)).config(test_config()).build()
}

#[allow(dead_code, reason = "used in tests")]
pub fn sample_credential(subject: &str) -> String {
    json!({
        "@context": ["https://www.w3.org/2018/credentials/v1"],
        "id": format!("urn:uuid:{subject}"),
        "type": ["VerifiableCredential", "UniversityDegreeCredential"],
        "issuer": "did:example:issuer",
        "issuanceDate": "2024-01-01T00:00:00Z",
        "credentialSubject": { "id": subject, "degree": "BSc" }
    })
    .to_string()
}

#[allow(dead_code, reason = "used in tests")]
#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen
            .lock()
            .expect("notifier mutex")
            .push(notification.clone());
    }
}
