//! Per-host trust decisions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collection::{EncryptedCollection, JsonCodec, Keyed};
use crate::config::Environment;
use crate::crypto::{CryptoEngine, KeySource};
use crate::error::{VaultError, VaultResult};
use crate::events::{EventBus, EventName};
use crate::lock::LockController;
use crate::storage::{BlobStore, CollectionKey};

/// Stored approval of one host. Absence means the host is not approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPermission {
    /// Origin the approval applies to.
    pub host: String,
    /// When `true`, requests from the host skip the confirmation prompt.
    pub can_skip_approve: bool,
}

impl Keyed for HostPermission {
    fn key(&self) -> String {
        self.host.clone()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalChanged<'a> {
    host: &'a str,
    approved: bool,
    can_skip_approve: bool,
}

/// Approved-hosts collection.
pub struct ApprovalService {
    approvals: EncryptedCollection<JsonCodec<HostPermission>>,
    events: EventBus,
    environment: Environment,
}

impl fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalService")
            .field("approvals", &self.approvals)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl ApprovalService {
    /// Creates the service over the `@APPROVED@` blob.
    #[must_use]
    pub fn new(
        lock: Arc<LockController>,
        store: Arc<dyn BlobStore>,
        crypto: CryptoEngine,
        events: EventBus,
        environment: Environment,
    ) -> Self {
        Self {
            approvals: EncryptedCollection::new(
                CollectionKey::Approvals,
                KeySource::Password,
                lock,
                store,
                crypto,
            ),
            events,
            environment,
        }
    }

    /// Underlying collection, for backups.
    #[must_use]
    pub const fn collection(&self) -> &EncryptedCollection<JsonCodec<HostPermission>> {
        &self.approvals
    }

    /// Approves `host`. An existing approval is left untouched and `false` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn approve_host(&self, host: &str, can_skip_approve: bool) -> VaultResult<bool> {
        let host = validate_host(host)?;
        let inserted = self.approvals.insert(&HostPermission {
            host: host.to_string(),
            can_skip_approve,
        })?;
        if inserted {
            self.publish(host, true, can_skip_approve);
        }
        Ok(inserted)
    }

    /// Revokes the approval of `host`. Returns `false` if it was not approved.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn remove_host(&self, host: &str) -> VaultResult<bool> {
        let host = normalize_host(host);
        let removed = self.approvals.remove(host)?;
        if removed {
            self.publish(host, false, false);
        }
        Ok(removed)
    }

    /// Returns `true` if `host` is approved.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn is_approved(&self, host: &str) -> VaultResult<bool> {
        self.approvals.contains(normalize_host(host))
    }

    /// Returns `true` if `host` is approved and may skip confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn can_skip_approve(&self, host: &str) -> VaultResult<bool> {
        Ok(self.get_permission(host)?.can_skip_approve)
    }

    /// Permission of `host`; unknown hosts cannot skip approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn get_permission(&self, host: &str) -> VaultResult<HostPermission> {
        let host = normalize_host(host);
        Ok(self.approvals.get(host)?.unwrap_or_else(|| HostPermission {
            host: host.to_string(),
            can_skip_approve: false,
        }))
    }

    /// Sets the permission of `host`, approving it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be written.
    pub fn set_permission(&self, host: &str, can_skip_approve: bool) -> VaultResult<HostPermission> {
        let permission = HostPermission {
            host: validate_host(host)?.to_string(),
            can_skip_approve,
        };
        self.approvals.upsert(&permission)?;
        self.publish(&permission.host, true, can_skip_approve);
        Ok(permission)
    }

    /// Approved hosts, in approval order.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    pub fn allowed_hosts(&self) -> VaultResult<Vec<String>> {
        self.approvals.keys()
    }

    /// Forgets every approval. Only available in development and test environments.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotSupported`] in production.
    pub fn clear(&self) -> VaultResult<()> {
        if !self.environment.is_dev() {
            return Err(VaultError::NotSupported(format!(
                "clearing approvals in {}",
                self.environment
            )));
        }
        self.approvals.clear()
    }

    fn publish(&self, host: &str, approved: bool, can_skip_approve: bool) {
        self.events.publish(
            EventName::HostApprovalChanged,
            ApprovalChanged {
                host,
                approved,
                can_skip_approve,
            },
        );
    }
}

/// Hosts are keyed without surrounding whitespace on every path.
fn normalize_host(host: &str) -> &str {
    host.trim()
}

fn validate_host(host: &str) -> VaultResult<&str> {
    let host = normalize_host(host);
    if host.is_empty() {
        return Err(VaultError::InvalidPayload("host is required".into()));
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::crypto::KdfParams;
    use crate::storage::InMemoryBlobStore;

    fn service(environment: Environment) -> (EventBus, ApprovalService) {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        let crypto = CryptoEngine::new(KdfParams::insecure_fast());
        let events = EventBus::new(16);
        let lock = Arc::new(LockController::new(
            crypto.clone(),
            Arc::clone(&store),
            events.clone(),
        ));
        lock.setup_password("pw").expect("setup");
        let service = ApprovalService::new(lock, store, crypto, events.clone(), environment);
        (events, service)
    }

    #[test]
    fn test_absent_host_is_not_approved() {
        let (_events, service) = service(Environment::Test);
        assert!(!service.is_approved("https://a.example").expect("is_approved"));
        assert!(!service.can_skip_approve("https://a.example").expect("can_skip"));
    }

    #[test]
    fn test_approve_once_vs_skip() {
        let (events, service) = service(Environment::Test);
        let mut rx = events.subscribe();

        assert!(service.approve_host("https://a.example", false).expect("approve"));
        assert!(!service.approve_host("https://a.example", true).expect("approve again"));
        assert!(service.is_approved("https://a.example").expect("is_approved"));
        assert!(!service.can_skip_approve("https://a.example").expect("can_skip"));

        let event = rx.try_recv().expect("event");
        assert_eq!(event.name, EventName::HostApprovalChanged);
        assert_eq!(
            event.payload,
            json!({ "host": "https://a.example", "approved": true, "canSkipApprove": false })
        );
        assert!(rx.try_recv().is_err());

        let permission = service
            .set_permission("https://a.example", true)
            .expect("set");
        assert!(permission.can_skip_approve);
        assert!(service.can_skip_approve("https://a.example").expect("can_skip"));
    }

    #[test]
    fn test_remove_and_list() {
        let (_events, service) = service(Environment::Test);
        service.approve_host("https://a.example", false).expect("approve");
        service.set_permission("https://b.example", true).expect("set");
        assert_eq!(
            service.allowed_hosts().expect("hosts"),
            vec!["https://a.example", "https://b.example"]
        );

        assert!(service.remove_host("https://a.example").expect("remove"));
        assert!(!service.remove_host("https://a.example").expect("remove again"));
        assert_eq!(service.allowed_hosts().expect("hosts"), vec!["https://b.example"]);

        assert!(matches!(
            service.approve_host("  ", false),
            Err(VaultError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_padded_host_resolves_on_every_path() {
        let (_events, service) = service(Environment::Test);
        let padded = " https://a.example ";
        assert!(service.approve_host(padded, true).expect("approve"));

        assert!(service.is_approved(padded).expect("is_approved"));
        assert!(service.is_approved("https://a.example").expect("is_approved"));
        assert!(service.can_skip_approve(padded).expect("can_skip"));
        assert_eq!(
            service.get_permission(padded).expect("permission").host,
            "https://a.example"
        );

        assert!(service.remove_host(padded).expect("remove"));
        assert!(!service.is_approved("https://a.example").expect("is_approved"));
    }

    #[test]
    fn test_clear_is_dev_only() {
        let (_events, prod) = service(Environment::Production);
        prod.approve_host("https://a.example", false).expect("approve");
        assert!(matches!(prod.clear(), Err(VaultError::NotSupported(_))));
        assert!(prod.is_approved("https://a.example").expect("is_approved"));

        let (_events, dev) = service(Environment::Development);
        dev.approve_host("https://a.example", false).expect("approve");
        dev.clear().expect("clear");
        assert!(dev.allowed_hosts().expect("hosts").is_empty());
    }
}
