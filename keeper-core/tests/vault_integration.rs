mod common;

use keeper_core::backup::{BackupPackage, MergePolicy};
use keeper_core::events::EventName;
use keeper_core::history::OperationType;
use keeper_core::identity::CreateIdentityRequest;
use keeper_core::storage::CollectionKey;
use keeper_core::{Vault, VaultError};

fn create_identity(vault: &Vault, name: &str) -> String {
    vault
        .identities()
        .create_identity(CreateIdentityRequest {
            name: Some(name.to_string()),
            ..CreateIdentityRequest::default()
        })
        .expect("create identity")
        .expect("new identity")
}

#[test]
fn test_setup_unlock_insert_get_delete_get() {
    let vault = Vault::in_memory(common::test_config());
    vault.setup_password(common::PASSWORD).expect("setup");
    vault.lock().expect("lock");
    assert!(vault.unlock(common::PASSWORD).expect("unlock"));

    let commitment = create_identity(&vault, "alice");
    let identities = vault.identities().get_identities().expect("get");
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].commitment, commitment);
    assert_eq!(identities[0].metadata.name, "alice");

    assert!(vault
        .identities()
        .delete_identity(&commitment)
        .expect("delete"));
    assert!(vault.identities().get_identities().expect("get").is_empty());
    assert!(vault
        .identities()
        .get_active_identity()
        .expect("active")
        .is_none());
}

#[test]
fn test_second_setup_is_rejected() {
    let vault = Vault::in_memory(common::test_config());
    vault.setup_password(common::PASSWORD).expect("setup");
    assert!(matches!(
        vault.setup_password("another"),
        Err(VaultError::AlreadyInitialized)
    ));
    vault.lock().expect("lock");
    assert!(vault.unlock(common::PASSWORD).expect("original password"));
}

#[test]
fn test_unlock_errors_are_distinct() {
    let vault = Vault::in_memory(common::test_config());
    assert!(matches!(
        vault.unlock(common::PASSWORD),
        Err(VaultError::NoCipherText)
    ));

    vault.setup_password(common::PASSWORD).expect("setup");
    vault.lock().expect("lock");
    assert!(matches!(
        vault.unlock("wrong"),
        Err(VaultError::IncorrectPassword)
    ));
    assert!(!vault.status().expect("status").is_unlocked);
}

#[test]
fn test_backup_round_trip_between_vaults() {
    let source = common::unlocked_vault();
    let alice = create_identity(&source, "alice");
    let bob = create_identity(&source, "bob");
    assert!(source
        .credentials()
        .add_credential(&common::sample_credential("did:example:alice"), Some("Degree"))
        .expect("add credential"));
    source
        .approvals()
        .approve_host("https://app.example", true)
        .expect("approve");

    let bundle = source.backup().download_backup("backup-pw").expect("download");
    assert_eq!(bundle.collections.len(), 3);
    for package in bundle.collections.values() {
        assert!(!package.ciphertext.contains("alice"));
    }

    let target = common::unlocked_vault();
    target
        .backup()
        .upload_backup(&bundle, "backup-pw")
        .expect("upload");

    assert_eq!(
        target
            .identities()
            .get_identity_commitments()
            .expect("commitments"),
        vec![alice, bob]
    );
    let credentials = target.credentials().get_all_credentials().expect("credentials");
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].metadata.name, "Degree");
    assert!(target
        .approvals()
        .can_skip_approve("https://app.example")
        .expect("permission"));

    let kinds: Vec<_> = source
        .history()
        .get_operations()
        .expect("history")
        .into_iter()
        .map(|operation| operation.kind)
        .collect();
    assert_eq!(kinds.last(), Some(&OperationType::DownloadBackup));
}

#[test]
fn test_upload_into_empty_vault_selects_an_active_identity() {
    let source = common::unlocked_vault();
    let alice = create_identity(&source, "alice");
    let bundle = source.backup().download_backup("backup-pw").expect("download");

    let target = common::unlocked_vault();
    assert!(target
        .identities()
        .get_active_identity()
        .expect("active")
        .is_none());
    target
        .backup()
        .upload_backup(&bundle, "backup-pw")
        .expect("upload");

    let active = target
        .identities()
        .get_active_identity()
        .expect("active")
        .expect("selected after upload");
    assert_eq!(active.commitment(), alice);
    assert_eq!(
        target
            .identities()
            .reveal_active_commitment()
            .expect("reveal"),
        alice
    );
}

#[test]
fn test_upload_keeps_the_current_active_identity() {
    let source = common::unlocked_vault();
    create_identity(&source, "imported");
    let bundle = source.backup().download_backup("backup-pw").expect("download");

    let target = common::unlocked_vault();
    let local = create_identity(&target, "local");
    target
        .backup()
        .upload_backup(&bundle, "backup-pw")
        .expect("upload");

    let active = target
        .identities()
        .get_active_identity()
        .expect("active")
        .expect("still selected");
    assert_eq!(active.commitment(), local);
}

#[test]
fn test_wrong_backup_password_changes_nothing() {
    let source = common::unlocked_vault();
    create_identity(&source, "alice");
    let bundle = source.backup().download_backup("backup-pw").expect("download");

    let target = common::unlocked_vault();
    let existing = create_identity(&target, "local");
    assert!(matches!(
        target.backup().upload_backup(&bundle, "not-the-password"),
        Err(VaultError::Authentication)
    ));
    assert_eq!(
        target
            .identities()
            .get_identity_commitments()
            .expect("commitments"),
        vec![existing]
    );
}

#[test]
fn test_tampered_package_is_rejected() {
    let source = common::unlocked_vault();
    create_identity(&source, "alice");
    let mut bundle = source.backup().download_backup("backup-pw").expect("download");
    let package = bundle
        .collections
        .get_mut(CollectionKey::Identities.as_str())
        .expect("identities package");
    *package = BackupPackage {
        ciphertext: format!("{}AAAA", package.ciphertext),
        tag: package.tag.clone(),
    };

    let target = common::unlocked_vault();
    assert!(matches!(
        target.backup().upload_backup(&bundle, "backup-pw"),
        Err(VaultError::Authentication)
    ));
}

#[test]
fn test_unknown_collection_is_rejected() {
    let source = common::unlocked_vault();
    create_identity(&source, "alice");
    let mut bundle = source.backup().download_backup("backup-pw").expect("download");
    let package = bundle
        .collections
        .values()
        .next()
        .cloned()
        .expect("package");
    bundle.collections.insert("@@UNKNOWN@@".to_string(), package);

    let target = common::unlocked_vault();
    assert!(matches!(
        target.backup().upload_backup(&bundle, "backup-pw"),
        Err(VaultError::InvalidBackupFormat(_))
    ));
    assert!(target
        .identities()
        .get_identities()
        .expect("identities")
        .is_empty());
}

fn merged_permission(policy: MergePolicy) -> bool {
    let source = common::unlocked_vault();
    source
        .approvals()
        .approve_host("https://app.example", true)
        .expect("approve");
    let bundle = source.backup().download_backup("backup-pw").expect("download");

    let target = common::unlocked_vault_with(common::test_config().with_merge_policy(policy));
    target
        .approvals()
        .approve_host("https://app.example", false)
        .expect("approve");
    target
        .backup()
        .upload_backup(&bundle, "backup-pw")
        .expect("upload");
    target
        .approvals()
        .can_skip_approve("https://app.example")
        .expect("permission")
}

#[test]
fn test_merge_policy_overwrite() {
    assert!(merged_permission(MergePolicy::Overwrite));
}

#[test]
fn test_merge_policy_preserve_existing() {
    assert!(!merged_permission(MergePolicy::PreserveExisting));
}

#[test]
fn test_backup_requires_session() {
    let vault = common::unlocked_vault();
    let bundle = vault.backup().download_backup("backup-pw").expect("download");
    vault.lock().expect("lock");
    assert!(matches!(
        vault.backup().download_backup("backup-pw"),
        Err(VaultError::Locked)
    ));
    assert!(matches!(
        vault.backup().upload_backup(&bundle, "backup-pw"),
        Err(VaultError::Locked)
    ));
}

#[test]
fn test_file_vault_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let commitment = {
        let vault = common::file_vault(dir.path());
        vault.setup_password(common::PASSWORD).expect("setup");
        create_identity(&vault, "persisted")
    };

    let vault = common::file_vault(dir.path());
    let status = vault.status().expect("status");
    assert!(status.is_initialized);
    assert!(!status.is_unlocked);

    vault.unlock(common::PASSWORD).expect("unlock");
    let active = vault
        .identities()
        .get_active_identity()
        .expect("active")
        .expect("selected");
    assert_eq!(active.commitment(), commitment);
}

#[test]
fn test_login_and_logout_events() {
    let vault = Vault::in_memory(common::test_config());
    let mut events = vault.subscribe();

    vault.setup_password(common::PASSWORD).expect("setup");
    vault.lock().expect("lock");

    let login = events.try_recv().expect("login event");
    assert_eq!(login.name, EventName::Login);
    assert_eq!(login.payload["isUnlocked"], true);
    let logout = events.try_recv().expect("logout event");
    assert_eq!(logout.name, EventName::Logout);
    assert_eq!(logout.payload["isUnlocked"], false);
}

#[test]
fn test_raw_storage_download_and_restore() {
    let source = common::unlocked_vault();
    let commitment = create_identity(&source, "raw");
    let raw = source.backup().download_storage().expect("download storage");
    assert!(raw[CollectionKey::Identities.as_str()].is_string());
    assert!(raw[CollectionKey::Approvals.as_str()].is_null());

    source.identities().delete_all_identities().expect("delete all");
    source.backup().restore_storage(&raw).expect("restore");
    assert_eq!(
        source
            .identities()
            .get_identity_commitments()
            .expect("commitments"),
        vec![commitment.clone()]
    );
    let active = source
        .identities()
        .get_active_identity()
        .expect("active")
        .expect("selected after restore");
    assert_eq!(active.commitment(), commitment);
}
