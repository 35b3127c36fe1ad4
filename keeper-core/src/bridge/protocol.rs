//! Wire format of the bridge.
//!
//! Requests are `{ method, payload, nonce }`. Responses are
//! `{ nonce, payload: [error, result] }` where `nonce` is either the numeric
//! nonce of the request being answered or the name of a forwarded event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

use crate::backup::BackupBundle;
use crate::events::EventName;

/// Every method the bridge server dispatches. Wire names are the kebab-case variant names.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RpcMethod {
    Unlock,
    Lock,
    GetStatus,
    SetupPassword,
    GenerateMnemonic,
    SaveMnemonic,
    CreateIdentity,
    SetActiveIdentity,
    SetIdentityName,
    DeleteIdentity,
    DeleteAllIdentities,
    GetIdentities,
    GetIdentityCommitments,
    GetActiveIdentity,
    RevealCommitment,
    AddCredential,
    RejectCredential,
    RenameCredential,
    DeleteCredential,
    DeleteAllCredentials,
    GetCredentials,
    ApproveHost,
    IsHostApproved,
    GetHostPermissions,
    SetHostPermissions,
    RemoveHost,
    /// Development builds only.
    ClearApprovedHosts,
    GetHistory,
    DeleteHistoryOperation,
    DeleteAllHistory,
    EnableHistory,
    DownloadBackup,
    UploadBackup,
    PrepareSemaphoreProof,
    PrepareRlnProof,
}

impl RpcMethod {
    /// Methods that run without an unlocked session.
    #[must_use]
    pub const fn is_unprivileged(self) -> bool {
        matches!(
            self,
            Self::Unlock | Self::Lock | Self::GetStatus | Self::SetupPassword
        )
    }
}

/// A call from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// Method to run.
    pub method: RpcMethod,
    /// Method arguments; `null` when there are none.
    #[serde(default)]
    pub payload: Value,
    /// Correlates the response.
    pub nonce: u64,
}

/// Response correlation: a call nonce, or an event tag for pushed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nonce {
    /// Answer to the request with this nonce.
    Call(u64),
    /// An event forwarded from the vault.
    Event(EventName),
}

/// `[error, result]` pair. Exactly one side is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload(pub Option<String>, pub Value);

impl ResponsePayload {
    /// A successful result.
    #[must_use]
    pub const fn ok(result: Value) -> Self {
        Self(None, result)
    }

    /// A failure carrying the error's display text.
    #[must_use]
    pub fn err(error: impl ToString) -> Self {
        Self(Some(error.to_string()), Value::Null)
    }

    /// Converts to a `Result`, the error being the remote message.
    ///
    /// # Errors
    ///
    /// The remote error message, if any.
    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Self(Some(error), _) => Err(error),
            Self(None, result) => Ok(result),
        }
    }
}

/// A message from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// What this message answers.
    pub nonce: Nonce,
    /// Outcome.
    pub payload: ResponsePayload,
}

/// `{ password }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordPayload {
    pub password: String,
}

/// `{ mnemonic }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MnemonicPayload {
    pub mnemonic: String,
}

/// `{ identityCommitment }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPayload {
    pub identity_commitment: String,
}

/// `{ identityCommitment, name }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameIdentityPayload {
    pub identity_commitment: String,
    pub name: String,
}

/// `{ serializedCredential, credentialName? }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCredentialPayload {
    pub serialized_credential: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_name: Option<String>,
}

/// `{ credentialHash }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPayload {
    pub credential_hash: String,
}

/// `{ credentialHash, credentialName }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameCredentialPayload {
    pub credential_hash: String,
    pub credential_name: String,
}

/// `{ host }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPayload {
    pub host: String,
}

/// `{ host, canSkipApprove }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPermissionPayload {
    pub host: String,
    #[serde(default)]
    pub can_skip_approve: bool,
}

/// `{ id }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPayload {
    pub id: String,
}

/// `{ enabled }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableHistoryPayload {
    pub enabled: bool,
}

/// `{ backupPassword }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBackupPayload {
    pub backup_password: String,
}

/// `{ backupPassword, content }`
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBackupPayload {
    pub backup_password: String,
    pub content: BackupBundle,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = RequestMessage {
            method: RpcMethod::GetIdentityCommitments,
            payload: Value::Null,
            nonce: 7,
        };
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({ "method": "get-identity-commitments", "payload": null, "nonce": 7 })
        );
    }

    #[test]
    fn test_response_nonce_is_number_or_event() {
        let call: ResponseMessage =
            serde_json::from_value(json!({ "nonce": 3, "payload": [null, true] }))
                .expect("deserialize");
        assert_eq!(call.nonce, Nonce::Call(3));
        assert_eq!(call.payload.into_result(), Ok(json!(true)));

        let event: ResponseMessage =
            serde_json::from_value(json!({ "nonce": "identity-changed", "payload": [null, {}] }))
                .expect("deserialize");
        assert_eq!(event.nonce, Nonce::Event(EventName::IdentityChanged));
    }

    #[test]
    fn test_error_payload() {
        let payload = ResponsePayload::err("Keeper is locked");
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!(["Keeper is locked", null])
        );
    }

    #[test]
    fn test_method_names_round_trip_through_strum() {
        for method in RpcMethod::iter() {
            let wire = serde_json::to_value(method).expect("serialize");
            assert_eq!(wire, json!(method.to_string()));
        }
        assert_eq!(
            "prepare-rln-proof".parse::<RpcMethod>().expect("parse"),
            RpcMethod::PrepareRlnProof
        );
    }
}
