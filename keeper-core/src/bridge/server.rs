use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use super::protocol::{
    AddCredentialPayload, CredentialPayload, DownloadBackupPayload, EnableHistoryPayload,
    HostPayload, HostPermissionPayload, IdentityPayload, MnemonicPayload, Nonce,
    OperationPayload, PasswordPayload, RenameCredentialPayload, RenameIdentityPayload,
    RequestMessage, ResponseMessage, ResponsePayload, RpcMethod, UploadBackupPayload,
};
use crate::error::{VaultError, VaultResult};
use crate::events::Event;
use crate::identity::{CreateIdentityRequest, IdentitySummary};
use crate::proof::{RlnProofRequest, SemaphoreProofRequest};
use crate::vault::Vault;

/// Vault side of the bridge.
///
/// Requests are handled one at a time, in arrival order. Vault events are
/// forwarded to the client between requests.
pub struct BridgeServer {
    vault: Arc<Vault>,
    inbound: mpsc::UnboundedReceiver<RequestMessage>,
    outbound: mpsc::UnboundedSender<ResponseMessage>,
    events: broadcast::Receiver<Event>,
}

impl fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeServer").finish_non_exhaustive()
    }
}

impl BridgeServer {
    /// Creates a server for `vault`, subscribing to its events immediately.
    #[must_use]
    pub fn new(
        vault: Arc<Vault>,
        inbound: mpsc::UnboundedReceiver<RequestMessage>,
        outbound: mpsc::UnboundedSender<ResponseMessage>,
    ) -> Self {
        let events = vault.subscribe();
        Self {
            vault,
            inbound,
            outbound,
            events,
        }
    }

    /// Serves until the client hangs up.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.inbound.recv() => {
                    let Some(request) = request else { break };
                    let response = self.handle(request);
                    if self.outbound.send(response).is_err() {
                        break;
                    }
                }
                event = self.events.recv() => match event {
                    Ok(event) => {
                        let message = ResponseMessage {
                            nonce: Nonce::Event(event.name),
                            payload: ResponsePayload::ok(event.payload),
                        };
                        if self.outbound.send(message).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "bridge dropped vault events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("bridge server stopped");
    }

    /// Runs one request and wraps the outcome for the wire.
    #[must_use]
    pub fn handle(&self, request: RequestMessage) -> ResponseMessage {
        let RequestMessage {
            method,
            payload,
            nonce,
        } = request;
        let payload = match self.dispatch(method, payload) {
            Ok(result) => ResponsePayload::ok(result),
            Err(error) => {
                tracing::debug!(nonce, %method, %error, "request failed");
                ResponsePayload::err(error)
            }
        };
        ResponseMessage {
            nonce: Nonce::Call(nonce),
            payload,
        }
    }

    fn dispatch(&self, method: RpcMethod, payload: Value) -> VaultResult<Value> {
        let vault = &*self.vault;
        if !method.is_unprivileged() {
            vault.lock_controller().ensure(()).ok_or(VaultError::Locked)?;
        }

        match method {
            RpcMethod::Unlock => {
                let PasswordPayload { password } = parse(payload)?;
                respond(vault.unlock(&password)?)
            }
            RpcMethod::Lock => respond(vault.lock_controller().lock()?),
            RpcMethod::GetStatus => respond(vault.lock_controller().status()?),
            RpcMethod::SetupPassword => {
                let PasswordPayload { password } = parse(payload)?;
                respond(vault.setup_password(&password)?)
            }
            RpcMethod::GenerateMnemonic => respond(vault.lock_controller().generate_mnemonic()?),
            RpcMethod::SaveMnemonic => {
                let MnemonicPayload { mnemonic } = parse(payload)?;
                respond(vault.lock_controller().save_mnemonic(&mnemonic)?)
            }

            RpcMethod::CreateIdentity => {
                let request: CreateIdentityRequest = parse(payload)?;
                respond(vault.identities().create_identity(request)?)
            }
            RpcMethod::SetActiveIdentity => {
                let IdentityPayload {
                    identity_commitment,
                } = parse(payload)?;
                respond(vault.identities().set_active_identity(&identity_commitment)?)
            }
            RpcMethod::SetIdentityName => {
                let RenameIdentityPayload {
                    identity_commitment,
                    name,
                } = parse(payload)?;
                respond(
                    vault
                        .identities()
                        .set_identity_name(&identity_commitment, &name)?,
                )
            }
            RpcMethod::DeleteIdentity => {
                let IdentityPayload {
                    identity_commitment,
                } = parse(payload)?;
                respond(vault.identities().delete_identity(&identity_commitment)?)
            }
            RpcMethod::DeleteAllIdentities => {
                respond(vault.identities().delete_all_identities()?)
            }
            RpcMethod::GetIdentities => respond(vault.identities().get_identities()?),
            RpcMethod::GetIdentityCommitments => {
                respond(vault.identities().get_identity_commitments()?)
            }
            RpcMethod::GetActiveIdentity => respond(
                vault
                    .identities()
                    .get_active_identity()?
                    .as_ref()
                    .map(IdentitySummary::from),
            ),
            RpcMethod::RevealCommitment => {
                respond(vault.identities().reveal_active_commitment()?)
            }

            RpcMethod::AddCredential => {
                let AddCredentialPayload {
                    serialized_credential,
                    credential_name,
                } = parse(payload)?;
                respond(
                    vault
                        .credentials()
                        .add_credential(&serialized_credential, credential_name.as_deref())?,
                )
            }
            RpcMethod::RejectCredential => {
                respond(vault.credentials().reject_credential_request()?)
            }
            RpcMethod::RenameCredential => {
                let RenameCredentialPayload {
                    credential_hash,
                    credential_name,
                } = parse(payload)?;
                respond(
                    vault
                        .credentials()
                        .rename_credential(&credential_hash, &credential_name)?,
                )
            }
            RpcMethod::DeleteCredential => {
                let CredentialPayload { credential_hash } = parse(payload)?;
                respond(vault.credentials().delete_credential(&credential_hash)?)
            }
            RpcMethod::DeleteAllCredentials => {
                respond(vault.credentials().delete_all_credentials()?)
            }
            RpcMethod::GetCredentials => respond(vault.credentials().get_all_credentials()?),

            RpcMethod::ApproveHost => {
                let HostPermissionPayload {
                    host,
                    can_skip_approve,
                } = parse(payload)?;
                respond(vault.approvals().approve_host(&host, can_skip_approve)?)
            }
            RpcMethod::IsHostApproved => {
                let HostPayload { host } = parse(payload)?;
                respond(vault.approvals().is_approved(&host)?)
            }
            RpcMethod::GetHostPermissions => {
                let HostPayload { host } = parse(payload)?;
                respond(vault.approvals().get_permission(&host)?)
            }
            RpcMethod::SetHostPermissions => {
                let HostPermissionPayload {
                    host,
                    can_skip_approve,
                } = parse(payload)?;
                respond(vault.approvals().set_permission(&host, can_skip_approve)?)
            }
            RpcMethod::RemoveHost => {
                let HostPayload { host } = parse(payload)?;
                respond(vault.approvals().remove_host(&host)?)
            }
            RpcMethod::ClearApprovedHosts => respond(vault.approvals().clear()?),

            RpcMethod::GetHistory => respond(vault.history().get_operations()?),
            RpcMethod::DeleteHistoryOperation => {
                let OperationPayload { id } = parse(payload)?;
                respond(vault.history().delete_operation(&id)?)
            }
            RpcMethod::DeleteAllHistory => respond(vault.history().clear()?),
            RpcMethod::EnableHistory => {
                let EnableHistoryPayload { enabled } = parse(payload)?;
                vault.history().set_enabled(enabled);
                respond(enabled)
            }

            RpcMethod::DownloadBackup => {
                let DownloadBackupPayload { backup_password } = parse(payload)?;
                respond(vault.backup().download_backup(&backup_password)?)
            }
            RpcMethod::UploadBackup => {
                let UploadBackupPayload {
                    backup_password,
                    content,
                } = parse(payload)?;
                respond(vault.backup().upload_backup(&content, &backup_password)?)
            }

            RpcMethod::PrepareSemaphoreProof => {
                let request: SemaphoreProofRequest = parse(payload)?;
                respond(vault.proofs().prepare_semaphore_proof(&request)?)
            }
            RpcMethod::PrepareRlnProof => {
                let request: RlnProofRequest = parse(payload)?;
                respond(vault.proofs().prepare_rln_proof(&request)?)
            }
        }
    }
}

/// Decodes a request payload; `null` reads as an empty object.
fn parse<T: DeserializeOwned>(payload: Value) -> VaultResult<T> {
    let payload = if payload.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        payload
    };
    serde_json::from_value(payload).map_err(|err| VaultError::InvalidPayload(err.to_string()))
}

fn respond(result: impl Serialize) -> VaultResult<Value> {
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{Environment, VaultConfig};

    fn server() -> BridgeServer {
        let vault = Arc::new(Vault::in_memory(VaultConfig::for_environment(
            Environment::Test,
        )));
        let (_requests, inbound) = mpsc::unbounded_channel();
        let (outbound, _responses) = mpsc::unbounded_channel();
        BridgeServer::new(vault, inbound, outbound)
    }

    fn call(server: &BridgeServer, method: RpcMethod, payload: Value) -> ResponsePayload {
        server
            .handle(RequestMessage {
                method,
                payload,
                nonce: 1,
            })
            .payload
    }

    #[test]
    fn test_privileged_methods_require_unlock() {
        let server = server();
        assert_eq!(
            call(&server, RpcMethod::GetIdentities, Value::Null),
            ResponsePayload::err(VaultError::Locked)
        );
        let status = call(&server, RpcMethod::GetStatus, Value::Null)
            .into_result()
            .expect("status");
        assert_eq!(status["isInitialized"], false);
    }

    #[test]
    fn test_setup_then_identity_flow() {
        let server = server();
        call(&server, RpcMethod::SetupPassword, json!({ "password": "pw" }))
            .into_result()
            .expect("setup");

        let commitment = call(&server, RpcMethod::CreateIdentity, json!({ "name": "alice" }))
            .into_result()
            .expect("create");
        let commitments = call(&server, RpcMethod::GetIdentityCommitments, Value::Null)
            .into_result()
            .expect("commitments");
        assert_eq!(commitments, json!([commitment]));

        let active = call(&server, RpcMethod::GetActiveIdentity, Value::Null)
            .into_result()
            .expect("active");
        assert_eq!(active["metadata"]["name"], "alice");
    }

    #[test]
    fn test_bad_payload_is_reported() {
        let server = server();
        let response = call(&server, RpcMethod::SetupPassword, json!({ "pass": 1 }));
        let error = response.into_result().expect_err("should fail");
        assert!(error.starts_with("invalid_payload"), "{error}");
    }
}
