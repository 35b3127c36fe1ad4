//! Verifiable credential commands.

use std::path::PathBuf;

use clap::Subcommand;
use eyre::WrapErr;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum CredentialAction {
    /// Store a credential read from a JSON file.
    Add {
        /// Path to the serialized credential.
        file: PathBuf,
        /// Display name.
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored credentials.
    List,
    /// Rename a credential.
    Rename {
        /// Credential hash.
        hash: String,
        /// New display name.
        name: String,
    },
    /// Delete a credential.
    Delete {
        /// Credential hash.
        hash: String,
    },
    /// Delete every credential.
    DeleteAll,
}

pub async fn run(action: CredentialAction, session: &Session) -> eyre::Result<Value> {
    match action {
        CredentialAction::Add { file, name } => {
            let serialized = std::fs::read_to_string(&file)
                .wrap_err_with(|| format!("cannot read {}", file.display()))?;
            session
                .call(
                    RpcMethod::AddCredential,
                    json!({ "serializedCredential": serialized, "credentialName": name }),
                )
                .await
        }
        CredentialAction::List => session.call(RpcMethod::GetCredentials, ()).await,
        CredentialAction::Rename { hash, name } => {
            session
                .call(
                    RpcMethod::RenameCredential,
                    json!({ "credentialHash": hash, "credentialName": name }),
                )
                .await
        }
        CredentialAction::Delete { hash } => {
            session
                .call(RpcMethod::DeleteCredential, json!({ "credentialHash": hash }))
                .await
        }
        CredentialAction::DeleteAll => session.call(RpcMethod::DeleteAllCredentials, ()).await,
    }
}
