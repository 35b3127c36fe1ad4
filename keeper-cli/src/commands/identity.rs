//! Identity commands.

use clap::Subcommand;
use keeper_core::bridge::RpcMethod;
use keeper_core::identity::{CreateIdentityRequest, IdentityStrategy};
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum IdentityAction {
    /// Create an identity and make it active.
    Create {
        /// Display name. Defaults to `Account #<n>`.
        #[arg(long)]
        name: Option<String>,
        /// Creation strategy (`random` or `interrep`).
        #[arg(long, default_value = "random")]
        strategy: IdentityStrategy,
        /// Wallet signature seeding an `interrep` identity.
        #[arg(long)]
        signature: Option<String>,
        /// Wallet account that produced the signature.
        #[arg(long)]
        account: Option<String>,
        /// Groups to record. Repeatable.
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    /// List identities.
    List,
    /// Show the active identity.
    Active,
    /// Select the active identity.
    Use {
        /// Identity commitment.
        commitment: String,
    },
    /// Rename an identity.
    Rename {
        /// Identity commitment.
        commitment: String,
        /// New display name.
        name: String,
    },
    /// Delete an identity.
    Delete {
        /// Identity commitment.
        commitment: String,
    },
    /// Delete every identity.
    DeleteAll,
}

pub async fn run(action: IdentityAction, session: &Session) -> eyre::Result<Value> {
    match action {
        IdentityAction::Create {
            name,
            strategy,
            signature,
            account,
            groups,
        } => {
            let request = CreateIdentityRequest {
                strategy,
                name,
                message_signature: signature,
                account,
                groups,
                ..CreateIdentityRequest::default()
            };
            session.call(RpcMethod::CreateIdentity, request).await
        }
        IdentityAction::List => session.call(RpcMethod::GetIdentities, ()).await,
        IdentityAction::Active => session.call(RpcMethod::GetActiveIdentity, ()).await,
        IdentityAction::Use { commitment } => {
            session
                .call(
                    RpcMethod::SetActiveIdentity,
                    json!({ "identityCommitment": commitment }),
                )
                .await
        }
        IdentityAction::Rename { commitment, name } => {
            session
                .call(
                    RpcMethod::SetIdentityName,
                    json!({ "identityCommitment": commitment, "name": name }),
                )
                .await
        }
        IdentityAction::Delete { commitment } => {
            session
                .call(
                    RpcMethod::DeleteIdentity,
                    json!({ "identityCommitment": commitment }),
                )
                .await
        }
        IdentityAction::DeleteAll => session.call(RpcMethod::DeleteAllIdentities, ()).await,
    }
}
