//! Subcommands. Each maps onto one or more bridge methods.

pub mod backup;
pub mod credential;
pub mod history;
pub mod host;
pub mod identity;
pub mod mnemonic;

use clap::Subcommand;
use eyre::WrapErr;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;
use crate::GlobalOpts;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the vault password. Fails if one is already set.
    Init,
    /// Show whether the vault is initialized and has a saved mnemonic.
    Status,
    /// Recovery phrase.
    Mnemonic {
        #[command(subcommand)]
        action: mnemonic::MnemonicAction,
    },
    /// Zero-knowledge identities.
    Identity {
        #[command(subcommand)]
        action: identity::IdentityAction,
    },
    /// Verifiable credentials.
    Credential {
        #[command(subcommand)]
        action: credential::CredentialAction,
    },
    /// Approved hosts.
    Host {
        #[command(subcommand)]
        action: host::HostAction,
    },
    /// Operation history.
    History {
        #[command(subcommand)]
        action: history::HistoryAction,
    },
    /// Encrypted backups.
    Backup {
        #[command(subcommand)]
        action: backup::BackupAction,
    },
    /// Send a raw bridge request, e.g. `call get-identities`.
    Call {
        /// Method name.
        method: RpcMethod,
        /// JSON payload.
        payload: Option<String>,
    },
}

impl Command {
    /// `true` when the vault must be unlocked before the command runs.
    pub const fn requires_session(&self) -> bool {
        match self {
            Self::Init | Self::Status => false,
            Self::Call { method, .. } => !method.is_unprivileged(),
            _ => true,
        }
    }

    pub async fn execute(self, session: &Session, opts: &GlobalOpts) -> eyre::Result<Value> {
        match self {
            Self::Init => {
                let password = opts.require_password()?;
                session
                    .call(RpcMethod::SetupPassword, json!({ "password": password }))
                    .await
            }
            Self::Status => session.call(RpcMethod::GetStatus, ()).await,
            Self::Mnemonic { action } => mnemonic::run(action, session).await,
            Self::Identity { action } => identity::run(action, session).await,
            Self::Credential { action } => credential::run(action, session).await,
            Self::Host { action } => host::run(action, session).await,
            Self::History { action } => history::run(action, session).await,
            Self::Backup { action } => backup::run(action, session).await,
            Self::Call { method, payload } => {
                let payload = match payload {
                    Some(raw) => serde_json::from_str(&raw).wrap_err("payload is not JSON")?,
                    None => Value::Null,
                };
                session.call(method, payload).await
            }
        }
    }
}
