//! Host approval commands.

use clap::Subcommand;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum HostAction {
    /// Approve a host.
    Approve {
        /// Host origin, e.g. `https://app.example`.
        host: String,
        /// Let the host skip future confirmation prompts.
        #[arg(long)]
        skip_approve: bool,
    },
    /// Check whether a host is approved.
    Check {
        /// Host origin.
        host: String,
    },
    /// Show or change a host's permissions.
    Permission {
        /// Host origin.
        host: String,
        /// New value for `canSkipApprove`. Omit to show the current permissions.
        #[arg(long)]
        skip_approve: Option<bool>,
    },
    /// Revoke a host's approval.
    Remove {
        /// Host origin.
        host: String,
    },
    /// Revoke every approval. Development environments only.
    Clear,
}

pub async fn run(action: HostAction, session: &Session) -> eyre::Result<Value> {
    match action {
        HostAction::Approve { host, skip_approve } => {
            session
                .call(
                    RpcMethod::ApproveHost,
                    json!({ "host": host, "canSkipApprove": skip_approve }),
                )
                .await
        }
        HostAction::Check { host } => {
            session
                .call(RpcMethod::IsHostApproved, json!({ "host": host }))
                .await
        }
        HostAction::Permission {
            host,
            skip_approve: None,
        } => {
            session
                .call(RpcMethod::GetHostPermissions, json!({ "host": host }))
                .await
        }
        HostAction::Permission {
            host,
            skip_approve: Some(skip_approve),
        } => {
            session
                .call(
                    RpcMethod::SetHostPermissions,
                    json!({ "host": host, "canSkipApprove": skip_approve }),
                )
                .await
        }
        HostAction::Remove { host } => {
            session
                .call(RpcMethod::RemoveHost, json!({ "host": host }))
                .await
        }
        HostAction::Clear => session.call(RpcMethod::ClearApprovedHosts, ()).await,
    }
}
