//! Operation history commands.

use clap::Subcommand;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    /// List recorded operations, oldest first.
    List,
    /// Delete one operation.
    Delete {
        /// Operation id.
        id: String,
    },
    /// Delete every operation.
    Clear,
}

pub async fn run(action: HistoryAction, session: &Session) -> eyre::Result<Value> {
    match action {
        HistoryAction::List => session.call(RpcMethod::GetHistory, ()).await,
        HistoryAction::Delete { id } => {
            session
                .call(RpcMethod::DeleteHistoryOperation, json!({ "id": id }))
                .await
        }
        HistoryAction::Clear => session.call(RpcMethod::DeleteAllHistory, ()).await,
    }
}
