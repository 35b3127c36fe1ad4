//! Mnemonic commands: generate, save.

use clap::Subcommand;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum MnemonicAction {
    /// Generate a fresh recovery phrase. Nothing is stored.
    Generate,
    /// Store a recovery phrase. Only one phrase can ever be saved.
    Save {
        /// The BIP-39 phrase, quoted.
        phrase: String,
    },
}

pub async fn run(action: MnemonicAction, session: &Session) -> eyre::Result<Value> {
    match action {
        MnemonicAction::Generate => session.call(RpcMethod::GenerateMnemonic, ()).await,
        MnemonicAction::Save { phrase } => {
            session
                .call(RpcMethod::SaveMnemonic, json!({ "mnemonic": phrase }))
                .await
        }
    }
}
