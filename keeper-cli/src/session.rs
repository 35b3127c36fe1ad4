//! Vault session for a single CLI invocation.

use std::sync::Arc;

use eyre::WrapErr;
use keeper_core::bridge::{self, BridgeClient, RpcMethod};
use keeper_core::config::VaultConfig;
use keeper_core::storage::{FileBlobStore, StoragePaths};
use keeper_core::Vault;
use serde::Serialize;
use serde_json::{json, Value};

use crate::GlobalOpts;

/// A file-backed vault reached through an in-process bridge.
pub struct Session {
    client: BridgeClient,
}

impl Session {
    /// Opens the vault under `opts.data_dir` and starts the bridge.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(opts: &GlobalOpts) -> eyre::Result<Self> {
        let store = FileBlobStore::open(StoragePaths::new(&opts.data_dir))
            .wrap_err_with(|| format!("cannot open {}", opts.data_dir.display()))?;
        let vault = Vault::builder(Arc::new(store))
            .config(VaultConfig::for_environment(opts.environment))
            .build();
        Ok(Self {
            client: bridge::connect(Arc::new(vault)),
        })
    }

    /// Unlocks the vault. A wrong password is an error, not `false`.
    pub async fn unlock(&self, password: &str) -> eyre::Result<()> {
        let unlocked: bool = self
            .client
            .request(RpcMethod::Unlock, json!({ "password": password }))
            .await?;
        eyre::ensure!(unlocked, "vault did not unlock");
        Ok(())
    }

    /// Sends one request and returns the raw result.
    pub async fn call(&self, method: RpcMethod, payload: impl Serialize) -> eyre::Result<Value> {
        tracing::debug!(%method, "bridge call");
        self.client
            .call(method, payload)
            .await
            .wrap_err_with(|| format!("{method} failed"))
    }
}
