//! Backup commands: download, upload.

use std::path::PathBuf;

use clap::Subcommand;
use eyre::WrapErr;
use keeper_core::backup::BackupBundle;
use keeper_core::bridge::RpcMethod;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Subcommand)]
pub enum BackupAction {
    /// Export every collection as an encrypted, authenticated bundle.
    Download {
        /// Where to write the bundle. Printed when omitted.
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Password protecting the bundle.
        #[arg(long, env = "KEEPER_BACKUP_PASSWORD", hide_env_values = true)]
        backup_password: String,
    },
    /// Import a bundle, merging it into the vault.
    Upload {
        /// Bundle produced by `backup download`.
        file: PathBuf,
        /// Password protecting the bundle.
        #[arg(long, env = "KEEPER_BACKUP_PASSWORD", hide_env_values = true)]
        backup_password: String,
    },
}

pub async fn run(action: BackupAction, session: &Session) -> eyre::Result<Value> {
    match action {
        BackupAction::Download {
            out,
            backup_password,
        } => {
            let bundle = session
                .call(
                    RpcMethod::DownloadBackup,
                    json!({ "backupPassword": backup_password }),
                )
                .await?;
            let Some(out) = out else {
                return Ok(bundle);
            };
            std::fs::write(&out, serde_json::to_vec_pretty(&bundle)?)
                .wrap_err_with(|| format!("cannot write {}", out.display()))?;
            tracing::info!(path = %out.display(), "backup written");
            Ok(json!({ "path": out }))
        }
        BackupAction::Upload {
            file,
            backup_password,
        } => {
            let raw = std::fs::read(&file)
                .wrap_err_with(|| format!("cannot read {}", file.display()))?;
            let bundle: BackupBundle =
                serde_json::from_slice(&raw).wrap_err("not a backup bundle")?;
            session
                .call(
                    RpcMethod::UploadBackup,
                    json!({ "backupPassword": backup_password, "content": bundle }),
                )
                .await
        }
    }
}
