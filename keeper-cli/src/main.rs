//! Keeper developer CLI.
//!
//! Opens the file-backed vault under the data directory, unlocks it with the
//! supplied password and runs one bridge request per invocation.

mod commands;
mod output;
mod session;

use std::path::PathBuf;

use clap::Parser;
use eyre::WrapErr;
use keeper_core::config::Environment;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::session::Session;

/// Keeper: encrypted vault for zero-knowledge identities and credentials.
#[derive(Debug, Parser)]
#[command(name = "keeper", version, about)]
pub struct Cli {
    /// Directory holding the vault blobs. Defaults to the platform data directory.
    #[arg(long, global = true, env = "KEEPER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Vault password.
    #[arg(long, global = true, env = "KEEPER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Environment selecting key-derivation cost and developer-only methods.
    #[arg(long = "env", global = true, env = "KEEPER_ENV", default_value = "production")]
    environment: Environment,

    /// Print single-line JSON instead of pretty JSON.
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

/// Options every command handler sees.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub data_dir: PathBuf,
    pub password: Option<String>,
    pub environment: Environment,
}

impl GlobalOpts {
    fn from_cli(cli: &Cli) -> eyre::Result<Self> {
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| eyre::eyre!("no platform data directory; pass --data-dir"))?
                .join("keeper"),
        };
        Ok(Self {
            data_dir,
            password: cli.password.clone(),
            environment: cli.environment,
        })
    }

    /// The password, or an error naming how to provide it.
    pub fn require_password(&self) -> eyre::Result<&str> {
        self.password
            .as_deref()
            .filter(|password| !password.is_empty())
            .ok_or_else(|| eyre::eyre!("a password is required (--password or KEEPER_PASSWORD)"))
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let compact = cli.compact;
    let result = run(cli).await?;
    output::print(&result, compact)
}

/// Executes the parsed invocation and returns the bridge result.
pub async fn run(cli: Cli) -> eyre::Result<serde_json::Value> {
    let opts = GlobalOpts::from_cli(&cli)?;
    let session = Session::open(&opts).wrap_err("failed to open vault")?;
    tracing::debug!(data_dir = %opts.data_dir.display(), "vault opened");

    if cli.command.requires_session() {
        session.unlock(opts.require_password()?).await?;
    }
    cli.command.execute(&session, &opts).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(dir: &std::path::Path, args: &[&str]) -> Cli {
        let mut argv = vec![
            "keeper",
            "--env",
            "test",
            "--password",
            "pw",
            "--data-dir",
        ];
        let dir = dir.to_str().expect("utf-8 path");
        argv.push(dir);
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    }

    #[tokio::test]
    async fn test_init_create_and_list() {
        let dir = tempfile::tempdir().expect("tempdir");

        let status = run(cli(dir.path(), &["init"])).await.expect("init");
        assert_eq!(status["isUnlocked"], true);

        let commitment = run(cli(dir.path(), &["identity", "create", "--name", "alice"]))
            .await
            .expect("create");
        assert!(commitment.is_string());

        let identities = run(cli(dir.path(), &["identity", "list"]))
            .await
            .expect("list");
        assert_eq!(identities[0]["commitment"], commitment);
        assert_eq!(identities[0]["metadata"]["name"], "alice");
    }

    #[tokio::test]
    async fn test_wrong_password_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        run(cli(dir.path(), &["init"])).await.expect("init");

        let argv = [
            "keeper",
            "--env",
            "test",
            "--password",
            "nope",
            "--data-dir",
            dir.path().to_str().expect("utf-8 path"),
            "identity",
            "list",
        ];
        let err = run(Cli::try_parse_from(argv).expect("parse"))
            .await
            .expect_err("wrong password");
        assert!(format!("{err:#}").contains("Incorrect password"));
    }

    #[test]
    fn test_status_needs_no_password() {
        let cli = Cli::try_parse_from(["keeper", "status"]).expect("parse");
        assert!(!cli.command.requires_session());
        let cli = Cli::try_parse_from(["keeper", "identity", "list"]).expect("parse");
        assert!(cli.command.requires_session());
    }
}
