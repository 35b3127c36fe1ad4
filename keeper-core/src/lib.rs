//! `keeper-core` is the secret-management core of a zero-knowledge identity
//! wallet.
//!
//! It keeps identities, verifiable credentials and per-host approvals encrypted
//! at rest behind a single session lock, exports them as authenticated
//! backups, and exposes everything through a nonce-correlated RPC bridge.
//!
//! ```rust
//! use keeper_core::{config::{Environment, VaultConfig}, Vault};
//!
//! let vault = Vault::in_memory(VaultConfig::for_environment(Environment::Test));
//! vault.setup_password("correct horse").unwrap();
//! assert!(vault.status().unwrap().is_unlocked);
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod approval;
pub mod backup;
pub mod bridge;
pub mod collection;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod events;
pub mod history;
pub mod identity;
pub mod lock;
pub mod logger;
pub mod notification;
pub mod proof;
pub mod storage;
pub mod validation;

mod error;
pub use error::{VaultError, VaultResult};

mod vault;
pub use vault::{Vault, VaultBuilder};
