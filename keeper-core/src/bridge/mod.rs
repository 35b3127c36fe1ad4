//! In-process RPC bridge between an unprivileged caller and the vault.
//!
//! The caller holds a [`BridgeClient`]; the vault side runs a
//! [`BridgeServer`]. They exchange [`RequestMessage`]s and
//! [`ResponseMessage`]s over unbounded channels, correlated by nonce. Vault
//! events travel on the response channel under an event-name nonce.

mod client;
mod listeners;
pub mod protocol;
mod server;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

pub use client::{BridgeClient, PendingCalls, ResponsePump};
pub use listeners::{EventListeners, Subscription};
pub use protocol::{Nonce, RequestMessage, ResponseMessage, ResponsePayload, RpcMethod};
pub use server::BridgeServer;

use crate::vault::Vault;

/// Client-side call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The channel closed before a response arrived.
    #[error("bridge channel torn down")]
    ChannelTeardown,
    /// The server answered with an error.
    #[error("{0}")]
    Remote(String),
    /// A payload or result could not be (de)serialized.
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Wires a client to a server for `vault` without starting either.
///
/// Drive the returned [`ResponsePump`] and [`BridgeServer`] with
/// `tokio::spawn`, or use [`connect`].
#[must_use]
pub fn channel(vault: Arc<Vault>) -> (BridgeClient, ResponsePump, BridgeServer) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let server = BridgeServer::new(vault, request_rx, response_tx);
    let (client, pump) = BridgeClient::new(request_tx, response_rx);
    (client, pump, server)
}

/// Spawns the server and response pump for `vault` on the current runtime.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
#[must_use]
pub fn connect(vault: Arc<Vault>) -> BridgeClient {
    let (client, pump, server) = channel(vault);
    tokio::spawn(server.run());
    tokio::spawn(pump.run());
    client
}
