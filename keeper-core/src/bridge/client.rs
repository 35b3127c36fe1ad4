use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::listeners::{EventListeners, Subscription};
use super::protocol::{Nonce, RequestMessage, ResponseMessage, RpcMethod};
use super::BridgeError;
use crate::events::EventName;

type Reply = oneshot::Sender<Result<Value, BridgeError>>;

/// Outstanding calls by nonce.
#[derive(Default)]
pub struct PendingCalls {
    calls: HashMap<u64, Reply>,
    closed: bool,
}

impl PendingCalls {
    fn register(&mut self, nonce: u64, reply: Reply) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::ChannelTeardown);
        }
        self.calls.insert(nonce, reply);
        Ok(())
    }

    fn resolve(&mut self, nonce: u64) -> Option<Reply> {
        self.calls.remove(&nonce)
    }

    fn close(&mut self) -> Vec<(u64, Reply)> {
        self.closed = true;
        self.calls.drain().collect()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// `true` when no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

struct ClientInner {
    next_nonce: AtomicU64,
    pending: Mutex<PendingCalls>,
    outbound: mpsc::UnboundedSender<RequestMessage>,
    listeners: EventListeners,
}

/// Caller side of the bridge.
///
/// Each call gets a fresh nonce and parks a one-shot continuation in the
/// pending table until the matching response arrives. Cloning shares the
/// nonce counter, the table and the listener registry.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("next_nonce", &self.inner.next_nonce.load(Ordering::SeqCst))
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Creates a client sending requests on `outbound`. Responses must be fed
    /// back through the returned [`ResponsePump`].
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<RequestMessage>,
        inbound: mpsc::UnboundedReceiver<ResponseMessage>,
    ) -> (Self, ResponsePump) {
        let client = Self {
            inner: Arc::new(ClientInner {
                next_nonce: AtomicU64::new(0),
                pending: Mutex::new(PendingCalls::default()),
                outbound,
                listeners: EventListeners::new(),
            }),
        };
        let pump = ResponsePump {
            client: client.clone(),
            inbound,
        };
        (client, pump)
    }

    /// Sends `method` and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Remote`] with the server's error message.
    /// - [`BridgeError::ChannelTeardown`] if the channel closed first.
    /// - [`BridgeError::Serialization`] if `payload` is not serializable.
    pub async fn call(
        &self,
        method: RpcMethod,
        payload: impl Serialize,
    ) -> Result<Value, BridgeError> {
        let payload = serde_json::to_value(payload)?;
        let nonce = self.inner.next_nonce.fetch_add(1, Ordering::SeqCst);
        let (reply, response) = oneshot::channel();
        self.pending().register(nonce, reply)?;

        let request = RequestMessage {
            method,
            payload,
            nonce,
        };
        if self.inner.outbound.send(request).is_err() {
            self.teardown();
            return Err(BridgeError::ChannelTeardown);
        }
        tracing::trace!(nonce, %method, "request sent");

        response.await.map_err(|_| BridgeError::ChannelTeardown)?
    }

    /// [`BridgeClient::call`] with the result decoded into `T`.
    ///
    /// # Errors
    ///
    /// See [`BridgeClient::call`]; [`BridgeError::Serialization`] if the result does not decode.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        payload: impl Serialize,
    ) -> Result<T, BridgeError> {
        let value = self.call(method, payload).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Registers `handler` for events named `event`.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn on<F>(&self, event: EventName, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.on(event, handler)
    }

    /// The client's listener registry.
    #[must_use]
    pub fn listeners(&self) -> &EventListeners {
        &self.inner.listeners
    }

    /// Routes one inbound message. Event messages go to the listeners; call
    /// responses settle their pending call. Unknown nonces are ignored.
    pub fn handle_response(&self, message: ResponseMessage) {
        match message.nonce {
            Nonce::Event(event) => {
                if let Err(error) = message.payload.clone().into_result() {
                    tracing::warn!(%event, %error, "event carried an error");
                    return;
                }
                self.inner.listeners.emit(event, &message.payload.1);
            }
            Nonce::Call(nonce) => {
                let Some(reply) = self.pending().resolve(nonce) else {
                    tracing::debug!(nonce, "response for unknown nonce");
                    return;
                };
                let result = message.payload.into_result().map_err(BridgeError::Remote);
                if reply.send(result).is_err() {
                    tracing::debug!(nonce, "caller went away before the response");
                }
            }
        }
    }

    /// Rejects every outstanding call with [`BridgeError::ChannelTeardown`].
    /// Later calls fail the same way.
    pub fn teardown(&self) {
        let outstanding = self.pending().close();
        if !outstanding.is_empty() {
            tracing::debug!(calls = outstanding.len(), "rejecting outstanding calls");
        }
        for (_, reply) in outstanding {
            let _ = reply.send(Err(BridgeError::ChannelTeardown));
        }
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Feeds server messages into a [`BridgeClient`]; tears the client down when
/// the channel closes.
pub struct ResponsePump {
    client: BridgeClient,
    inbound: mpsc::UnboundedReceiver<ResponseMessage>,
}

impl fmt::Debug for ResponsePump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePump").finish_non_exhaustive()
    }
}

impl ResponsePump {
    /// Runs until the server side hangs up.
    pub async fn run(mut self) {
        while let Some(message) = self.inbound.recv().await {
            self.client.handle_response(message);
        }
        tracing::debug!("bridge channel closed");
        self.client.teardown();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bridge::protocol::ResponsePayload;

    fn client() -> (
        BridgeClient,
        mpsc::UnboundedReceiver<RequestMessage>,
        ResponsePump,
    ) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (_responses, inbound) = mpsc::unbounded_channel();
        let (client, pump) = BridgeClient::new(outbound, inbound);
        (client, requests, pump)
    }

    #[tokio::test]
    async fn test_nonces_increase_and_responses_correlate() {
        let (client, mut requests, _pump) = client();

        let first = tokio::spawn({
            let client = client.clone();
            async move { client.call(RpcMethod::GetStatus, ()).await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.call(RpcMethod::GetIdentities, ()).await }
        });

        let a = requests.recv().await.expect("request");
        let b = requests.recv().await.expect("request");
        assert_ne!(a.nonce, b.nonce);

        // Answer out of order.
        for request in [&b, &a] {
            client.handle_response(ResponseMessage {
                nonce: Nonce::Call(request.nonce),
                payload: ResponsePayload::ok(json!(request.method.to_string())),
            });
        }

        assert_eq!(first.await.expect("join").expect("call"), json!("get-status"));
        assert_eq!(
            second.await.expect("join").expect("call"),
            json!("get-identities")
        );
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_error() {
        let (client, mut requests, _pump) = client();
        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call(RpcMethod::GetIdentities, ()).await }
        });
        let request = requests.recv().await.expect("request");
        client.handle_response(ResponseMessage {
            nonce: Nonce::Call(request.nonce),
            payload: ResponsePayload::err("Keeper is locked"),
        });
        assert!(matches!(
            call.await.expect("join"),
            Err(BridgeError::Remote(message)) if message == "Keeper is locked"
        ));
    }

    #[tokio::test]
    async fn test_teardown_rejects_outstanding_and_future_calls() {
        let (client, mut requests, _pump) = client();
        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call(RpcMethod::Lock, ()).await }
        });
        requests.recv().await.expect("request");

        client.teardown();
        assert!(matches!(
            call.await.expect("join"),
            Err(BridgeError::ChannelTeardown)
        ));
        assert!(matches!(
            client.call(RpcMethod::Lock, ()).await,
            Err(BridgeError::ChannelTeardown)
        ));
    }

    #[test]
    fn test_unknown_nonce_is_ignored_and_events_go_to_listeners() {
        let (client, _requests, _pump) = client();
        client.handle_response(ResponseMessage {
            nonce: Nonce::Call(99),
            payload: ResponsePayload::ok(Value::Null),
        });

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _subscription = client.on(EventName::Logout, move |payload| {
            *sink.lock().expect("lock") = Some(payload.clone());
        });
        client.handle_response(ResponseMessage {
            nonce: Nonce::Event(EventName::Logout),
            payload: ResponsePayload::ok(json!({ "isUnlocked": false })),
        });
        assert_eq!(
            *seen.lock().expect("lock"),
            Some(json!({ "isUnlocked": false }))
        );
    }

    #[tokio::test]
    async fn test_pump_tears_down_on_close() {
        let (outbound, mut requests) = mpsc::unbounded_channel();
        let (responses, inbound) = mpsc::unbounded_channel::<ResponseMessage>();
        let (client, pump) = BridgeClient::new(outbound, inbound);
        let pump = tokio::spawn(pump.run());

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call(RpcMethod::GetStatus, ()).await }
        });
        requests.recv().await.expect("request");
        drop(responses);

        pump.await.expect("pump");
        assert!(matches!(
            call.await.expect("join"),
            Err(BridgeError::ChannelTeardown)
        ));
    }
}
