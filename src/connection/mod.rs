// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! The connection state machine.
//!
//! A [`Connection`] owns a framed stream and is the hub everything else
//! hangs off: it correlates outbound calls with their responses through
//! the pending table, dispatches inbound requests through the handler
//! chain, bridges cancellation in both directions, coalesces batched
//! replies, and performs orderly teardown.
//!
//! One long-lived read loop per connection is driven by [`Connection::run`],
//! invoked exactly once by the owner. Handlers for inbound requests each
//! run on their own task, gated so that handler N starts only after
//! handler N-1 has replied or explicitly released the ordering gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub mod handler;

pub(crate) mod batch;

use crate::config::{ConnectionConfig, Validate};
use crate::error::{CoreError, CoreResult};
use crate::framing::stream::{Inbound, RpcStream, StreamReader, StreamWriter};
use crate::protocol::jsonrpc::{ErrorObject, Id, Message, Payload, Request, Response};

use self::batch::{BatchDisposition, BatchLedger};
use self::handler::{Handler, MustReply, ReleaseHandle, Replier, ReplySink, RequestCtx};

// Lifecycle states, strictly increasing.
const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const SHUTTING_DOWN: u8 = 2;
const TERMINATED: u8 = 3;

/// A live, bidirectional JSON-RPC 2.0 connection.
///
/// Cloning is cheap and yields another handle to the same connection;
/// callers typically hand one clone to a task driving [`Connection::run`]
/// and issue calls from others.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    lifecycle: AtomicU8,
    /// Monotonic outbound call identifier; never reused within a connection.
    next_id: AtomicI64,
    /// Outbound call ID -> single-slot delivery channel for its response.
    pending: Mutex<HashMap<Id, oneshot::Sender<Response>>>,
    /// Inbound call ID -> cancellation handle, for the dispatch-to-reply
    /// interval.
    handling: Mutex<HashMap<Id, CancellationToken>>,
    batches: BatchLedger,
    /// Exclusive writer; acquired around each write, never held otherwise.
    /// Dropped at teardown to release the byte stream.
    writer: tokio::sync::Mutex<Option<StreamWriter>>,
    /// Reader, taken by the single `run` invocation.
    reader: Mutex<Option<StreamReader>>,
    /// Fired by `close` or teardown to stop the read loop and unblock
    /// callers.
    shutdown: CancellationToken,
    /// Fired once teardown has completed.
    terminated: CancellationToken,
    /// Parent of every inbound request's cancellation token.
    work_scope: CancellationToken,
    /// In-flight inbound handler count, for idle detection.
    inflight: AtomicUsize,
}

impl Connection {
    /// Opens a connection over an already-framed stream.
    pub fn new(stream: RpcStream, config: ConnectionConfig) -> CoreResult<Self> {
        config.validate()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                lifecycle: AtomicU8::new(CREATED),
                next_id: AtomicI64::new(1),
                pending: Mutex::new(HashMap::new()),
                handling: Mutex::new(HashMap::new()),
                batches: BatchLedger::new(),
                writer: tokio::sync::Mutex::new(Some(writer)),
                reader: Mutex::new(Some(reader)),
                shutdown: CancellationToken::new(),
                terminated: CancellationToken::new(),
                work_scope: CancellationToken::new(),
                inflight: AtomicUsize::new(0),
            }),
        })
    }

    /// Opens a connection over a byte reader/writer pair, applying the
    /// framing chosen in `config`.
    pub fn open<R, W>(reader: R, writer: W, config: ConnectionConfig) -> CoreResult<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stream = RpcStream::framed(reader, writer, config.framing, config.max_frame_bytes);
        Self::new(stream, config)
    }

    /// Issues a call and waits for its response.
    ///
    /// Returns the peer's result value, [`CoreError::Remote`] when the peer
    /// answers with an error, or [`CoreError::ConnectionClosed`] when the
    /// connection terminates first.
    pub async fn call(&self, method: &str, params: Option<Value>) -> CoreResult<Value> {
        self.call_with_token(method, params, &CancellationToken::new())
            .await
    }

    /// Issues a call that can be abandoned through `cancel`.
    ///
    /// When `cancel` fires while the call is pending, the configured
    /// cancellation notification is sent best-effort, the pending entry is
    /// removed, and the call returns [`CoreError::Cancelled`] promptly; a
    /// response arriving later is dropped.
    pub async fn call_with_token(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> CoreResult<Value> {
        self.inner.ensure_open()?;

        let id = Id::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        // The pending entry is installed strictly before the request bytes
        // are written; a fast response must always find its waiter.
        self.inner.pending.lock().insert(id.clone(), tx);

        let request = Request::call(method, params, id.clone());
        debug!(method, id = %id, "sending call");
        if let Err(e) = self.inner.write_message(Message::Request(request)).await {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        tokio::select! {
            outcome = rx => match outcome {
                Ok(response) => response.into_result().map_err(CoreError::Remote),
                // The sender is dropped only at teardown.
                Err(_) => Err(CoreError::ConnectionClosed),
            },
            _ = cancel.cancelled() => {
                self.inner.pending.lock().remove(&id);
                Arc::clone(&self.inner).spawn_cancel_notification(id);
                Err(CoreError::Cancelled)
            }
            _ = self.inner.shutdown.cancelled() => {
                self.inner.pending.lock().remove(&id);
                Err(CoreError::ConnectionClosed)
            }
        }
    }

    /// Issues a call with typed parameters and result.
    pub async fn call_typed<P, R>(&self, method: &str, params: Option<P>) -> CoreResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = params.map(serde_json::to_value).transpose()?;
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a notification; returns once the bytes have been handed to
    /// the transport. No response is awaited.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        self.inner.ensure_open()?;
        debug!(method, "sending notification");
        self.inner
            .write_message(Message::Request(Request::notification(method, params)))
            .await
    }

    /// Fires the cancellation token of an in-flight inbound call. No
    /// effect when no such call is in flight.
    pub fn cancel(&self, id: &Id) {
        self.inner.cancel_inbound(id);
    }

    /// Closes the connection: stops the read loop, unblocks every pending
    /// call with [`CoreError::ConnectionClosed`], cancels in-flight inbound
    /// handlers, and waits for teardown to complete. Idempotent.
    pub async fn close(&self) {
        let previous = self.inner.lifecycle.fetch_max(SHUTTING_DOWN, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        if previous == CREATED {
            // No run loop exists to perform teardown.
            self.inner.teardown();
        }
        self.inner.terminated.cancelled().await;
    }

    /// Completes once the connection has fully terminated.
    pub async fn closed(&self) {
        self.inner.terminated.cancelled().await;
    }

    /// Drives the read loop until the stream ends or fails, dispatching
    /// each decoded message. Invoked exactly once by the owner; returns
    /// `Ok(())` on clean end of input or local close.
    pub async fn run(&self, handler: Arc<dyn Handler>) -> CoreResult<()> {
        if let Err(actual) = self.inner.lifecycle.compare_exchange(
            CREATED,
            RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return if actual == RUNNING {
                Err(CoreError::InvalidState(
                    "run may only be invoked once per connection",
                ))
            } else {
                Err(CoreError::ConnectionClosed)
            };
        }

        let mut reader = self
            .inner
            .reader
            .lock()
            .take()
            .ok_or(CoreError::InvalidState("stream reader already taken"))?;
        let handler: Arc<dyn Handler> = Arc::new(MustReply::new(handler));

        let idle_timeout = self.inner.config.idle_timeout_ms.map(Duration::from_millis);
        let mut last_activity = tokio::time::Instant::now();
        // Ordering gate: receiver released by the previous inbound request.
        let mut previous_gate: Option<oneshot::Receiver<()>> = None;

        let result = loop {
            let idle_deadline = idle_timeout.map(|timeout| last_activity + timeout);
            let idle_wait = async move {
                match idle_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break Ok(()),
                _ = idle_wait => {
                    if self.inner.is_idle() {
                        break Err(CoreError::IdleTimeout);
                    }
                    last_activity = tokio::time::Instant::now();
                }
                next = reader.read() => match next {
                    Ok(Some(item)) => {
                        last_activity = tokio::time::Instant::now();
                        if let Err(e) = self.dispatch(item, &handler, &mut previous_gate).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e.into()),
                },
            }
        };

        self.inner.teardown();
        result
    }

    /// Routes one inbound stream item.
    async fn dispatch(
        &self,
        item: Inbound,
        handler: &Arc<dyn Handler>,
        previous_gate: &mut Option<oneshot::Receiver<()>>,
    ) -> CoreResult<()> {
        match item {
            Inbound::Malformed(fault) => {
                warn!(fault = %fault, "answering malformed inbound message");
                self.inner
                    .write_message(Message::Response(fault.to_response()))
                    .await
            }
            Inbound::Payload(Payload::Single(message)) => {
                self.dispatch_message(message, handler, previous_gate)
            }
            Inbound::Payload(Payload::Batch(messages)) => {
                let call_ids: Vec<Id> = messages
                    .iter()
                    .filter_map(|m| match m {
                        Message::Request(r) => r.id.clone(),
                        Message::Response(_) => None,
                    })
                    .collect();
                if !call_ids.is_empty() {
                    if let Err(fault) = self.inner.batches.register(call_ids) {
                        warn!(fault = %fault, "rejecting batch");
                        let rejection =
                            Response::error(None, ErrorObject::invalid_request(fault.to_string()));
                        return self
                            .inner
                            .write_payload(Payload::Batch(vec![Message::Response(rejection)]))
                            .await;
                    }
                }
                for message in messages {
                    self.dispatch_message(message, handler, previous_gate)?;
                }
                Ok(())
            }
        }
    }

    /// Routes one decoded message per the dispatch rules.
    fn dispatch_message(
        &self,
        message: Message,
        handler: &Arc<dyn Handler>,
        previous_gate: &mut Option<oneshot::Receiver<()>>,
    ) -> CoreResult<()> {
        match message {
            Message::Response(response) => {
                self.inner.deliver_response(response);
                Ok(())
            }
            Message::Request(request) => {
                // The cancellation notification is interpreted here, never
                // delivered to the handler chain.
                if request.is_notification()
                    && self.inner.config.cancel_method.as_deref() == Some(request.method.as_str())
                {
                    self.inner.handle_cancel_notification(request.params.as_ref());
                    return Ok(());
                }
                self.schedule(request, handler, previous_gate);
                Ok(())
            }
        }
    }

    /// Starts a new inbound handling: registers cancellation, chains the
    /// ordering gate, and spawns the handler task.
    fn schedule(
        &self,
        request: Request,
        handler: &Arc<dyn Handler>,
        previous_gate: &mut Option<oneshot::Receiver<()>>,
    ) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let wait_for_previous = previous_gate.replace(gate_rx);
        let release = ReleaseHandle::new(gate_tx);

        let cancel = self.inner.work_scope.child_token();
        if let Some(id) = &request.id {
            self.inner.handling.lock().insert(id.clone(), cancel.clone());
        }
        self.inner.inflight.fetch_add(1, Ordering::SeqCst);

        debug!(method = %request.method, id = ?request.id, "dispatching inbound request");
        tokio::spawn(Inner::run_request(
            self.inner.clone(),
            handler.clone(),
            request,
            wait_for_previous,
            release,
            cancel,
        ));
    }
}

impl Inner {
    fn ensure_open(&self) -> CoreResult<()> {
        if self.lifecycle.load(Ordering::SeqCst) >= SHUTTING_DOWN {
            return Err(CoreError::ConnectionClosed);
        }
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.pending.lock().is_empty() && self.inflight.load(Ordering::SeqCst) == 0
    }

    async fn write_payload(&self, payload: Payload) -> CoreResult<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write(&payload).await,
            None => Err(CoreError::ConnectionClosed),
        }
    }

    async fn write_message(&self, message: Message) -> CoreResult<()> {
        self.write_payload(Payload::Single(message)).await
    }

    /// Wakes the waiter for a pending outbound call. Responses with no
    /// matching entry are dropped silently; the caller may have cancelled.
    fn deliver_response(&self, response: Response) {
        let Some(id) = response.id.clone() else {
            debug!("dropping response with null id");
            return;
        };
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                // Buffered single-slot delivery: never blocks the read loop
                // even when the caller has already given up.
                let _ = tx.send(response);
            }
            None => debug!(id = %id, "dropping response with no pending call"),
        }
    }

    /// Sends the cancellation notification for an abandoned outbound call.
    /// Best-effort: write failures are not surfaced to the caller.
    fn spawn_cancel_notification(self: Arc<Self>, id: Id) {
        let Some(method) = self.config.cancel_method.clone() else {
            return;
        };
        tokio::spawn(async move {
            let note = Request::notification(method, Some(json!({ "id": id })));
            if let Err(e) = self.write_message(Message::Request(note)).await {
                debug!(error = %e, "failed to send cancel notification");
            }
        });
    }

    fn handle_cancel_notification(&self, params: Option<&Value>) {
        let id = params
            .and_then(|p| p.get("id"))
            .and_then(|v| serde_json::from_value::<Id>(v.clone()).ok());
        match id {
            Some(id) => self.cancel_inbound(&id),
            None => debug!("cancel notification without usable id"),
        }
    }

    /// Fires the token of an in-flight inbound call. The handling entry
    /// stays until the handler replies.
    fn cancel_inbound(&self, id: &Id) {
        if let Some(token) = self.handling.lock().get(id) {
            debug!(id = %id, "cancelling in-flight inbound call");
            token.cancel();
        } else {
            debug!(id = %id, "cancel for unknown inbound call");
        }
    }

    /// Runs one inbound request to completion on its own task.
    async fn run_request(
        self: Arc<Self>,
        handler: Arc<dyn Handler>,
        request: Request,
        wait_for_previous: Option<oneshot::Receiver<()>>,
        release: ReleaseHandle,
        cancel: CancellationToken,
    ) {
        if let Some(gate) = wait_for_previous {
            // A dropped sender counts as released.
            let _ = gate.await;
        }

        let id = request.id.clone();
        let method = request.method.clone();
        let ctx = RequestCtx::new(cancel, release.clone());
        let replier = Replier::new(
            Arc::clone(&self) as Arc<dyn ReplySink>,
            id.clone(),
            release.clone(),
        );

        let outcome = std::panic::AssertUnwindSafe(handler.handle(ctx, replier.clone(), request))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if replier.has_replied() {
                    warn!(method = %method, error = %err, "handler returned error after replying");
                } else if replier.expects_reply() {
                    // An ErrorObject passes through verbatim; any other
                    // domain error is wrapped as an internal error.
                    let wire = match err.downcast::<ErrorObject>() {
                        Ok(object) => object,
                        Err(other) => ErrorObject::internal_error(other.to_string()),
                    };
                    if let Err(e) = replier.reply(Err(wire)).await {
                        debug!(error = %e, "failed to write error reply");
                    }
                } else {
                    debug!(method = %method, error = %err, "notification handler failed");
                }
            }
            Err(panic) => {
                let text = panic_message(panic);
                error!(method = %method, panic = %text, "handler panicked");
                if replier.expects_reply() && !replier.has_replied() {
                    if let Err(e) = replier.reply(Err(ErrorObject::internal_error(text))).await {
                        debug!(error = %e, "failed to write panic reply");
                    }
                }
            }
        }

        // Reply already released the gate; this covers handlers that never
        // got that far.
        release.release();
        if let Some(id) = &id {
            self.handling.lock().remove(id);
        }
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Tears the connection down exactly once: unblocks pending callers,
    /// cancels in-flight inbound work, and signals termination.
    fn teardown(&self) {
        self.shutdown.cancel();
        let previous = self.lifecycle.swap(TERMINATED, Ordering::SeqCst);
        if previous == TERMINATED {
            return;
        }

        // Dropping the senders resolves every waiter with ConnectionClosed.
        self.pending.lock().clear();
        self.work_scope.cancel();
        self.handling.lock().clear();
        // Release the byte stream so the peer observes end of input. An
        // in-flight write keeps it alive until that write completes.
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.terminated.cancel();
    }
}

#[async_trait]
impl ReplySink for Inner {
    async fn send_reply(&self, id: Id, reply: Result<Value, ErrorObject>) -> CoreResult<()> {
        // The handling interval ends at reply time.
        self.handling.lock().remove(&id);

        if self.shutdown.is_cancelled() {
            debug!(id = %id, "discarding reply on closed connection");
            return Ok(());
        }

        let response = match reply {
            Ok(result) => Response::success(id, result),
            Err(err) => Response::error(Some(id), err),
        };
        match self.batches.offer(response) {
            BatchDisposition::Unbatched(response) => {
                self.write_message(Message::Response(response)).await
            }
            BatchDisposition::Held => Ok(()),
            BatchDisposition::Complete(responses) => {
                self.write_payload(Payload::Batch(
                    responses.into_iter().map(Message::Response).collect(),
                ))
                .await
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}
