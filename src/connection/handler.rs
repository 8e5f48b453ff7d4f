// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Handler composition for inbound requests.
//!
//! A [`Handler`] receives each inbound request together with a
//! [`RequestCtx`] (cancellation and ordering handles) and a [`Replier`]
//! that sends the single response. Middleware wraps a handler and returns
//! another handler of the same shape:
//!
//! - [`MustReply`] enforces the reply discipline for calls and is the
//!   outermost wrapper installed by the connection.
//! - [`MethodNotFound`] is a terminal handler answering every call with
//!   the standard method-not-found error.
//! - [`MethodRouter`] dispatches by method name to registered async
//!   closures, falling back to [`MethodNotFound`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreResult;
use crate::protocol::jsonrpc::{ErrorObject, Id, Request};

/// Handles one inbound request.
///
/// For a call, the handler must invoke [`Replier::reply`] exactly once;
/// for a notification, any reply is a silent no-op. A returned error that
/// has not been preceded by a reply is turned into an error response by
/// the connection: an [`ErrorObject`] passes through verbatim, anything
/// else is wrapped as an internal error.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Processes `request`, replying through `replier`.
    async fn handle(
        &self,
        ctx: RequestCtx,
        replier: Replier,
        request: Request,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(
        &self,
        ctx: RequestCtx,
        replier: Replier,
        request: Request,
    ) -> anyhow::Result<()> {
        (**self).handle(ctx, replier, request).await
    }
}

/// Single-fire, idempotent release signal for the inbound ordering gate.
#[derive(Clone)]
pub(crate) struct ReleaseHandle {
    slot: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ReleaseHandle {
    pub(crate) fn new(tx: oneshot::Sender<()>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// A handle with nothing to fire, for contexts built outside a
    /// connection (tests, direct handler invocation).
    pub(crate) fn noop() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Fires the release signal. Subsequent calls are no-ops.
    pub(crate) fn release(&self) {
        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Per-request context handed to handlers: the cancellation token for this
/// request and the ordering-release handle.
#[derive(Clone)]
pub struct RequestCtx {
    cancel: CancellationToken,
    release: ReleaseHandle,
}

impl RequestCtx {
    pub(crate) fn new(cancel: CancellationToken, release: ReleaseHandle) -> Self {
        Self { cancel, release }
    }

    /// Returns true if this request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when this request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// The cancellation token scoped to this request.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Declares this handler async: the next inbound request may start
    /// before this one has replied. Idempotent; implied by replying.
    pub fn release_ordering(&self) {
        self.release.release()
    }
}

/// Where replies go. Implemented by the connection; factored as a trait so
/// handler middleware is testable without a live stream.
#[async_trait]
pub(crate) trait ReplySink: Send + Sync {
    async fn send_reply(&self, id: Id, reply: Result<Value, ErrorObject>) -> CoreResult<()>;
}

/// Sends the single response for one inbound request.
///
/// Cheap to clone; all clones share the replied flag. Replying a second
/// time is a programmer error and panics (the connection catches the
/// unwind and logs it).
#[derive(Clone)]
pub struct Replier {
    sink: Arc<dyn ReplySink>,
    id: Option<Id>,
    replied: Arc<AtomicBool>,
    release: ReleaseHandle,
}

impl Replier {
    pub(crate) fn new(sink: Arc<dyn ReplySink>, id: Option<Id>, release: ReleaseHandle) -> Self {
        Self {
            sink,
            id,
            replied: Arc::new(AtomicBool::new(false)),
            release,
        }
    }

    /// Returns true if the request is a call and therefore expects a reply.
    pub fn expects_reply(&self) -> bool {
        self.id.is_some()
    }

    /// Returns true if [`Replier::reply`] has been invoked.
    pub fn has_replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }

    /// Sends the response for this request and releases the ordering gate.
    ///
    /// For a notification this marks the request answered without writing
    /// anything.
    ///
    /// # Panics
    ///
    /// Panics when invoked more than once for the same request.
    pub async fn reply(&self, reply: Result<Value, ErrorObject>) -> CoreResult<()> {
        if self.replied.swap(true, Ordering::SeqCst) {
            panic!("reply invoked more than once for request id {:?}", self.id);
        }
        self.release.release();
        match &self.id {
            Some(id) => self.sink.send_reply(id.clone(), reply).await,
            None => Ok(()),
        }
    }
}

/// Middleware enforcing the reply discipline: a wrapped handler that
/// returns success without having replied to a call has a bug, and the
/// violation is raised as a panic. Installed as the outermost wrapper by
/// the connection; the connection converts the unwind into an internal
/// error response so the peer still receives its reply.
pub struct MustReply<H> {
    inner: H,
}

impl<H: Handler> MustReply<H> {
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: Handler> Handler for MustReply<H> {
    async fn handle(
        &self,
        ctx: RequestCtx,
        replier: Replier,
        request: Request,
    ) -> anyhow::Result<()> {
        let method = request.method.clone();
        let out = self.inner.handle(ctx, replier.clone(), request).await;
        if out.is_ok() && replier.expects_reply() && !replier.has_replied() {
            panic!("handler for method {method:?} returned without replying");
        }
        out
    }
}

/// Terminal handler answering every call with MethodNotFound.
pub struct MethodNotFound;

#[async_trait]
impl Handler for MethodNotFound {
    async fn handle(
        &self,
        _ctx: RequestCtx,
        replier: Replier,
        request: Request,
    ) -> anyhow::Result<()> {
        if replier.expects_reply() {
            replier
                .reply(Err(ErrorObject::method_not_found(&request.method)))
                .await?;
        } else {
            debug!(method = %request.method, "ignoring notification for unknown method");
        }
        Ok(())
    }
}

/// Type alias for registered method handler functions.
type MethodFn =
    Arc<dyn Fn(Option<Value>, RequestCtx) -> BoxFuture<'static, Result<Value, ErrorObject>> + Send + Sync>;

/// Dispatches inbound requests by method name.
///
/// Methods are registered as async closures taking the raw `params` value
/// and the request context, returning the result value or a wire error
/// object. Unknown methods fall through to [`MethodNotFound`].
#[derive(Default)]
pub struct MethodRouter {
    methods: HashMap<String, MethodFn>,
}

impl MethodRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method handler function.
    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>, RequestCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ErrorObject>> + Send + 'static,
    {
        self.methods
            .insert(method.into(), Arc::new(move |params, ctx| Box::pin(handler(params, ctx))));
    }
}

#[async_trait]
impl Handler for MethodRouter {
    async fn handle(
        &self,
        ctx: RequestCtx,
        replier: Replier,
        request: Request,
    ) -> anyhow::Result<()> {
        let Some(method) = self.methods.get(&request.method) else {
            return MethodNotFound.handle(ctx, replier, request).await;
        };

        let outcome = method(request.params.clone(), ctx).await;
        if replier.expects_reply() {
            replier.reply(outcome).await?;
        } else if let Err(err) = outcome {
            debug!(method = %request.method, error = %err, "notification handler failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A sink that records replies instead of writing them to a stream.
    #[derive(Default)]
    struct RecordingSink {
        replies: Mutex<Vec<(Id, Result<Value, ErrorObject>)>>,
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send_reply(&self, id: Id, reply: Result<Value, ErrorObject>) -> CoreResult<()> {
            self.replies.lock().push((id, reply));
            Ok(())
        }
    }

    fn test_ctx() -> RequestCtx {
        RequestCtx::new(CancellationToken::new(), ReleaseHandle::noop())
    }

    fn call_parts(sink: &Arc<RecordingSink>, id: i64) -> Replier {
        Replier::new(
            sink.clone() as Arc<dyn ReplySink>,
            Some(Id::Number(id)),
            ReleaseHandle::noop(),
        )
    }

    #[tokio::test]
    async fn test_router_dispatches_to_registered_method() {
        let mut router = MethodRouter::new();
        router.register("echo", |params, _ctx| async move {
            Ok(params.unwrap_or(Value::Null))
        });

        let sink = Arc::new(RecordingSink::default());
        let replier = call_parts(&sink, 1);
        router
            .handle(
                test_ctx(),
                replier,
                Request::call("echo", Some(json!(["hi"])), Id::Number(1)),
            )
            .await
            .unwrap();

        let replies = sink.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.as_ref().unwrap(), &json!(["hi"]));
    }

    #[tokio::test]
    async fn test_router_falls_back_to_method_not_found() {
        let router = MethodRouter::new();
        let sink = Arc::new(RecordingSink::default());
        let replier = call_parts(&sink, 7);
        router
            .handle(test_ctx(), replier, Request::call("nope", None, Id::Number(7)))
            .await
            .unwrap();

        let replies = sink.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.as_ref().unwrap_err().code, -32601);
    }

    #[tokio::test]
    async fn test_notification_never_produces_reply() {
        let mut router = MethodRouter::new();
        router.register("log", |_params, _ctx| async move { Ok(Value::Null) });

        let sink = Arc::new(RecordingSink::default());
        let replier = Replier::new(
            sink.clone() as Arc<dyn ReplySink>,
            None,
            ReleaseHandle::noop(),
        );
        router
            .handle(
                test_ctx(),
                replier,
                Request::notification("log", Some(json!(["hi"]))),
            )
            .await
            .unwrap();

        assert!(sink.replies.lock().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "returned without replying")]
    async fn test_must_reply_panics_on_missing_reply() {
        struct Silent;
        #[async_trait]
        impl Handler for Silent {
            async fn handle(
                &self,
                _ctx: RequestCtx,
                _replier: Replier,
                _request: Request,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let replier = call_parts(&sink, 1);
        MustReply::new(Silent)
            .handle(test_ctx(), replier, Request::call("m", None, Id::Number(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_must_reply_tolerates_silent_notification_handler() {
        struct Silent;
        #[async_trait]
        impl Handler for Silent {
            async fn handle(
                &self,
                _ctx: RequestCtx,
                _replier: Replier,
                _request: Request,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let replier = Replier::new(
            sink.clone() as Arc<dyn ReplySink>,
            None,
            ReleaseHandle::noop(),
        );
        MustReply::new(Silent)
            .handle(test_ctx(), replier, Request::notification("m", None))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "more than once")]
    async fn test_double_reply_panics() {
        let sink = Arc::new(RecordingSink::default());
        let replier = call_parts(&sink, 1);
        replier.reply(Ok(json!(1))).await.unwrap();
        let _ = replier.reply(Ok(json!(2))).await;
    }

    #[tokio::test]
    async fn test_release_handle_is_idempotent() {
        let (tx, rx) = oneshot::channel();
        let handle = ReleaseHandle::new(tx);
        handle.release();
        handle.release();
        assert!(rx.await.is_ok());
    }
}
