//! Handler definitions and traits

use crate::error::HandlerError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Arguments passed to handlers for one emission.
///
/// Shared between every handler of the emission; handlers that need to keep
/// the arguments can clone the `Arc` cheaply.
pub type EventArgs = Arc<[Value]>;

/// Result returned by every handler.
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn = dyn Fn(EventArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Event handler trait
///
/// Implement this for handlers that carry their own state; wrap them with
/// [`Handler::from_handler`] to register them on a bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one emission
    async fn handle(&self, args: EventArgs) -> HandlerResult;
}

/// A registered callback.
///
/// Identity is by reference: clones of a `Handler` compare equal and can be
/// used to unsubscribe each other, while two handlers built from identical
/// closures are distinct.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Create a handler from an async closure.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handler = Handler::new(|args| async move {
    ///     println!("received {} argument(s)", args.len());
    ///     Ok(())
    /// });
    /// ```
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |args: EventArgs| f(args).boxed()),
        }
    }

    /// Create a handler from a synchronous closure.
    ///
    /// The closure runs at invocation time, so a panic inside it is reported
    /// like any other handler failure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(EventArgs) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(move |args: EventArgs| futures::future::ready(f(args)).boxed()),
        }
    }

    /// Wrap an [`EventHandler`] implementation.
    pub fn from_handler<H: EventHandler + 'static>(handler: H) -> Self {
        let handler = Arc::new(handler);
        Self::new(move |args| {
            let handler = Arc::clone(&handler);
            async move { handler.handle(args).await }
        })
    }

    /// Whether both values are the same handler reference.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    /// Invoke the handler, turning panics into [`HandlerError::Panicked`].
    ///
    /// Panics are caught both while producing the future and while polling it.
    pub(crate) async fn invoke(&self, args: EventArgs) -> HandlerResult {
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.inner)(args))) {
            Ok(future) => future,
            Err(payload) => return Err(HandlerError::from_panic(payload)),
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::from_panic(payload)),
        }
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// Decode the argument at `index` into `T`.
///
/// ```rust,ignore
/// let handler = Handler::sync(|args| {
///     let user_id: u64 = arg(&args, 0)?;
///     Ok(())
/// });
/// ```
pub fn arg<T: DeserializeOwned>(args: &[Value], index: usize) -> Result<T, HandlerError> {
    let value = args
        .get(index)
        .ok_or(HandlerError::MissingArgument(index))?;
    Ok(serde_json::from_value(value.clone())?)
}
