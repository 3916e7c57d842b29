//! Result delivery styles.
//!
//! Every collection operation is written once as an `async` block that issues
//! its command(s) and assembles the result. A [`Delivery`] decides how that
//! block reaches the caller:
//!
//! | Style | Output | Starts |
//! |-------|--------|--------|
//! | [`Direct`] | boxed future | when awaited |
//! | [`Deferred`] | [`DeferredHandle`], a spawned one-shot task | immediately |
//! | [`Reactive`] | [`Single`], a stream of exactly one item | when polled |
//! | [`Blocking`] | the `Result` itself | immediately, blocking the thread |
//!
//! Success and failure travel the same way in every style.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, Stream};
use futures_util::{FutureExt, StreamExt};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::Error;

pub trait Delivery: Clone + Send + Sync + 'static {
    type Output<T: Send + 'static>;

    fn deliver<T, F>(&self, operation: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static;
}

/// Plain async: the operation runs inside the caller's `.await`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Delivery for Direct {
    type Output<T: Send + 'static> = BoxFuture<'static, Result<T, Error>>;

    fn deliver<T, F>(&self, operation: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        operation.boxed()
    }
}

/// Spawns each operation on a tokio runtime and hands back its handle.
#[derive(Debug, Clone)]
pub struct Deferred {
    handle: Handle,
}

impl Deferred {
    /// Uses the runtime the caller is running on.
    pub fn current() -> Result<Self, Error> {
        Ok(Self {
            handle: Handle::try_current()?,
        })
    }

    pub fn on(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Delivery for Deferred {
    type Output<T: Send + 'static> = DeferredHandle<T>;

    fn deliver<T, F>(&self, operation: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        DeferredHandle {
            task: self.handle.spawn(operation),
        }
    }
}

/// One-shot completion of a spawned operation.
///
/// Awaiting yields the operation's result. [`cancel`](Self::cancel) detaches
/// the caller: a command that already reached the store still takes effect,
/// and awaiting afterwards yields [`Error::Cancelled`].
#[derive(Debug)]
pub struct DeferredHandle<T> {
    task: JoinHandle<Result<T, Error>>,
}

impl<T> DeferredHandle<T> {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for DeferredHandle<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let joined = ready!(Pin::new(&mut self.get_mut().task).poll(cx));
        Poll::Ready(match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Task(e.to_string())),
        })
    }
}

/// Delivers each operation as a [`Single`] stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reactive;

impl Delivery for Reactive {
    type Output<T: Send + 'static> = Single<T>;

    fn deliver<T, F>(&self, operation: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Single {
            inner: stream::once(operation).boxed(),
        }
    }
}

/// A stream that emits exactly one item, the operation's result, and ends.
///
/// Nothing is sent to the store until the stream is first polled.
pub struct Single<T> {
    inner: BoxStream<'static, Result<T, Error>>,
}

impl<T> Stream for Single<T> {
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Runs each operation to completion on a dedicated runtime, blocking the
/// calling thread.
///
/// The runtime lives on a background thread of its own and shuts down there
/// once the last clone of the adapter is dropped, so dropping a blocking
/// collection is fine anywhere. Calls must not be made from inside an async
/// context.
#[derive(Clone)]
pub struct Blocking {
    handle: Handle,
    _shutdown: Arc<oneshot::Sender<()>>,
}

impl Blocking {
    /// Starts a multi-threaded runtime owned by this adapter.
    pub fn new() -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Self::from_runtime(runtime)
    }

    /// Moves `runtime` onto its own thread and runs operations through it.
    pub fn from_runtime(runtime: Runtime) -> Result<Self, Error> {
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();
        std::thread::Builder::new()
            .name("keyspace-blocking".into())
            .spawn(move || {
                // Returns once every sender clone is gone.
                let _ = runtime.block_on(stopped);
            })?;

        Ok(Self {
            handle,
            _shutdown: Arc::new(shutdown),
        })
    }

    /// Runs a future on the adapter's runtime, e.g. to connect before
    /// switching collections to blocking delivery.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Delivery for Blocking {
    type Output<T: Send + 'static> = Result<T, Error>;

    fn deliver<T, F>(&self, operation: F) -> Self::Output<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.handle.block_on(operation)
    }
}
