//! Fan-out/fan-in combinators.
//!
//! Every combinator spawns one tokio task per input item immediately and returns a
//! [`FanOut`] stream that yields results in input order, regardless of completion order.
//! Captured failures ([`ForgeError::is_captured`]) are counted instead of propagated; once
//! all tasks are consumed a single [`ForgeError::Aggregate`] reports the count. Any other
//! error ends the stream where it is reached. Tasks that were not consumed yet keep running
//! detached.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::stream::{FuturesOrdered, Stream, StreamExt, TryStreamExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ForgeError;

type Slot<R> = JoinHandle<Result<Option<R>, ForgeError>>;

/// Ordered results of concurrently running tasks.
#[must_use = "tasks keep running, but their failures are only reported when the stream is consumed"]
pub struct FanOut<R> {
    pending: FuturesOrdered<Slot<R>>,
    failed: usize,
    done: bool,
}

impl<R: Send + 'static> FanOut<R> {
    fn spawn_all<T, F, Fut>(items: impl IntoIterator<Item = T>, mut task: F) -> Self
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<Option<R>, ForgeError>> + Send + 'static,
    {
        let pending = items.into_iter().map(|item| tokio::spawn(task(item))).collect();
        Self {
            pending,
            failed: 0,
            done: false,
        }
    }

    /// Number of tasks not yet consumed.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

// Never pin-projected; the pending set is polled through `&mut`.
impl<R> Unpin for FanOut<R> {}

impl<R> Stream for FanOut<R> {
    type Item = Result<R, ForgeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(this.pending.poll_next_unpin(cx)) {
                Some(Ok(Ok(Some(value)))) => return Poll::Ready(Some(Ok(value))),
                Some(Ok(Ok(None))) => continue,
                Some(Ok(Err(error))) if error.is_captured() => {
                    debug!(error = %error, "captured task failure");
                    this.failed += 1;
                }
                Some(Ok(Err(error))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(error)));
                }
                Some(Err(join_error)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(join_error.into())));
                }
                None => {
                    this.done = true;
                    if this.failed > 0 {
                        return Poll::Ready(Some(Err(ForgeError::Aggregate { failed: this.failed })));
                    }
                }
            }
        }
    }
}

/// Runs `task` concurrently for every item.
pub fn concurrent_map<T, R, F, Fut>(items: impl IntoIterator<Item = T>, mut task: F) -> FanOut<R>
where
    R: Send + 'static,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, ForgeError>> + Send + 'static,
{
    FanOut::spawn_all(items, move |item| {
        let future = task(item);
        async move { future.await.map(Some) }
    })
}

/// Like [`concurrent_map`], but a task returning `Ok(None)` contributes no result.
pub fn concurrent_filter_map<T, R, F, Fut>(items: impl IntoIterator<Item = T>, task: F) -> FanOut<R>
where
    R: Send + 'static,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<Option<R>, ForgeError>> + Send + 'static,
{
    FanOut::spawn_all(items, task)
}

/// Calls a function with the fields of a tuple as its positional arguments.
pub trait Spread<Args> {
    type Output;

    fn spread(&mut self, args: Args) -> Self::Output;
}

impl<F, A, B, O> Spread<(A, B)> for F
where
    F: FnMut(A, B) -> O,
{
    type Output = O;

    fn spread(&mut self, (a, b): (A, B)) -> O {
        self(a, b)
    }
}

impl<F, A, B, C, O> Spread<(A, B, C)> for F
where
    F: FnMut(A, B, C) -> O,
{
    type Output = O;

    fn spread(&mut self, (a, b, c): (A, B, C)) -> O {
        self(a, b, c)
    }
}

/// Like [`concurrent_map`], destructuring each tuple item into `task`'s parameters.
pub fn concurrent_apply<T, R, F, Fut>(items: impl IntoIterator<Item = T>, mut task: F) -> FanOut<R>
where
    R: Send + 'static,
    F: Spread<T, Output = Fut>,
    Fut: Future<Output = Result<R, ForgeError>> + Send + 'static,
{
    concurrent_map(items, move |item| task.spread(item))
}

/// Consumes a stream for its side effects.
pub async fn drain<S, R>(stream: S) -> Result<(), ForgeError>
where
    S: Stream<Item = Result<R, ForgeError>>,
{
    stream.try_for_each(|_| async { Ok(()) }).await
}

/// Collects a stream into a vector in stream order.
pub async fn gather<S, R>(stream: S) -> Result<Vec<R>, ForgeError>
where
    S: Stream<Item = Result<R, ForgeError>>,
{
    stream.try_collect().await
}
