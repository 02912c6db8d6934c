use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::HalyardError;

/// Values produced by a resource accessor.
///
/// Accessors may answer synchronously, with a future or with a stream; all of
/// them are normalized into one asynchronous sequence by [`Emission::into_stream`].
pub struct Emission<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    Ready(Vec<T>),
    Failed(HalyardError),
    Pending(BoxFuture<'static, Result<Vec<T>, HalyardError>>),
    Streaming(BoxStream<'static, Result<T, HalyardError>>),
}

impl<T: Send + 'static> Emission<T> {
    pub fn empty() -> Self {
        Self::many(Vec::new())
    }

    pub fn one(value: T) -> Self {
        Self::many(vec![value])
    }

    pub fn maybe(value: Option<T>) -> Self {
        Self::many(value)
    }

    pub fn many(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Inner::Ready(values.into_iter().collect()),
        }
    }

    pub fn failed(err: impl Into<HalyardError>) -> Self {
        Self {
            inner: Inner::Failed(err.into()),
        }
    }

    /// A future resolving to any number of values.
    pub fn future<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<Vec<T>, E>> + Send + 'static,
        E: Into<HalyardError> + 'static,
    {
        Self {
            inner: Inner::Pending(fut.map(|res| res.map_err(Into::into)).boxed()),
        }
    }

    pub fn future_one<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<HalyardError> + 'static,
    {
        Self::future(fut.map(|res| res.map(|value| vec![value])))
    }

    pub fn future_maybe<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<HalyardError> + 'static,
    {
        Self::future(fut.map(|res| res.map(|value| value.into_iter().collect())))
    }

    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<HalyardError> + 'static,
    {
        Self {
            inner: Inner::Streaming(stream.map_err(Into::into).boxed()),
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<T, HalyardError>> {
        match self.inner {
            Inner::Ready(values) => stream::iter(values.into_iter().map(Ok)).boxed(),
            Inner::Failed(err) => stream::once(async move { Err(err) }).boxed(),
            Inner::Pending(fut) => fut
                .map(|res| match res {
                    Ok(values) => stream::iter(values.into_iter().map(Ok)).left_stream(),
                    Err(err) => stream::once(async move { Err(err) }).right_stream(),
                })
                .flatten_stream()
                .boxed(),
            Inner::Streaming(stream) => stream,
        }
    }

    /// Drains the emission in order; the first error wins.
    pub async fn collect(self) -> Result<Vec<T>, HalyardError> {
        match self.inner {
            Inner::Ready(values) => Ok(values),
            Inner::Failed(err) => Err(err),
            Inner::Pending(fut) => fut.await,
            Inner::Streaming(stream) => stream.try_collect().await,
        }
    }
}

impl Emission<Value> {
    /// Serializes a state payload.
    pub fn state<S: Serialize>(state: &S) -> Self {
        match serde_json::to_value(state) {
            Ok(value) => Self::one(value),
            Err(err) => Self::failed(anyhow::Error::new(err).context("serializing state")),
        }
    }
}

impl<T: Send + 'static, E: Into<HalyardError>> From<Result<Vec<T>, E>> for Emission<T> {
    fn from(result: Result<Vec<T>, E>) -> Self {
        match result {
            Ok(values) => Self::many(values),
            Err(err) => Self::failed(err),
        }
    }
}
