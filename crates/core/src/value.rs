//! Lazily resolved values: bound parameters and client headers.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};

use {
    futures::{FutureExt, future::BoxFuture},
    serde_json::Value,
};

use crate::error::Result;

type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// A literal value or a sync/async producer evaluated on every use.
#[derive(Clone)]
pub enum ValueSource<T> {
    Literal(T),
    Producer(Producer<T>),
}

impl<T> ValueSource<T>
where
    T: Clone + Send + 'static,
{
    /// Wrap a synchronous function, called on every resolution.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Producer(Arc::new(move || {
            let value = f();
            async move { Ok(value) }.boxed()
        }))
    }

    /// Wrap an async, fallible function, awaited on every resolution.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Producer(Arc::new(move || f().boxed()))
    }

    pub async fn resolve(&self) -> Result<T> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Producer(produce) => produce().await,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Value of a bound parameter.
pub type BoundValue = ValueSource<Value>;

/// Bound parameter values keyed by parameter name.
pub type BoundParams = BTreeMap<String, BoundValue>;

/// Value of a client header.
pub type HeaderSource = ValueSource<String>;

/// Headers attached by the client to every request, keyed by header name.
pub type ClientHeaders = BTreeMap<String, HeaderSource>;

impl From<Value> for BoundValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<&str> for HeaderSource {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<String> for HeaderSource {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}
