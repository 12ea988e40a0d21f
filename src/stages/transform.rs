//! # Transform: pure function application.
//!
//! [`Transform`] applies a function to every item and forwards the result.
//! Both the function and the downstream sink are required; a missing one is a
//! [`BusError::Config`] raised by the first `accept`.
//!
//! The function may be fallible ([`Transform::try_map`]): returning
//! [`BusError::BadBean`] lets an upstream quarantine filter isolate the item.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::stages::{Sink, SinkRef};

type TransformFn<T, U> = Arc<dyn Fn(T) -> Result<U, BusError> + Send + Sync>;

/// Applies a function to each item and forwards the result.
pub struct Transform<T, U> {
    function: Option<TransformFn<T, U>>,
    to: Option<SinkRef<U>>,
}

impl<T, U> Transform<T, U> {
    /// Creates an unconfigured transform; wire it with the setters.
    pub fn new() -> Self {
        Self {
            function: None,
            to: None,
        }
    }

    /// Creates a transform from an infallible function.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Self::try_map(move |item| Ok(f(item)))
    }

    /// Creates a transform from a fallible function.
    pub fn try_map<F>(f: F) -> Self
    where
        F: Fn(T) -> Result<U, BusError> + Send + Sync + 'static,
    {
        Self {
            function: Some(Arc::new(f)),
            to: None,
        }
    }

    /// Sets the downstream sink (builder form).
    pub fn with_to(mut self, to: SinkRef<U>) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the downstream sink.
    pub fn set_to(&mut self, to: Option<SinkRef<U>>) {
        self.to = to;
    }

    /// Returns the downstream sink.
    pub fn to(&self) -> Option<&SinkRef<U>> {
        self.to.as_ref()
    }

    /// Sets the function applied to every item.
    pub fn set_function<F>(&mut self, f: F)
    where
        F: Fn(T) -> Result<U, BusError> + Send + Sync + 'static,
    {
        self.function = Some(Arc::new(f));
    }

    /// True once a function is configured.
    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }
}

impl<T, U> Default for Transform<T, U> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T, U> Sink<T> for Transform<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let function = self
            .function
            .as_ref()
            .ok_or_else(|| BusError::config("transform has no function"))?;
        let to = self
            .to
            .as_ref()
            .ok_or_else(|| BusError::config("transform has no destination"))?;

        let out = function(item)?;
        to.accept(out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Collector;

    #[tokio::test]
    async fn forwards_the_function_result() {
        let out = Arc::new(Collector::<String>::new());
        let upper = Transform::map(|s: &'static str| s.to_uppercase()).with_to(out.clone());

        upper.accept("apple").await.unwrap();
        upper.accept("pear").await.unwrap();

        assert_eq!(out.items(), vec!["APPLE".to_string(), "PEAR".to_string()]);
    }

    #[tokio::test]
    async fn missing_function_fails_on_first_use() {
        let out: Arc<Collector<u32>> = Arc::new(Collector::new());
        let mut t: Transform<u32, u32> = Transform::new();
        t.set_to(Some(out.clone()));

        let err = t.accept(1).await.unwrap_err();
        assert_eq!(err.as_label(), "bus_config");
        assert!(out.is_empty());

        t.set_function(|n| Ok(n * 10));
        t.accept(2).await.unwrap();
        assert_eq!(out.items(), vec![20]);
    }

    #[tokio::test]
    async fn fallible_function_errors_pass_through() {
        let out = Arc::new(Collector::<i32>::new());
        let parse = Transform::try_map(|s: &'static str| {
            s.parse::<i32>()
                .map_err(|e| BusError::bad_bean(format!("{s}: {e}")))
        })
        .with_to(out.clone());

        parse.accept("7").await.unwrap();
        let err = parse.accept("seven").await.unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(out.items(), vec![7]);
    }
}
