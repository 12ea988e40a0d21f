//! # Job abstraction and function-backed implementation.
//!
//! A job receives a [`CancellationToken`] and should check it periodically to
//! stop cooperatively.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// # Asynchronous, cancelable unit of work.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use beanbus::{Job, JobError};
///
/// struct Import;
///
/// #[async_trait]
/// impl Job for Import {
///     fn name(&self) -> &str { "import" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
///         if ctx.is_cancelled() {
///             return Err(JobError::Canceled);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Returns a stable, human-readable job name.
    fn name(&self) -> &str;

    /// Executes the job until completion or cancellation.
    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError>;
}

/// Shared handle to a job.
pub type JobRef = Arc<dyn Job>;

/// Function-backed job.
///
/// Wraps a closure that creates a fresh future per run; shared state, if any,
/// goes in an explicit `Arc` captured by the closure.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use beanbus::{JobError, JobFn, JobRef};
///
/// let job: JobRef = JobFn::arc("hello", |_ctx: CancellationToken| async {
///     Ok::<_, JobError>(())
/// });
/// assert_eq!(job.name(), "hello");
/// ```
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a function-backed job.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
