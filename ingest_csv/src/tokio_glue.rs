//! Glue code for working with `tokio`.

use std::panic;

use tokio::task;

use crate::common::*;

/// Standard future type for this crate. Like `Result`, but used by async. We
/// mark it as `Send` and box it, so all we know is that it will return a
/// `Result<T, E>`.
pub type BoxFuture<T, E = Error> = futures::future::BoxFuture<'static, Result<T, E>>;

/// Run a synchronous function `f` in a background worker thread and return its
/// value.
///
/// Panics in `f` are resumed on the calling task. Any other failure to join
/// the thread is converted into `E`.
pub async fn spawn_blocking<F, T, E>(f: F) -> Result<T, E>
where
    F: (FnOnce() -> Result<T, E>) + Send + 'static,
    T: Send + 'static,
    E: From<task::JoinError> + Send + 'static,
{
    match task::spawn_blocking(f).await {
        Ok(f_result) => f_result,
        Err(join_err) => match join_err.try_into_panic() {
            Ok(panic_value) => panic::resume_unwind(panic_value),
            Err(join_err) => Err(E::from(join_err)),
        },
    }
}

/// Create a new `tokio` runtime and use it to run `cmd_future` (which carries
/// out whatever task we want to perform), and `worker_future` (which should
/// have been created by `Context::create`).
///
/// Return when at least one future has failed, or both futures have completed
/// successfully.
///
/// If this hangs, make sure all `Context` values are getting dropped once the
/// work is done.
pub fn run_futures_with_runtime(
    cmd_future: BoxFuture<()>,
    worker_future: BoxFuture<()>,
) -> Result<()> {
    // If a background worker fails, `cmd_future` will be dropped, or vice
    // versa.
    let combined_fut = async move {
        futures::try_join!(cmd_future, worker_future)?;
        let result: Result<()> = Ok(());
        result
    };

    let runtime = tokio::runtime::Runtime::new().context("unable to create a runtime")?;
    runtime.block_on(combined_fut.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestError {
        Joined,
        Failed,
    }

    impl From<task::JoinError> for TestError {
        fn from(_: task::JoinError) -> Self {
            TestError::Joined
        }
    }

    #[tokio::test]
    async fn spawn_blocking_returns_closure_result() {
        let value = spawn_blocking(|| Ok::<_, TestError>(42)).await.unwrap();
        assert_eq!(value, 42);

        let err = spawn_blocking(|| Err::<(), _>(TestError::Failed))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Failed));
    }

    #[test]
    fn run_futures_with_runtime_reports_worker_errors() {
        let cmd_fut = async { Ok(()) }.boxed();
        let worker_fut = async { Err(format_err!("worker failed")) }.boxed();
        let err = run_futures_with_runtime(cmd_fut, worker_fut).unwrap_err();
        assert_eq!(err.to_string(), "worker failed");
    }
}
