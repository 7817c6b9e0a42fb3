//! Error-reporting context for background workers.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Span;

use crate::common::*;

/// Context shared by our asynchronous operations.
///
/// The only background worker in a normal run is the PostgreSQL connection
/// driver. If it fails, the failure surfaces through the future returned by
/// [`Context::create`], which `main` races against the ingest itself.
#[derive(Debug, Clone)]
pub struct Context {
    /// Where background workers send their failures.
    worker_errors: mpsc::Sender<Error>,
}

impl Context {
    /// Create a new context, plus a future which resolves once every clone of
    /// the context (and every worker) has gone away. It fails with the first
    /// error reported by a worker.
    pub fn create() -> (Self, BoxFuture<()>) {
        let (worker_errors, receiver) = mpsc::channel(1);
        let workers_done = ReceiverStream::new(receiver)
            .into_future()
            .map(|(first_error, _rest)| first_error.map_or(Ok(()), Err));
        (Context { worker_errors }, workers_done.boxed())
    }

    /// Run `worker` in the background inside `span`. If it fails, the error
    /// is reported to the future returned by [`Context::create`].
    pub fn spawn_worker<W>(&self, span: Span, worker: W)
    where
        W: Future<Output = Result<()>> + Send + 'static,
    {
        let worker_errors = self.worker_errors.clone();
        let reporter = async move {
            let err = match worker.await {
                Ok(()) => return,
                Err(err) => err,
            };
            debug!("background worker failed: {}", err);
            if worker_errors.send(err).await.is_err() {
                // Nobody is waiting for worker errors any more.
                debug!("could not report background worker failure");
            }
        };
        tokio::spawn(reporter.instrument(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn worker_future_succeeds_once_all_contexts_are_dropped() {
        let (ctx, worker_fut) = Context::create();
        ctx.spawn_worker(debug_span!("ok worker"), async { Ok(()) });
        drop(ctx);
        worker_fut.await.unwrap();
    }

    #[tokio::test]
    async fn worker_future_reports_first_error() {
        let (ctx, worker_fut) = Context::create();
        ctx.spawn_worker(debug_span!("failing worker"), async {
            Err(format_err!("connection lost"))
        });
        drop(ctx);
        let err = worker_fut.await.unwrap_err();
        assert_eq!(err.to_string(), "connection lost");
    }
}
