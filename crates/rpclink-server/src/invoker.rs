//! The designated single-threaded execution context for method invocation.
//!
//! All invocations, from every connection, run on one dedicated OS thread.
//! A synchronous call blocks its caller (through a oneshot reply) until the
//! method body returns; a posted call is queued and forgotten, so any return
//! value it produces is discarded.  A panicking method body is caught on the
//! invoker thread and surfaced as an [`InvokeFault`], never as a crashed
//! dispatch loop.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use rpclink_core::Value;

use crate::registry::{InvokeFault, MethodHandler};

struct Job {
    handler: MethodHandler,
    args: Vec<Value>,
    /// `None` for posted (fire-and-forget) invocations.
    reply: Option<oneshot::Sender<Result<Value, InvokeFault>>>,
}

/// Handle to the invoker thread.  Cloneable; the thread exits when the last
/// handle is dropped.
#[derive(Clone)]
pub struct Invoker {
    job_tx: mpsc::UnboundedSender<Job>,
}

impl Invoker {
    /// Spawns the invoker thread.
    pub fn start() -> Self {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();

        std::thread::Builder::new()
            .name("rpclink-invoker".to_string())
            .spawn(move || {
                while let Some(job) = job_rx.blocking_recv() {
                    let result = run_caught(&job.handler, &job.args);
                    match job.reply {
                        Some(reply) => {
                            // A dropped receiver means the caller gave up
                            // (e.g. its connection died); nothing to do.
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(fault) = result {
                                debug!("posted invocation failed: {fault}");
                            }
                        }
                    }
                }
                debug!("invoker thread stopped");
            })
            .expect("failed to spawn invoker thread");

        Self { job_tx }
    }

    /// Runs the handler on the invoker thread and waits for its result.
    pub async fn call(
        &self,
        handler: MethodHandler,
        args: Vec<Value>,
    ) -> Result<Value, InvokeFault> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            handler,
            args,
            reply: Some(reply_tx),
        };
        if self.job_tx.send(job).is_err() {
            error!("invoker thread is gone");
            return Err(InvokeFault::new("execution context unavailable"));
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err(InvokeFault::new("execution context dropped the call")))
    }

    /// Posts the handler to the invoker thread without waiting.  The return
    /// value, if any, is discarded.
    pub fn post(&self, handler: MethodHandler, args: Vec<Value>) -> bool {
        let job = Job {
            handler,
            args,
            reply: None,
        };
        self.job_tx.send(job).is_ok()
    }
}

fn run_caught(handler: &MethodHandler, args: &[Value]) -> Result<Value, InvokeFault> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("invocation panicked: {message}");
            Err(InvokeFault::new(format!("invocation panicked: {message}")))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn handler_of<F>(f: F) -> MethodHandler
    where
        F: Fn(&[Value]) -> Result<Value, InvokeFault> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[tokio::test]
    async fn test_call_returns_handler_result() {
        let invoker = Invoker::start();
        let handler = handler_of(|args| match args {
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int(a * b)),
            _ => Err(InvokeFault::new("bad args")),
        });
        let result = invoker
            .call(handler, vec![Value::Int(6), Value::Int(7)])
            .await;
        assert_eq!(result, Ok(Value::Int(42)));
    }

    #[tokio::test]
    async fn test_call_surfaces_handler_fault() {
        let invoker = Invoker::start();
        let handler = handler_of(|_| Err(InvokeFault::new("boom")));
        let result = invoker.call(handler, vec![]).await;
        assert_eq!(result, Err(InvokeFault::new("boom")));
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_fault_and_thread_survives() {
        let invoker = Invoker::start();
        let panicking = handler_of(|_| panic!("deliberate test panic"));
        let result = invoker.call(panicking, vec![]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().0.contains("panicked"));

        // The invoker thread must still serve subsequent calls.
        let ok = handler_of(|_| Ok(Value::Int(1)));
        assert_eq!(invoker.call(ok, vec![]).await, Ok(Value::Int(1)));
    }

    #[tokio::test]
    async fn test_posted_call_runs_without_being_awaited() {
        let invoker = Invoker::start();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let handler = handler_of(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        assert!(invoker.post(handler, vec![]));

        // Synchronize on a follow-up call: the single-threaded context runs
        // jobs in order, so once this returns the posted job has finished.
        let noop = handler_of(|_| Ok(Value::Null));
        invoker.call(noop, vec![]).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calls_are_serialized_on_one_thread() {
        let invoker = Invoker::start();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlap_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let in_flight = Arc::clone(&in_flight);
            let overlap_seen = Arc::clone(&overlap_seen);
            let invoker = invoker.clone();
            handles.push(tokio::spawn(async move {
                let handler = handler_of(move |_| {
                    if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlap_seen.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                });
                invoker.call(handler, vec![]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(overlap_seen.load(Ordering::SeqCst), 0);
    }
}
