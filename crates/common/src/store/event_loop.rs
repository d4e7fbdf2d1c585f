//! Single-threaded execution context
//!
//! An [`EventLoop`] is a dedicated thread draining a flume job queue in FIFO
//! order. The store posts every signal delivery onto one, so listeners never
//! run on the stack of the mutating call and always observe events in the
//! order the mutations happened. The same type backs the optional leaf
//! get/set hand-off in [`super::DispatchedStore`].

use std::thread::{self, ThreadId};

use anyhow::{anyhow, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle for posting work onto the loop thread
///
/// The thread exits once every handle has been dropped and the queue is
///  drained.
#[derive(Debug, Clone)]
pub struct EventLoop {
    tx: flume::Sender<Job>,
    thread_id: ThreadId,
}

impl EventLoop {
    /// Spawn the loop thread
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = flume::unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                tracing::debug!("event loop {:?} drained", thread::current().name());
            })
            .map_err(|e| anyhow!("failed to spawn event loop thread: {}", e))?;
        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
        })
    }

    /// Queue a job; returns false if the loop is gone
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// True when called from the loop thread itself
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `f` on the loop and block until it finishes
    ///
    /// Runs inline when already on the loop thread, so a job may call back
    ///  into its own loop without deadlocking.
    pub fn call<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }
        let (reply_tx, reply_rx) = flume::bounded(1);
        let posted = self.post(move || {
            let _ = reply_tx.send(f());
        });
        if !posted {
            return None;
        }
        reply_rx.recv().ok()
    }

    /// Like [`EventLoop::call`] but awaits the result instead of blocking
    pub async fn call_async<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }
        let (reply_tx, reply_rx) = flume::bounded(1);
        let posted = self.post(move || {
            let _ = reply_tx.send(f());
        });
        if !posted {
            return None;
        }
        reply_rx.recv_async().await.ok()
    }

    /// Block until everything posted before this call has run
    pub fn flush(&self) {
        let _ = self.call(|| ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_order() {
        let event_loop = EventLoop::spawn("test-loop").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let seen = seen.clone();
            assert!(event_loop.post(move || seen.lock().unwrap().push(i)));
        }
        event_loop.flush();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_call_returns_value_and_runs_off_thread() {
        let event_loop = EventLoop::spawn("test-loop").unwrap();
        assert!(!event_loop.is_current());
        let inner = event_loop.clone();
        let on_loop = event_loop.call(move || inner.is_current()).unwrap();
        assert!(on_loop);
    }

    #[test]
    fn test_nested_call_does_not_deadlock() {
        let event_loop = EventLoop::spawn("test-loop").unwrap();
        let inner = event_loop.clone();
        let result = event_loop.call(move || inner.call(|| 7).unwrap() + 1);
        assert_eq!(result, Some(8));
    }

    #[tokio::test]
    async fn test_call_async() {
        let event_loop = EventLoop::spawn("test-loop").unwrap();
        let result = event_loop.call_async(|| "done").await;
        assert_eq!(result, Some("done"));
    }
}
