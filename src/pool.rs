//! Bounded background compilation pool.
//!
//! A fixed set of named worker threads drains a bounded queue. Submission
//! never blocks: a full queue is reported back to the caller. There is no
//! cancellation; dropping the pool closes the queue, lets the workers finish
//! what was already queued, and joins them.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

/// Work item run on a pool thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not accepted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("async compile queue is full")]
    Saturated,

    #[error("async compile pool is shut down")]
    ShutDown,
}

/// Fixed-size worker pool with a bounded queue.
pub struct AsyncCompilePool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncCompilePool {
    /// Spawn `workers` threads sharing a queue of `max_pending` slots.
    ///
    /// `max_pending` counts queued jobs, not jobs already running.
    pub fn new(workers: usize, max_pending: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(max_pending);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(workers),
        };
        for index in 0..workers {
            let receiver = Arc::clone(&receiver);
            // On spawn failure, dropping `pool` joins the threads already started.
            let handle = thread::Builder::new()
                .name(format!("graphcache-async-{}", index))
                .spawn(move || worker_loop(&receiver))?;
            pool.workers.push(handle);
        }

        debug!(workers, max_pending, "async compile pool started");
        Ok(pool)
    }

    /// Queue a job without blocking.
    pub fn try_submit(&self, job: Job) -> Result<(), SubmitError> {
        let sender = self.sender.as_ref().ok_or(SubmitError::ShutDown)?;
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Saturated,
            TrySendError::Disconnected(_) => SubmitError::ShutDown,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let next = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            // Queue closed and drained
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("async compile job panicked");
        }
    }
}

impl Drop for AsyncCompilePool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("async compile worker exited abnormally");
            }
        }
    }
}
