use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::runner::Flow;

type Job = Box<dyn FnMut() -> Flow + Send>;

/// How long an idle worker waits for a job before re-checking shutdown.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// A shared pool of worker threads running repeatable jobs.
///
/// Each submitted job is run for one iteration and then re-queued, so many
/// jobs share the workers fairly. Jobs must be bounded per iteration — a
/// receive loop run here needs a socket read timeout, or it will starve the
/// other jobs on its worker.
pub struct WorkerPool {
    tx: Sender<Job>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let running = Arc::new(AtomicBool::new(true));

        let workers = (0..threads.max(1))
            .map(|index| {
                let rx = rx.clone();
                let tx = tx.clone();
                let running = Arc::clone(&running);
                std::thread::Builder::new()
                    .name(format!("rovecomm-worker-{index}"))
                    .spawn(move || worker_loop(&rx, &tx, &running))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            tx,
            running,
            workers,
        })
    }

    /// Queue a repeatable job. Each invocation is one bounded iteration; the
    /// job is re-queued until it returns [`Flow::Stop`] or the pool shuts
    /// down.
    pub fn submit_repeating<F>(&self, job: F)
    where
        F: FnMut() -> Flow + Send + 'static,
    {
        let _ = self.tx.send(Box::new(job));
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers and wait for them to exit. In-flight iterations
    /// finish; queued jobs are dropped.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(rx: &Receiver<Job>, tx: &Sender<Job>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(mut job) => {
                if job() == Flow::Continue && running.load(Ordering::SeqCst) {
                    let _ = tx.send(job);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
