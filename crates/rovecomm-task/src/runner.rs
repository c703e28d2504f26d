use std::thread::JoinHandle;

use tracing::debug;

/// Outcome of one iteration of a repeatable unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run another iteration.
    Continue,
    /// The work is finished; release the executor.
    Stop,
}

/// Runs a unit of work on a permanently dedicated named thread until it
/// reports [`Flow::Stop`].
///
/// Dropping the runner detaches the thread; the work keeps running until it
/// stops itself (for a receive loop, until its socket closes).
pub struct ContinuousRunner {
    handle: Option<JoinHandle<()>>,
}

impl ContinuousRunner {
    /// Spawn the dedicated thread. Fails only if the OS refuses a new thread.
    pub fn spawn<F>(name: impl Into<String>, mut work: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Flow + Send + 'static,
    {
        let name = name.into();
        let handle = std::thread::Builder::new().name(name.clone()).spawn(move || {
            while let Flow::Continue = work() {}
            debug!(thread = %name, "continuous task stopped");
        })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Whether the work has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(std::thread::JoinHandle::is_finished)
    }

    /// Block until the work stops.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
