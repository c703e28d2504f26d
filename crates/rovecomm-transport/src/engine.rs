use std::sync::{Mutex, MutexGuard};

use rovecomm_packet::DataId;

/// Outcome of one receive-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// One complete unit was decoded and dispatched.
    Packet { data_id: DataId },
    /// A malformed unit was logged and discarded; the loop continues.
    Malformed,
    /// Nothing arrived within the bounded wait. Normal in pooled mode.
    Idle,
    /// The engine is closed (peer hung up or `close` was called); no further
    /// dispatch will occur.
    Closed,
}

// Handler panics are contained inside the registry, so a poisoned engine
// lock can only come from an unrelated panic; the guarded state is still
// consistent and the guard is recovered.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
