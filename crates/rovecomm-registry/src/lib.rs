//! Concurrent callback registry and dispatch for RoveComm packets.
//!
//! Subscribers register handlers against a data identifier; the transports
//! push every decoded packet through [`CallbackRegistry::dispatch_raw`], which
//! matches the wire element-type tag to the right generic instantiation and
//! invokes the matching handlers in registration order.

pub mod registry;

pub use registry::{CallbackRegistry, Handler};
