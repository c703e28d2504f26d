//! TCP and UDP engines for RoveComm.
//!
//! An engine exclusively owns one socket: it connects or binds on
//! construction, encodes and sends typed packets, and runs a receive loop
//! that decodes each wire unit and pushes it through the shared
//! [`CallbackRegistry`](rovecomm_registry::CallbackRegistry). Both engines
//! expose the same two run modes — a dedicated blocking thread or repeated
//! bounded iterations on a shared worker pool — and leave the choice to the
//! caller.

pub mod engine;
pub mod error;
pub mod tcp;
pub mod udp;

pub use engine::Received;
pub use error::{Result, TransportError};
pub use tcp::{TcpEngine, TcpHost};
pub use udp::UdpEngine;
