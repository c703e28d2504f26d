//! RoveComm: typed, numerically-identified pub/sub over UDP and TCP.
//!
//! Robotic-subsystem processes exchange packets keyed by a numeric data
//! identifier without knowing each other's addresses in advance: consumers
//! register handlers against an identifier, producers publish by identifier,
//! and the transports route decoded packets to every matching handler.
//!
//! - UDP for best-effort telemetry, TCP for reliable control/command.
//! - One fixed 6-byte header plus big-endian elements; the same wire format
//!   on both transports.
//! - Receive loops run either on a dedicated thread or as repeated bounded
//!   tasks on a shared worker pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rovecomm::{CallbackRegistry, Packet, UdpEngine};
//!
//! # fn main() -> rovecomm::transport::Result<()> {
//! let registry = Arc::new(CallbackRegistry::new());
//! registry.add::<u32, _>(7, |packet| {
//!     println!("id {}: {:?}", packet.data_id, packet.elements);
//! });
//!
//! let receiver = Arc::new(UdpEngine::bind("0.0.0.0:11000".parse().unwrap(), registry)?);
//! let _loop = receiver.run_continuous()?;
//!
//! let sender = UdpEngine::sender(Arc::new(CallbackRegistry::new()))?;
//! sender.send(&Packet::<u32>::new(7, vec![1, 2, 3]), "127.0.0.1:11000".parse().unwrap())?;
//! # Ok(())
//! # }
//! ```

pub use rovecomm_packet::{
    decode_elements, decode_header, decode_packet, encode_header, encode_packet, AsciiChar,
    DataId, DecodeError, ElementType, Packet, PacketHeader, WireElement, HEADER_SIZE,
};
pub use rovecomm_registry::{CallbackRegistry, Handler};
pub use rovecomm_task::{ContinuousRunner, Flow, WorkerPool};
pub use rovecomm_transport::{Received, TcpEngine, TcpHost, TransportError, UdpEngine};

#[cfg(feature = "manifest")]
pub use rovecomm_manifest::{Manifest, ManifestEntry, ManifestError};

/// The transport layer's error/result types, for callers that need the
/// module path.
pub mod transport {
    pub use rovecomm_transport::{Result, TransportError};
}
