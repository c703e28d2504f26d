//! Data-identifier manifest for RoveComm.
//!
//! The manifest maps symbolic stream names to numeric data identifiers and
//! declares each identifier's element type and expected count. The codec and
//! transports consume it as a lookup; an engine configured with a manifest
//! rejects decoded headers that contradict it (strict mode).

pub mod error;
pub mod manifest;

pub use error::{ManifestError, Result};
pub use manifest::{Manifest, ManifestEntry};
