use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use rovecomm_packet::{
    decode_elements, AsciiChar, DataId, DecodeError, ElementType, Packet, PacketHeader, WireElement,
};
use tracing::error;

/// A registered packet handler. Removal matches by `Arc` pointer identity,
/// so keep the value returned from [`CallbackRegistry::add`] if you intend
/// to unsubscribe.
pub type Handler<T> = Arc<dyn Fn(&Packet<T>) + Send + Sync>;

type Key = (TypeId, DataId);

/// One subscription slot. The box holds a `Handler<T>` for the `T` encoded
/// in the map key.
struct Entry {
    handler: Box<dyn Any + Send + Sync>,
}

impl Entry {
    fn downcast<T: WireElement>(&self) -> Option<&Handler<T>> {
        self.handler.downcast_ref::<Handler<T>>()
    }
}

/// Thread-safe store of (handler, data id) subscriptions.
///
/// Keyed internally by `(element type, data id)`; insertion order within a
/// key is dispatch order. The lock guards mutation and snapshotting only —
/// handlers always run with the lock released, so `add`/`remove` never wait
/// on a slow handler.
pub struct CallbackRegistry {
    subscriptions: Mutex<HashMap<Key, Vec<Entry>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe `handler` to packets carrying `data_id` with elements of
    /// type `T`. Returns the stored handle for later [`remove`](Self::remove).
    pub fn add<T, F>(&self, data_id: DataId, handler: F) -> Handler<T>
    where
        T: WireElement,
        F: Fn(&Packet<T>) + Send + Sync + 'static,
    {
        let handler: Handler<T> = Arc::new(handler);
        self.add_handler(data_id, Arc::clone(&handler));
        handler
    }

    /// Subscribe an existing handler handle.
    pub fn add_handler<T: WireElement>(&self, data_id: DataId, handler: Handler<T>) {
        let mut subscriptions = lock(&self.subscriptions);
        subscriptions
            .entry(key::<T>(data_id))
            .or_default()
            .push(Entry {
                handler: Box::new(handler),
            });
    }

    /// Remove the first subscription for `data_id` whose handler is the same
    /// `Arc` as `handler`. Returns whether anything was removed; absent
    /// handlers are a no-op.
    pub fn remove<T: WireElement>(&self, data_id: DataId, handler: &Handler<T>) -> bool {
        let mut subscriptions = lock(&self.subscriptions);
        let Some(entries) = subscriptions.get_mut(&key::<T>(data_id)) else {
            return false;
        };

        let position = entries
            .iter()
            .position(|entry| entry.downcast::<T>().is_some_and(|h| Arc::ptr_eq(h, handler)));

        match position {
            Some(index) => {
                entries.remove(index);
                if entries.is_empty() {
                    subscriptions.remove(&key::<T>(data_id));
                }
                true
            }
            None => false,
        }
    }

    /// Number of subscriptions for `(T, data_id)`.
    pub fn subscriber_count<T: WireElement>(&self, data_id: DataId) -> usize {
        lock(&self.subscriptions)
            .get(&key::<T>(data_id))
            .map_or(0, Vec::len)
    }

    /// Invoke every handler subscribed to this packet's identifier, in
    /// registration order. Returns the number of handlers invoked.
    ///
    /// A panicking handler is caught and logged; the remaining handlers and
    /// the caller are unaffected.
    pub fn dispatch<T: WireElement>(&self, packet: &Packet<T>) -> usize {
        let snapshot: Vec<Handler<T>> = {
            let subscriptions = lock(&self.subscriptions);
            match subscriptions.get(&key::<T>(packet.data_id)) {
                Some(entries) => entries
                    .iter()
                    .filter_map(|entry| entry.downcast::<T>().cloned())
                    .collect(),
                None => Vec::new(),
            }
        };

        for handler in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(packet))).is_err() {
                error!(
                    data_id = packet.data_id,
                    "packet handler panicked; continuing with remaining handlers"
                );
            }
        }
        snapshot.len()
    }

    /// Decode a received unit and dispatch it.
    ///
    /// Matches the header's element-type tag to select the generic
    /// instantiation, so the transports stay monomorphic. Returns the number
    /// of handlers invoked, or the decode error for a malformed payload.
    pub fn dispatch_raw(
        &self,
        header: &PacketHeader,
        payload: &[u8],
        source: Option<SocketAddr>,
    ) -> Result<usize, DecodeError> {
        match header.element_type {
            ElementType::Int8 => self.dispatch_decoded::<i8>(header, payload, source),
            ElementType::Uint8 => self.dispatch_decoded::<u8>(header, payload, source),
            ElementType::Int16 => self.dispatch_decoded::<i16>(header, payload, source),
            ElementType::Uint16 => self.dispatch_decoded::<u16>(header, payload, source),
            ElementType::Int32 => self.dispatch_decoded::<i32>(header, payload, source),
            ElementType::Uint32 => self.dispatch_decoded::<u32>(header, payload, source),
            ElementType::Int64 => self.dispatch_decoded::<i64>(header, payload, source),
            ElementType::Uint64 => self.dispatch_decoded::<u64>(header, payload, source),
            ElementType::Float => self.dispatch_decoded::<f32>(header, payload, source),
            ElementType::Double => self.dispatch_decoded::<f64>(header, payload, source),
            ElementType::Char => self.dispatch_decoded::<AsciiChar>(header, payload, source),
        }
    }

    fn dispatch_decoded<T: WireElement>(
        &self,
        header: &PacketHeader,
        payload: &[u8],
        source: Option<SocketAddr>,
    ) -> Result<usize, DecodeError> {
        let elements = decode_elements::<T>(header, payload)?;
        let packet = Packet {
            data_id: header.data_id,
            elements,
            source,
        };
        Ok(self.dispatch(&packet))
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn key<T: WireElement>(data_id: DataId) -> Key {
    (TypeId::of::<T>(), data_id)
}

// Handlers never run under the lock, so a poisoned mutex only means a panic
// elsewhere while the map itself is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
