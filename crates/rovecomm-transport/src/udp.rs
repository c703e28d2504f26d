use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use rovecomm_packet::{decode_header, encode_packet, Packet, WireElement, HEADER_SIZE};
use rovecomm_registry::CallbackRegistry;
use rovecomm_task::{ContinuousRunner, Flow, WorkerPool};
use tracing::{debug, error, info, warn};

use crate::engine::{lock, Received};
use crate::error::{Result, TransportError};

/// Largest payload a UDP datagram can carry over IPv4.
const MAX_DATAGRAM: usize = 65_507;

/// One RoveComm UDP socket: connectionless sender and/or receiver.
///
/// Same packet format, registry, and run modes as TCP; no handshake and no
/// stream reassembly. Each received datagram is expected to hold exactly one
/// wire unit — a short datagram is a decode failure, surplus bytes are
/// discarded.
pub struct UdpEngine {
    socket: UdpSocket,
    recv_buf: Mutex<Vec<u8>>,
    registry: Arc<CallbackRegistry>,
    #[cfg(feature = "manifest")]
    manifest: Option<Arc<rovecomm_manifest::Manifest>>,
    closed: AtomicBool,
}

impl UdpEngine {
    /// Bind a receiving socket on `addr`.
    pub fn bind(addr: SocketAddr, registry: Arc<CallbackRegistry>) -> Result<Self> {
        let socket =
            UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        info!(%addr, "bound rovecomm udp socket");
        Ok(Self::from_socket(socket, registry))
    }

    /// A pure sender on an ephemeral local port.
    pub fn sender(registry: Arc<CallbackRegistry>) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket =
            UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self::from_socket(socket, registry))
    }

    fn from_socket(socket: UdpSocket, registry: Arc<CallbackRegistry>) -> Self {
        Self {
            socket,
            recv_buf: Mutex::new(vec![0u8; HEADER_SIZE + MAX_DATAGRAM]),
            registry,
            #[cfg(feature = "manifest")]
            manifest: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Validate every decoded header against `manifest` before dispatch;
    /// violations are logged and the datagram discarded.
    #[cfg(feature = "manifest")]
    pub fn with_manifest(mut self, manifest: Arc<rovecomm_manifest::Manifest>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// The socket's local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The registry this engine dispatches through.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Bound the blocking receive (`None` blocks indefinitely).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Encode `packet` and transmit it as one datagram to `dest`.
    ///
    /// Datagrams are atomic at the socket API: the whole frame is sent or
    /// the call fails — there is no partial-write retry path.
    pub fn send<T: WireElement>(&self, packet: &Packet<T>, dest: SocketAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut frame = BytesMut::with_capacity(packet.wire_size());
        encode_packet(packet, &mut frame);

        let sent = self.socket.send_to(&frame, dest)?;
        if sent != frame.len() {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "short datagram send ({sent} of {} bytes)",
                frame.len()
            ))));
        }
        Ok(sent)
    }

    /// Run one receive iteration: read a single datagram, decode it as one
    /// wire unit, dispatch it with the sender's address attached.
    ///
    /// Call from exactly one loop at a time.
    pub fn receive_once(&self) -> Result<Received> {
        if self.is_closed() {
            return Ok(Received::Closed);
        }
        let mut buf = lock(&self.recv_buf);

        match self.socket.recv_from(&mut buf) {
            Ok((len, source)) => {
                // close() wakes a blocked reader with an empty datagram;
                // re-check before dispatching anything.
                if self.is_closed() {
                    return Ok(Received::Closed);
                }
                let datagram = &buf[..len];

                let header = match decode_header(datagram) {
                    Ok(header) => header,
                    Err(err) => {
                        warn!(%source, %err, "dropping malformed datagram");
                        return Ok(Received::Malformed);
                    }
                };

                #[cfg(feature = "manifest")]
                if let Some(manifest) = &self.manifest {
                    if let Err(err) = manifest.validate(&header) {
                        warn!(%source, %err, "dropping datagram rejected by manifest");
                        return Ok(Received::Malformed);
                    }
                }

                // A short payload is a decode error; surplus bytes beyond
                // the declared payload are discarded by the codec.
                match self
                    .registry
                    .dispatch_raw(&header, &datagram[HEADER_SIZE..], Some(source))
                {
                    Ok(_) => Ok(Received::Packet {
                        data_id: header.data_id,
                    }),
                    Err(err) => {
                        warn!(%source, %err, "dropping malformed datagram");
                        Ok(Received::Malformed)
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(Received::Idle),
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                Ok(Received::Idle)
            }
            Err(_) if self.is_closed() => Ok(Received::Closed),
            Err(err) => {
                self.closed.store(true, Ordering::SeqCst);
                Err(TransportError::Io(err))
            }
        }
    }

    /// Run the receive loop on a permanently dedicated thread with blocking
    /// reads, until the engine is closed.
    pub fn run_continuous(self: &Arc<Self>) -> Result<ContinuousRunner> {
        self.set_read_timeout(None)?;
        let local = self.local_addr()?;
        let engine = Arc::clone(self);
        let runner = ContinuousRunner::spawn(
            format!("rovecomm-udp-{local}"),
            move || engine.receive_step(),
        )?;
        Ok(runner)
    }

    /// Submit the receive loop to a shared worker pool as repeated bounded
    /// iterations.
    pub fn run_pooled(self: &Arc<Self>, pool: &WorkerPool, poll_timeout: Duration) -> Result<()> {
        self.set_read_timeout(Some(poll_timeout))?;
        let engine = Arc::clone(self);
        pool.submit_repeating(move || engine.receive_step());
        Ok(())
    }

    fn receive_step(&self) -> Flow {
        match self.receive_once() {
            Ok(Received::Closed) => Flow::Stop,
            Ok(_) => Flow::Continue,
            Err(err) => {
                error!(%err, "udp receive loop terminating");
                Flow::Stop
            }
        }
    }

    /// Whether this engine has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the engine closed and wake any blocked receiver. Idempotent;
    /// also invoked on drop.
    ///
    /// UDP has no shutdown that reliably unblocks a reader, so the wakeup is
    /// a zero-length datagram fired at the socket's own port; the receive
    /// path re-checks the closed flag before dispatching.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing rovecomm udp engine");

        if let Ok(mut addr) = self.socket.local_addr() {
            if addr.ip().is_unspecified() {
                addr.set_ip(match addr.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                });
            }
            let _ = self.socket.send_to(&[], addr);
        }
    }
}

impl Drop for UdpEngine {
    fn drop(&mut self) {
        self.close();
    }
}
