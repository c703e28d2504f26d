use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use rovecomm_packet::{
    decode_header, encode_packet, DecodeError, Packet, PacketHeader, WireElement, HEADER_SIZE,
};
use rovecomm_registry::CallbackRegistry;
use rovecomm_task::{ContinuousRunner, Flow, WorkerPool};
use tracing::{debug, error, info, warn};

use crate::engine::{lock, Received};
use crate::error::{Result, TransportError};

const RECV_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Listens for RoveComm TCP connections and hands each accepted one to a
/// fresh [`TcpEngine`].
pub struct TcpHost {
    listener: TcpListener,
}

impl TcpHost {
    /// Bind and listen on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        info!(%addr, "listening for rovecomm tcp connections");
        Ok(Self { listener })
    }

    /// The bound local address (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next connection (blocking). One accepted connection per
    /// engine instance.
    pub fn accept(&self, registry: Arc<CallbackRegistry>) -> Result<TcpEngine> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted rovecomm tcp connection");
        TcpEngine::from_stream(stream, peer, registry)
    }
}

/// Buffered read half: accumulates stream bytes until complete units can be
/// carved off.
struct StreamReader {
    stream: TcpStream,
    buf: BytesMut,
}

/// One connected RoveComm TCP stream.
///
/// Exclusively owns its socket. `send` may be called concurrently with the
/// receive loop and with other `send`s; the write path is serialized by a
/// mutex around the encode+write sequence. Exactly one receive loop may run
/// at a time. Once closed, the engine is done — reconnecting means a fresh
/// instance.
pub struct TcpEngine {
    /// Owner handle, used for shutdown and socket options. Read and write
    /// halves are `try_clone`d descriptors of the same socket.
    stream: TcpStream,
    reader: Mutex<StreamReader>,
    writer: Mutex<TcpStream>,
    registry: Arc<CallbackRegistry>,
    #[cfg(feature = "manifest")]
    manifest: Option<Arc<rovecomm_manifest::Manifest>>,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl TcpEngine {
    /// Connect to a listening peer (client role).
    pub fn connect(addr: SocketAddr, registry: Arc<CallbackRegistry>) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected rovecomm tcp client");
        Self::from_stream(stream, addr, registry)
    }

    fn from_stream(
        stream: TcpStream,
        peer: SocketAddr,
        registry: Arc<CallbackRegistry>,
    ) -> Result<Self> {
        let read_half = stream.try_clone()?;
        let write_half = stream.try_clone()?;
        Ok(Self {
            stream,
            reader: Mutex::new(StreamReader {
                stream: read_half,
                buf: BytesMut::with_capacity(RECV_BUFFER_CAPACITY),
            }),
            writer: Mutex::new(write_half),
            registry,
            #[cfg(feature = "manifest")]
            manifest: None,
            peer,
            closed: AtomicBool::new(false),
        })
    }

    /// Validate every decoded header against `manifest` before dispatch;
    /// violations are logged and the unit discarded.
    #[cfg(feature = "manifest")]
    pub fn with_manifest(mut self, manifest: Arc<rovecomm_manifest::Manifest>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// The connected peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The socket's local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// The registry this engine dispatches through.
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Bound the blocking read (`None` blocks indefinitely). Pooled mode
    /// requires a bound; [`run_pooled`](Self::run_pooled) sets one itself.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    /// Encode `packet` and write the complete frame, retrying partial
    /// writes. Returns the number of bytes written.
    ///
    /// `dest` is informational on a connected stream: it is checked against
    /// the peer and warned about on mismatch, never used to redirect.
    pub fn send<T: WireElement>(&self, packet: &Packet<T>, dest: SocketAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if dest != self.peer {
            warn!(
                %dest,
                peer = %self.peer,
                "send destination differs from connected peer; writing to peer"
            );
        }

        let mut frame = BytesMut::with_capacity(packet.wire_size());
        encode_packet(packet, &mut frame);

        let mut writer = lock(&self.writer);
        write_all_retrying(&mut *writer, &frame)?;
        Ok(frame.len())
    }

    /// Run one receive iteration: read until one complete unit is buffered,
    /// decode it, dispatch it.
    ///
    /// Call from exactly one loop at a time. Returns [`Received::Idle`] on a
    /// bounded-wait timeout, [`Received::Closed`] when the peer hangs up or
    /// the engine is closed, and `Err` only for a broken transport.
    pub fn receive_once(&self) -> Result<Received> {
        if self.is_closed() {
            return Ok(Received::Closed);
        }
        let mut reader = lock(&self.reader);

        loop {
            match try_extract_unit(&mut reader.buf) {
                Extract::Unit { header, payload } => {
                    return Ok(self.dispatch_unit(&header, &payload));
                }
                Extract::BadHeader(err) => {
                    // The unit cannot be sized; drop the header bytes and
                    // resynchronize on whatever follows.
                    warn!(peer = %self.peer, %err, "discarding malformed packet header");
                    reader.buf.advance(HEADER_SIZE);
                    return Ok(Received::Malformed);
                }
                Extract::NeedMore => {}
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match reader.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed.store(true, Ordering::SeqCst);
                    debug!(peer = %self.peer, "peer closed connection");
                    return Ok(Received::Closed);
                }
                Ok(read) => reader.buf.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(Received::Idle);
                }
                Err(_) if self.is_closed() => return Ok(Received::Closed),
                Err(err) => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Err(TransportError::Io(err));
                }
            }
        }
    }

    fn dispatch_unit(&self, header: &PacketHeader, payload: &[u8]) -> Received {
        #[cfg(feature = "manifest")]
        if let Some(manifest) = &self.manifest {
            if let Err(err) = manifest.validate(header) {
                warn!(peer = %self.peer, %err, "dropping packet rejected by manifest");
                return Received::Malformed;
            }
        }

        match self.registry.dispatch_raw(header, payload, Some(self.peer)) {
            Ok(_) => Received::Packet {
                data_id: header.data_id,
            },
            Err(err) => {
                warn!(peer = %self.peer, %err, "dropping malformed packet");
                Received::Malformed
            }
        }
    }

    /// Run the receive loop on a permanently dedicated thread with blocking
    /// reads, until the connection closes.
    pub fn run_continuous(self: &Arc<Self>) -> Result<ContinuousRunner> {
        self.set_read_timeout(None)?;
        let engine = Arc::clone(self);
        let runner = ContinuousRunner::spawn(
            format!("rovecomm-tcp-{}", self.peer),
            move || engine.receive_step(),
        )?;
        Ok(runner)
    }

    /// Submit the receive loop to a shared worker pool as repeated bounded
    /// iterations. `poll_timeout` bounds each socket read so one connection
    /// cannot starve the pool.
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
                error!(peer = %self.peer, %err, "tcp receive loop terminating");
                Flow::Stop
            }
        }
    }

    /// Whether this engine has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut the socket down and mark the engine closed. Idempotent; unblocks
    /// an in-flight blocking read. Also invoked on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(peer = %self.peer, "closing rovecomm tcp engine");
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Drop for TcpEngine {
    fn drop(&mut self) {
        self.close();
    }
}

enum Extract {
    /// A complete unit was carved off the front of the buffer.
    Unit {
        header: PacketHeader,
        payload: Bytes,
    },
    /// The header cannot be decoded, so the unit cannot be sized.
    BadHeader(DecodeError),
    /// Not enough bytes buffered yet.
    NeedMore,
}

/// Carve one complete wire unit off the front of `buf`, if available.
fn try_extract_unit(buf: &mut BytesMut) -> Extract {
    if buf.len() < HEADER_SIZE {
        return Extract::NeedMore;
    }

    let header = match decode_header(&buf[..HEADER_SIZE]) {
        Ok(header) => header,
        Err(err) => return Extract::BadHeader(err),
    };

    let total = HEADER_SIZE + header.payload_len();
    if buf.len() < total {
        return Extract::NeedMore;
    }

    buf.advance(HEADER_SIZE);
    let payload = buf.split_to(header.payload_len()).freeze();
    Extract::Unit { header, payload }
}

/// Write the whole buffer, retrying partial writes and transient errors.
/// TCP gives no per-call atomicity; this supplies it.
fn write_all_retrying<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < frame.len() {
        match writer.write(&frame[offset..]) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(written) => offset += written,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use rovecomm_packet::{encode_header, ElementType};

    use super::*;

    fn loopback_pair(registry: Arc<CallbackRegistry>) -> (TcpEngine, TcpEngine) {
        let host = TcpHost::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = host.local_addr().unwrap();

        let client_registry = Arc::new(CallbackRegistry::new());
        let client = std::thread::spawn(move || TcpEngine::connect(addr, client_registry).unwrap());
        let server = host.accept(registry).unwrap();
        (client.join().unwrap(), server)
    }

    #[test]
    fn send_receive_dispatch_roundtrip() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, rx) = mpsc::channel();
        registry.add::<u32, _>(7, move |packet| {
            tx.send(packet.clone()).unwrap();
        });

        let (client, server) = loopback_pair(Arc::clone(&registry));

        let packet = Packet::<u32>::new(7, vec![1, 2, 3]);
        let written = client.send(&packet, client.peer_addr()).unwrap();
        assert_eq!(written, packet.wire_size());

        assert_eq!(
            server.receive_once().unwrap(),
            Received::Packet { data_id: 7 }
        );
        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received.data_id, 7);
        assert_eq!(received.elements, vec![1, 2, 3]);
        assert_eq!(received.source, Some(server.peer_addr()));
    }

    #[test]
    fn packets_dispatch_in_stream_order() {
        let registry = Arc::new(CallbackRegistry::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        registry.add::<i16, _>(4, move |packet| {
            sink.lock().unwrap().push(packet.elements[0]);
        });

        let (client, server) = loopback_pair(Arc::clone(&registry));

        for value in 0..5i16 {
            client
                .send(&Packet::<i16>::new(4, vec![value]), client.peer_addr())
                .unwrap();
        }
        for _ in 0..5 {
            assert_eq!(
                server.receive_once().unwrap(),
                Received::Packet { data_id: 4 }
            );
        }

        assert_eq!(order.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn malformed_header_skipped_connection_survives() {
        let registry = Arc::new(CallbackRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.add::<u8, _>(2, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (client, server) = loopback_pair(Arc::clone(&registry));

        // Unknown element-type tag, then a valid packet.
        let mut raw = lock(&client.writer);
        raw.write_all(&[0x00, 0x02, 0xFF, 0x00, 0x00, 0x01]).unwrap();
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u8>::new(2, vec![9]), &mut wire);
        raw.write_all(&wire).unwrap();
        drop(raw);

        assert_eq!(server.receive_once().unwrap(), Received::Malformed);
        assert_eq!(
            server.receive_once().unwrap(),
            Received::Packet { data_id: 2 }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!server.is_closed());
    }

    #[test]
    fn peer_hangup_reports_closed_once() {
        let registry = Arc::new(CallbackRegistry::new());
        let (client, server) = loopback_pair(registry);

        drop(client);
        assert_eq!(server.receive_once().unwrap(), Received::Closed);
        assert!(server.is_closed());
        // Terminal state is sticky.
        assert_eq!(server.receive_once().unwrap(), Received::Closed);
    }

    #[test]
    fn bounded_read_reports_idle() {
        let registry = Arc::new(CallbackRegistry::new());
        let (_client, server) = loopback_pair(registry);

        server
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(server.receive_once().unwrap(), Received::Idle);
        assert!(!server.is_closed());
    }

    #[test]
    fn close_is_idempotent_and_unblocks_reader() {
        let registry = Arc::new(CallbackRegistry::new());
        let (client, server) = loopback_pair(registry);
        let server = Arc::new(server);

        let blocked = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || server.receive_once())
        };
        std::thread::sleep(Duration::from_millis(50));

        server.close();
        server.close();
        assert_eq!(blocked.join().unwrap().unwrap(), Received::Closed);

        assert!(matches!(
            server.send(&Packet::<u8>::new(1, vec![0]), server.peer_addr()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn continuous_mode_end_to_end() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, rx) = mpsc::channel();
        registry.add::<u32, _>(7, move |packet| {
            tx.send(packet.elements.clone()).unwrap();
        });

        let (client, server) = loopback_pair(Arc::clone(&registry));
        let server = Arc::new(server);
        let runner = server.run_continuous().unwrap();

        client
            .send(&Packet::<u32>::new(7, vec![1, 2, 3]), client.peer_addr())
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            vec![1, 2, 3]
        );

        drop(client);
        runner.join();
        assert!(server.is_closed());
    }

    #[test]
    fn pooled_mode_end_to_end() {
        let registry = Arc::new(CallbackRegistry::new());
        let (tx, rx) = mpsc::channel();
        registry.add::<f64, _>(11, move |packet| {
            tx.send(packet.elements.clone()).unwrap();
        });

        let (client, server) = loopback_pair(Arc::clone(&registry));
        let server = Arc::new(server);
        let pool = WorkerPool::new(2).unwrap();
        server
            .run_pooled(&pool, Duration::from_millis(10))
            .unwrap();

        client
            .send(&Packet::<f64>::new(11, vec![0.5, -0.5]), client.peer_addr())
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            vec![0.5, -0.5]
        );

        server.close();
        pool.shutdown();
    }

    #[test]
    fn partial_writes_still_deliver_whole_frame() {
        let mut writer = ChunkingWriter {
            data: Vec::new(),
            chunk: 3,
        };
        let mut frame = BytesMut::new();
        encode_packet(&Packet::<u32>::new(7, vec![1, 2, 3]), &mut frame);

        write_all_retrying(&mut writer, &frame).unwrap();
        assert_eq!(writer.data.as_slice(), frame.as_ref());
    }

    #[test]
    fn zero_write_is_connection_closed() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = write_all_retrying(&mut ZeroWriter, b"frame").unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn interrupted_write_retries() {
        struct InterruptedOnce {
            interrupted: bool,
            data: Vec<u8>,
        }
        impl Write for InterruptedOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        };
        write_all_retrying(&mut writer, b"frame").unwrap();
        assert_eq!(writer.data.as_slice(), b"frame");
    }

    #[test]
    fn extract_needs_more_across_split_unit() {
        let mut wire = BytesMut::new();
        encode_packet(&Packet::<u32>::new(9, vec![1, 2]), &mut wire);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..4]);
        assert!(matches!(try_extract_unit(&mut buf), Extract::NeedMore));

        buf.extend_from_slice(&wire[4..9]);
        assert!(matches!(try_extract_unit(&mut buf), Extract::NeedMore));

        buf.extend_from_slice(&wire[9..]);
        match try_extract_unit(&mut buf) {
            Extract::Unit { header, payload } => {
                assert_eq!(header.data_id, 9);
                assert_eq!(header.element_type, ElementType::Uint32);
                assert_eq!(payload.len(), 8);
                assert!(buf.is_empty());
            }
            _ => panic!("expected complete unit"),
        }
    }

    #[test]
    fn extract_leaves_following_unit_in_buffer() {
        let mut buf = BytesMut::new();
        encode_packet(&Packet::<u8>::new(1, vec![0xAA]), &mut buf);
        let second_header = PacketHeader {
            data_id: 2,
            element_type: ElementType::Uint8,
            element_count: 1,
        };
        encode_header(&second_header, &mut buf);
        buf.extend_from_slice(&[0xBB]);

        match try_extract_unit(&mut buf) {
            Extract::Unit { header, payload } => {
                assert_eq!(header.data_id, 1);
                assert_eq!(payload.as_ref(), &[0xAA]);
            }
            _ => panic!("expected first unit"),
        }
        match try_extract_unit(&mut buf) {
            Extract::Unit { header, payload } => {
                assert_eq!(header.data_id, 2);
                assert_eq!(payload.as_ref(), &[0xBB]);
            }
            _ => panic!("expected second unit"),
        }
    }

    struct ChunkingWriter {
        data: Vec<u8>,
        chunk: usize,
    }

    impl Write for ChunkingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
